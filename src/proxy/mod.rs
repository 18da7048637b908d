//! Proxy gateway: the single entry point downstream handlers use.
//!
//! Validates or refreshes the credential through the lifecycle guard,
//! optionally serves and populates the response cache, and forwards the
//! call upstream with the bearer credential attached.

use crate::{
    auth::{credentials::CredentialStore, guard::TokenLifecycleGuard},
    cache::{MemoryCache, compose_key},
    error::AppError,
    spotify::{SpotifyClient, UpstreamResponse},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};

/// Whether a cached response short-circuited the upstream call. Surfaced to
/// the caller for observability only; it never changes response content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

pub struct ProxyGateway {
    guard: Arc<TokenLifecycleGuard>,
    cache: Arc<MemoryCache>,
    upstream: SpotifyClient,
}

impl ProxyGateway {
    pub fn new(
        guard: Arc<TokenLifecycleGuard>,
        cache: Arc<MemoryCache>,
        upstream: SpotifyClient,
    ) -> Self {
        Self {
            guard,
            cache,
            upstream,
        }
    }

    /// Forward a call with a valid bearer credential, refreshing first if
    /// needed. `AuthRequired` callers never reach the upstream.
    pub async fn forward(
        &self,
        store: &dyn CredentialStore,
        resource: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, AppError> {
        let credential = self.guard.ensure_valid(store).await?;
        self.upstream
            .get(resource, query, &credential.access_token)
            .await
    }

    /// Forward and decode into the resource's typed record.
    pub async fn forward_as<T: DeserializeOwned>(
        &self,
        store: &dyn CredentialStore,
        resource: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let response = self.forward(store, resource, query).await?;
        decode(resource, &response.body)
    }

    /// Forward through the response cache. The key is scoped to the
    /// resource, its parameters, and the credential fingerprint, so cached
    /// data is never shared across credentials, not even across a refresh
    /// that produced a new access token.
    pub async fn forward_cached<T>(
        &self,
        store: &dyn CredentialStore,
        resource: &str,
        query: &[(String, String)],
        ttl: Duration,
    ) -> Result<(String, CacheStatus), AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        let credential = self.guard.ensure_valid(store).await?;
        let key = response_key(resource, query, &credential.fingerprint());

        match self.cache.get::<String>(&key).await {
            Ok(Some(body)) => return Ok((body, CacheStatus::Hit)),
            Ok(None) => {}
            Err(err) => tracing::warn!(%key, error = %err, "cache read failed"),
        }

        let response = self
            .upstream
            .get(resource, query, &credential.access_token)
            .await?;
        let value: T = decode(resource, &response.body)?;
        let body = serde_json::to_string(&value)
            .map_err(|e| AppError::Internal(format!("failed to encode {resource}: {e}")))?;

        if let Err(err) = self.cache.set(&key, &body, ttl).await {
            tracing::warn!(%key, error = %err, "cache write failed");
        }

        Ok((body, CacheStatus::Miss))
    }
}

fn decode<T: DeserializeOwned>(resource: &str, body: &str) -> Result<T, AppError> {
    serde_json::from_str(body).map_err(|e| {
        AppError::Internal(format!("failed to decode upstream response for {resource}: {e}"))
    })
}

/// Composite cache key: resource path, canonicalized query, credential
/// fingerprint.
fn response_key(resource: &str, query: &[(String, String)], fingerprint: &str) -> String {
    let mut pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    compose_key([resource, pairs.join("&").as_str(), fingerprint])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{Credential, MemoryCredentialStore};
    use crate::auth::exchange::TokenExchangeClient;
    use crate::config::OAuthConfig;
    use crate::spotify::types::{Paging, Track};
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(api: &MockServer) -> ProxyGateway {
        let config = OAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            ..Default::default()
        };
        let exchange = Arc::new(TokenExchangeClient::new(&config).unwrap());
        let guard = Arc::new(TokenLifecycleGuard::new(
            exchange,
            chrono::Duration::seconds(30),
        ));
        ProxyGateway::new(
            guard,
            Arc::new(MemoryCache::new()),
            SpotifyClient::new(api.uri()).unwrap(),
        )
    }

    fn valid_store(token: &str) -> MemoryCredentialStore {
        MemoryCredentialStore::with_credential(Credential {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
        })
    }

    #[tokio::test]
    async fn test_unauthenticated_forward_never_reaches_upstream() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&api)
            .await;

        let gateway = gateway_for(&api);
        let store = MemoryCredentialStore::new();

        let err = gateway.forward(&store, "/me", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::AuthRequired));
    }

    #[tokio::test]
    async fn test_second_cached_call_skips_upstream_and_is_byte_identical() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/top/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"name": "Song", "duration_ms": 201000}],
                "total": 1
            })))
            .expect(1)
            .mount(&api)
            .await;

        let gateway = gateway_for(&api);
        let store = valid_store("AT1");
        let query = vec![("time_range".to_string(), "medium_term".to_string())];

        let (first, status) = gateway
            .forward_cached::<Paging<Track>>(
                &store,
                "/me/top/tracks",
                &query,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);

        let (second, status) = gateway
            .forward_cached::<Paging<Track>>(
                &store,
                "/me/top/tracks",
                &query,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cache_is_not_shared_across_credentials() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/top/tracks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})),
            )
            .expect(2)
            .mount(&api)
            .await;

        let gateway = gateway_for(&api);

        for token in ["AT_user_one", "AT_user_two"] {
            gateway
                .forward_cached::<Paging<Track>>(
                    &valid_store(token),
                    "/me/top/tracks",
                    &[],
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
        }
        // mock .expect(2) verifies no cross-credential hit occurred.
    }

    #[test]
    fn test_response_key_ignores_query_order() {
        let a = response_key(
            "/search",
            &[
                ("q".to_string(), "nina".to_string()),
                ("type".to_string(), "track".to_string()),
            ],
            "fp",
        );
        let b = response_key(
            "/search",
            &[
                ("type".to_string(), "track".to_string()),
                ("q".to_string(), "nina".to_string()),
            ],
            "fp",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_response_key_distinct_fingerprints() {
        let a = response_key("/me/top/tracks", &[], "fp1");
        let b = response_key("/me/top/tracks", &[], "fp2");
        assert_ne!(a, b);
    }
}
