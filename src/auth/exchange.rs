//! OAuth2 token exchanges against the upstream authorization server.
//!
//! Pure function of credentials in, credentials out: no shared state beyond
//! the HTTP client. Both grants are POSTed form-encoded with HTTP Basic
//! auth from the client id/secret, and neither is ever retried: an
//! authorization code is single-use, and a rejected refresh token stays
//! rejected.

use crate::{config::OAuthConfig, error::AppError};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicRequestTokenError},
};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use std::time::Duration;
use url::Url;

// Avoid oauth2 type madness
pub type Oauth2Client =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Fallback when the upstream omits expires_in. Spotify always sends it.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Result of a successful exchange. `refresh_token` is `None` unless the
/// upstream rotated it; callers retain the prior one in that case.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

impl TokenGrant {
    /// Bind the grant to an absolute expiry: now + issued TTL - margin,
    /// clamped at now for TTLs shorter than the margin. When the upstream
    /// did not rotate the refresh token, the prior one is retained.
    pub fn into_credential(
        self,
        expiry_margin: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
        prior_refresh_token: Option<String>,
    ) -> crate::auth::credentials::Credential {
        let ttl = chrono::Duration::from_std(self.expires_in)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        crate::auth::credentials::Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(prior_refresh_token),
            expires_at: now + (ttl - expiry_margin).max(chrono::Duration::seconds(0)),
        }
    }
}

pub struct TokenExchangeClient {
    oauth_client: Oauth2Client,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl TokenExchangeClient {
    pub fn new(config: &OAuthConfig) -> Result<Self, AppError> {
        let auth_url = AuthUrl::new(config.authorize_url.clone())
            .map_err(|e| AppError::Config(format!("invalid authorize_url: {e}")))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AppError::Config(format!("invalid token_url: {e}")))?;

        let oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        // Following redirects opens the client up to SSRF; token endpoints
        // never redirect legitimately. Credentials must not be cached by
        // any intermediary.
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(format!("reqwest build error: {e}")))?;

        Ok(Self {
            oauth_client,
            scopes: config.scopes.clone(),
            http_client,
        })
    }

    /// Upstream authorization URL with response_type=code, the configured
    /// scopes, and the caller's CSRF nonce as `state`.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url, AppError> {
        let redirect = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AppError::BadRequest(format!("invalid redirect URI: {e}")))?;

        let state = state.to_string();
        let (url, _csrf_token) = self
            .oauth_client
            .clone()
            .set_redirect_uri(redirect)
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().map(|s| Scope::new(s.clone())))
            .url();

        Ok(url)
    }

    /// grant_type=authorization_code. Non-2xx is a hard failure.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, AppError> {
        let redirect = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AppError::BadRequest(format!("invalid redirect URI: {e}")))?;

        let token = self
            .oauth_client
            .clone()
            .set_redirect_uri(redirect)
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AppError::ExchangeFailed(describe_token_error(e)))?;

        Ok(Self::grant_from_response(token))
    }

    /// grant_type=refresh_token. Non-2xx is a hard failure. The upstream is
    /// not guaranteed to rotate the refresh token.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, AppError> {
        let token = self
            .oauth_client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AppError::ExchangeFailed(describe_token_error(e)))?;

        Ok(Self::grant_from_response(token))
    }

    fn grant_from_response(
        token: oauth2::basic::BasicTokenResponse,
    ) -> TokenGrant {
        TokenGrant {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_in: token.expires_in().unwrap_or(DEFAULT_TOKEN_TTL),
        }
    }
}

fn describe_token_error<RE>(err: BasicRequestTokenError<RE>) -> String
where
    RE: std::error::Error + 'static,
{
    use oauth2::RequestTokenError;
    match err {
        RequestTokenError::ServerResponse(response) => {
            format!("upstream rejected grant: {response}")
        }
        RequestTokenError::Request(e) => format!("transport error: {e}"),
        RequestTokenError::Parse(e, body) => format!(
            "malformed token response: {e}: {}",
            crate::error::truncate_body(&String::from_utf8_lossy(&body))
        ),
        RequestTokenError::Other(message) => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            authorize_url: format!("{}/authorize", server.uri()),
            token_url: format!("{}/api/token", server.uri()),
            ..Default::default()
        }
    }

    #[test]
    fn test_authorization_url_parameters() {
        let config = OAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            ..Default::default()
        };
        let client = TokenExchangeClient::new(&config).unwrap();

        let url = client
            .authorization_url("http://localhost:3000/auth/callback", "nonce-123")
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "test-client-id".to_string())));
        assert!(pairs.contains(&("state".to_string(), "nonce-123".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:3000/auth/callback".to_string()
        )));
        let scope = pairs.iter().find(|(k, _)| k == "scope").unwrap();
        assert!(scope.1.contains("user-top-read"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "RT1",
                "scope": "user-read-private"
            })))
            .mount(&mock_server)
            .await;

        let client = TokenExchangeClient::new(&config_for(&mock_server)).unwrap();
        let grant = client
            .exchange_code("abc", "http://localhost:3000/auth/callback")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "AT1");
        assert_eq!(grant.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(grant.expires_in, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_exchange_code_upstream_rejection_is_hard_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Authorization code expired"
            })))
            .expect(1) // no retry
            .mount(&mock_server)
            .await;

        let client = TokenExchangeClient::new(&config_for(&mock_server)).unwrap();
        let err = client
            .exchange_code("stale", "http://localhost:3000/auth/callback")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_grant_refresh_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT_new",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let client = TokenExchangeClient::new(&config_for(&mock_server)).unwrap();
        let grant = client.exchange_refresh_token("RT1").await.unwrap();

        assert_eq!(grant.access_token, "AT_new");
        assert_eq!(grant.refresh_token, None);
    }
}
