//! Session credential state and its transport bindings.
//!
//! The three pieces of session state (access token, refresh token, expiry
//! instant) live in HTTP cookies. `CredentialStore` hides that from the
//! guard and the gateway: the cookie binding is one implementation, and an
//! in-memory store backs tests (or any future durable backing) behind the
//! same interface.

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use tokio::sync::RwLock;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const EXPIRES_AT_COOKIE: &str = "expires_at";
pub const STATE_NONCE_COOKIE: &str = "session_state_nonce";

/// Number of trailing access-token characters used to scope cache keys to
/// one credential.
const FINGERPRINT_LEN: usize = 8;

/// Delegated user credential.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Always set with a safety margin below the upstream's own expiry.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Short access-token suffix keying cached data to this credential.
    /// Changes on every refresh, so stale entries die with the old token.
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.access_token.chars().collect();
        let start = chars.len().saturating_sub(FINGERPRINT_LEN);
        chars[start..].iter().collect()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Option<Credential>;
    async fn store(&self, credential: &Credential);
    async fn clear(&self);
}

/// Cookie attributes shared by the credential and nonce cookies.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    /// Margin the guard subtracted from the upstream TTL; added back so the
    /// access-token cookie lives exactly as long as the upstream token.
    pub expiry_margin: chrono::Duration,
    pub refresh_ttl: time::Duration,
    pub state_ttl: time::Duration,
}

impl CookieSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            secure: config.server.secure_cookies,
            expiry_margin: chrono::Duration::seconds(config.auth.expiry_margin_secs as i64),
            refresh_ttl: time::Duration::days(config.auth.refresh_cookie_days as i64),
            state_ttl: time::Duration::seconds(config.auth.state_ttl_secs as i64),
        }
    }

    fn build<'a>(&self, name: &'a str, value: String, max_age: time::Duration) -> Cookie<'a> {
        Cookie::build((name, value))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .max_age(max_age)
            .build()
    }

    pub fn state_nonce_cookie(&self, nonce: String) -> Cookie<'static> {
        self.build(STATE_NONCE_COOKIE, nonce, self.state_ttl)
    }
}

/// A cookie with matching name and path that instructs the browser to drop
/// the original.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Request-scoped credential store bound to the response cookie jar.
pub struct CookieCredentialStore {
    jar: Mutex<CookieJar>,
    settings: CookieSettings,
}

impl CookieCredentialStore {
    pub fn new(jar: CookieJar, settings: CookieSettings) -> Self {
        Self {
            jar: Mutex::new(jar),
            settings,
        }
    }

    /// Hand the (possibly mutated) jar back to the response.
    pub fn into_jar(self) -> CookieJar {
        self.jar.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn with_jar(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut guard = self.jar.lock().unwrap_or_else(|e| e.into_inner());
        let jar = std::mem::take(&mut *guard);
        *guard = f(jar);
    }
}

#[async_trait]
impl CredentialStore for CookieCredentialStore {
    async fn load(&self) -> Option<Credential> {
        let guard = self.jar.lock().unwrap_or_else(|e| e.into_inner());

        let access_token = guard.get(ACCESS_TOKEN_COOKIE)?.value().to_string();
        let refresh_token = guard
            .get(REFRESH_TOKEN_COOKIE)
            .map(|c| c.value().to_string());
        // A missing or garbled expiry reads as already expired.
        let expires_at = guard
            .get(EXPIRES_AT_COOKIE)
            .and_then(|c| c.value().parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Some(Credential {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    async fn store(&self, credential: &Credential) {
        let settings = self.settings;
        let remaining = credential.expires_at - Utc::now() + settings.expiry_margin;
        let max_age = time::Duration::seconds(remaining.num_seconds().max(0));

        let access = settings.build(
            ACCESS_TOKEN_COOKIE,
            credential.access_token.clone(),
            max_age,
        );
        let expires = settings.build(
            EXPIRES_AT_COOKIE,
            credential.expires_at.timestamp_millis().to_string(),
            max_age,
        );
        let refresh = credential
            .refresh_token
            .clone()
            .map(|token| settings.build(REFRESH_TOKEN_COOKIE, token, settings.refresh_ttl));

        self.with_jar(|mut jar| {
            jar = jar.add(access).add(expires);
            if let Some(refresh) = refresh {
                jar = jar.add(refresh);
            }
            jar
        });
    }

    async fn clear(&self) {
        self.with_jar(|jar| {
            jar.remove(removal_cookie(ACCESS_TOKEN_COOKIE))
                .remove(removal_cookie(REFRESH_TOKEN_COOKIE))
                .remove(removal_cookie(EXPIRES_AT_COOKIE))
        });
    }
}

/// In-memory store. Used by tests and available as a durable-backing seam.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn store(&self, credential: &Credential) {
        *self.credential.write().await = Some(credential.clone());
    }

    async fn clear(&self) {
        *self.credential.write().await = None;
    }
}
