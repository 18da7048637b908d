use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    pub spotify: SpotifyConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Set the Secure attribute on session cookies. On in production.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            secure_cookies: false,
        }
    }
}

/// Upstream authorization-server settings. client_id and client_secret are
/// required; everything else defaults to the Spotify accounts service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Optional. When unset, a same-origin /auth/callback is derived from
    /// the request headers.
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: None,
            scopes: vec![
                "user-read-private".to_string(),
                "user-read-email".to_string(),
                "user-top-read".to_string(),
                "user-read-recently-played".to_string(),
                "playlist-read-private".to_string(),
            ],
            authorize_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub api_base_url: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Safety margin subtracted from the upstream-issued token TTL so the
    /// guard never races the upstream's own clock. Heuristic, tunable.
    pub expiry_margin_secs: u64,
    /// Lifetime of the CSRF state nonce cookie.
    pub state_ttl_secs: u64,
    /// Lifetime of the refresh token cookie.
    pub refresh_cookie_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            expiry_margin_secs: 30,
            state_ttl_secs: 600,
            refresh_cookie_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_request: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_request: false,
        }
    }
}

impl Config {
    /// Defaults, then the file when it exists, then `SPOTIFY_*` environment
    /// overrides. The CLI supplies `config.yaml` as the default path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("SPOTIFY")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    /// Client credentials are required for every auth-touching operation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth.client_id.is_empty() {
            return Err(ConfigError::Message(
                "oauth.client_id is required (SPOTIFY_OAUTH__CLIENT_ID)".to_string(),
            ));
        }
        if self.oauth.client_secret.is_empty() {
            return Err(ConfigError::Message(
                "oauth.client_secret is required (SPOTIFY_OAUTH__CLIENT_SECRET)".to_string(),
            ));
        }
        Ok(())
    }
}
