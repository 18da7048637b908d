use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: None,
        }
    }

    pub fn healthy_with_details(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: Some(details),
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message),
            details: None,
        }
    }
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// The name of this health check component
    fn name(&self) -> &str;

    /// Perform the health check
    async fn check(&self) -> HealthCheckResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallHealthResponse {
    pub status: HealthStatus,
    pub components: HashMap<String, HealthCheckResult>,
}

/// Registry of component checkers, aggregated into one report.
#[derive(Default)]
pub struct HealthService {
    checkers: RwLock<Vec<Arc<dyn HealthChecker>>>,
}

impl HealthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, checker: Arc<dyn HealthChecker>) {
        self.checkers.write().await.push(checker);
    }

    pub async fn check_all(&self) -> OverallHealthResponse {
        let checkers = self.checkers.read().await.clone();

        let mut components = HashMap::new();
        for checker in checkers {
            components.insert(checker.name().to_string(), checker.check().await);
        }

        let status = if components
            .values()
            .all(|result| result.status == HealthStatus::Healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        OverallHealthResponse { status, components }
    }
}

/// Confirms the client credentials required by every auth-touching
/// operation are configured. Never echoes the secret.
pub struct OAuthConfigChecker {
    config: crate::config::OAuthConfig,
}

impl OAuthConfigChecker {
    pub fn new(config: crate::config::OAuthConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HealthChecker for OAuthConfigChecker {
    fn name(&self) -> &str {
        "oauth_config"
    }

    async fn check(&self) -> HealthCheckResult {
        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return HealthCheckResult::unhealthy("client credentials not configured".to_string());
        }
        HealthCheckResult::healthy_with_details(serde_json::json!({
            "client_id": self.config.client_id,
            "token_url": self.config.token_url,
        }))
    }
}

/// Reports the response cache's resident entry count.
pub struct CacheHealthChecker {
    cache: Arc<crate::cache::MemoryCache>,
}

impl CacheHealthChecker {
    pub fn new(cache: Arc<crate::cache::MemoryCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthChecker for CacheHealthChecker {
    fn name(&self) -> &str {
        "response_cache"
    }

    async fn check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy_with_details(serde_json::json!({
            "entries": self.cache.len().await,
        }))
    }
}
