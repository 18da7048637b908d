//! Application state and HTTP server assembly.

use crate::{
    auth::{
        credentials::CookieSettings, exchange::TokenExchangeClient,
        flow::AuthorizationFlowController, guard::TokenLifecycleGuard,
    },
    cache::MemoryCache,
    config::Config,
    error::AppError,
    health::{CacheHealthChecker, HealthService, OAuthConfigChecker},
    middleware::{logging_middleware, request_id_middleware},
    proxy::ProxyGateway,
    routes,
    spotify::SpotifyClient,
};
use axum::{Router, middleware};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub cookie_settings: CookieSettings,
    pub exchange: Arc<TokenExchangeClient>,
    pub flow: Arc<AuthorizationFlowController>,
    pub guard: Arc<TokenLifecycleGuard>,
    pub gateway: Arc<ProxyGateway>,
    pub cache: Arc<MemoryCache>,
    pub health_service: Arc<HealthService>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        config.validate()?;

        let cookie_settings = CookieSettings::from_config(&config);
        let expiry_margin = cookie_settings.expiry_margin;

        let exchange = Arc::new(TokenExchangeClient::new(&config.oauth)?);
        let flow = Arc::new(AuthorizationFlowController::new(
            exchange.clone(),
            expiry_margin,
        ));
        let guard = Arc::new(TokenLifecycleGuard::new(exchange.clone(), expiry_margin));

        let cache = Arc::new(MemoryCache::new());
        let upstream = SpotifyClient::new(config.spotify.api_base_url.clone())?;
        let gateway = Arc::new(ProxyGateway::new(guard.clone(), cache.clone(), upstream));

        let health_service = Arc::new(HealthService::new());
        health_service
            .register(Arc::new(OAuthConfigChecker::new(config.oauth.clone())))
            .await;
        health_service
            .register(Arc::new(CacheHealthChecker::new(cache.clone())))
            .await;

        Ok(Self {
            config: Arc::new(config),
            cookie_settings,
            exchange,
            flow,
            guard,
            gateway,
            cache,
            health_service,
        })
    }

    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .nest("/auth", routes::auth::router())
            .nest("/proxy", routes::proxy::router())
            .merge(routes::health::router());

        if self.config.logging.log_request {
            app = app.layer(middleware::from_fn(logging_middleware));
        }
        app = app.layer(middleware::from_fn(request_id_middleware));

        app.with_state(self.clone())
    }

    pub async fn run(self) -> Result<(), AppError> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(addr = %addr, "listening");

        let app = self.create_app();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AppError::Internal(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
