use crate::{
    health::HealthStatus,
    server::Server,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

pub fn router() -> Router<Server> {
    Router::new().route("/health", get(health))
}

async fn health(State(server): State<Server>) -> impl IntoResponse {
    let report = server.health_service.check_all().await;
    let status = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}
