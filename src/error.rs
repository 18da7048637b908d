use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Longest upstream body fragment that ends up in logs.
const LOG_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing authorization code")]
    MissingCode,

    #[error("state parameter missing or mismatched")]
    StateMismatch,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anonymous or expired-without-refresh-token caller. The expected
    /// common case, never logged as an error.
    #[error("authentication required")]
    AuthRequired,

    /// Authorization-code exchange (or the explicit refresh endpoint)
    /// failed upstream.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The guard's lazy refresh failed; the session cannot continue.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-2xx from a forwarded data call.
    #[error("upstream error for {resource}: {status}")]
    UpstreamProxy {
        resource: String,
        status: StatusCode,
        body: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

pub fn truncate_body(body: &str) -> &str {
    let mut end = LOG_BODY_LIMIT.min(body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(detail) => {
                tracing::error!(%detail, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
            AppError::MissingCode => (StatusCode::BAD_REQUEST, "Missing authorization code"),
            AppError::StateMismatch => (StatusCode::BAD_REQUEST, "Invalid state parameter"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            AppError::AuthRequired => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AppError::ExchangeFailed(detail) => {
                tracing::warn!(%detail, "token exchange failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Token exchange failed")
            }
            AppError::RefreshFailed(detail) => {
                tracing::warn!(%detail, "token refresh failed");
                (StatusCode::UNAUTHORIZED, "Session expired")
            }
            AppError::UpstreamProxy {
                resource,
                status,
                body,
            } => {
                tracing::warn!(
                    %resource,
                    status = status.as_u16(),
                    body = truncate_body(body),
                    "upstream request failed"
                );
                let body = Json(json!({ "error": format!("Upstream error for {resource}") }));
                return (*status, body).into_response();
            }
            AppError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Config("missing client_id".to_string()), 500),
            (AppError::MissingCode, 400),
            (AppError::StateMismatch, 400),
            (AppError::BadRequest("nope".to_string()), 400),
            (AppError::AuthRequired, 401),
            (AppError::ExchangeFailed("boom".to_string()), 500),
            (AppError::RefreshFailed("boom".to_string()), 401),
            (AppError::Internal("boom".to_string()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status().as_u16(), status);
        }
    }

    #[test]
    fn test_upstream_proxy_passes_status_through() {
        let err = AppError::UpstreamProxy {
            resource: "/me/top/tracks".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_display_keeps_upstream_detail() {
        let err = AppError::ExchangeFailed("invalid_grant: code already redeemed".to_string());
        assert_eq!(
            err.to_string(),
            "token exchange failed: invalid_grant: code already redeemed"
        );
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "é".repeat(600);
        let cut = truncate_body(&long);
        assert!(cut.len() <= 512);
        assert!(long.starts_with(cut));
    }
}
