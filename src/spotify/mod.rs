//! Upstream Web API client.

pub mod types;

use crate::error::AppError;
use axum::http::StatusCode;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Thin GET client for the upstream API. Freshness is the proxy's own
/// responsibility, so transport-level caching stays off.
#[derive(Clone)]
pub struct SpotifyClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(format!("reqwest build error: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET a resource with the bearer credential attached. Non-2xx is
    /// wrapped with the resource path and status and re-surfaced; no
    /// retries, no swallowing.
    pub async fn get(
        &self,
        resource: &str,
        query: &[(String, String)],
        access_token: &str,
    ) -> Result<UpstreamResponse, AppError> {
        let url = format!("{}{}", self.base_url, resource);

        let mut request = self.http_client.get(&url).bearer_auth(access_token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| AppError::UpstreamProxy {
            resource: resource.to_string(),
            status: StatusCode::BAD_GATEWAY,
            body: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::UpstreamProxy {
            resource: resource.to_string(),
            status,
            body: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AppError::UpstreamProxy {
                resource: resource.to_string(),
                status,
                body,
            });
        }

        Ok(UpstreamResponse { status, body })
    }
}
