#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::{DateTime, Utc};
use spotify_session_proxy::{config::Config, server::Server};
use std::collections::HashMap;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A full application wired against two mock upstreams: the authorization
/// server and the data API.
pub struct TestHarness {
    pub auth_server: MockServer,
    pub api_server: MockServer,
    pub app: Router,
}

impl TestHarness {
    pub async fn new() -> Self {
        let auth_server = MockServer::start().await;
        let api_server = MockServer::start().await;

        let mut config = Config::default();
        config.oauth.client_id = "test-client-id".to_string();
        config.oauth.client_secret = "test-client-secret".to_string();
        config.oauth.authorize_url = format!("{}/authorize", auth_server.uri());
        config.oauth.token_url = format!("{}/api/token", auth_server.uri());
        config.oauth.redirect_uri = Some("http://localhost:3000/auth/callback".to_string());
        config.spotify.api_base_url = api_server.uri();

        let server = Server::new(config).await.unwrap();
        let app = server.create_app();

        Self {
            auth_server,
            api_server,
            app,
        }
    }

    /// Token endpoint answering every grant with the given credential.
    pub async fn mount_token_success(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: u64,
    ) {
        let mut body = serde_json::json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": expires_in,
        });
        if let Some(refresh) = refresh_token {
            body["refresh_token"] = serde_json::Value::String(refresh.to_string());
        }

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.auth_server)
            .await;
    }

    pub async fn mount_token_failure(&self) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&self.auth_server)
            .await;
    }

    pub async fn get(&self, uri: &str, cookies: Option<&str>) -> Response<Body> {
        self.request("GET", uri, cookies).await
    }

    pub async fn post(&self, uri: &str, cookies: Option<&str>) -> Response<Body> {
        self.request("POST", uri, cookies).await
    }

    async fn request(&self, method: &str, uri: &str, cookies: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

/// Cookie header for an established session.
pub fn credential_cookies(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> String {
    let mut parts = vec![
        format!("access_token={access_token}"),
        format!("expires_at={}", expires_at.timestamp_millis()),
    ];
    if let Some(refresh) = refresh_token {
        parts.push(format!("refresh_token={refresh}"));
    }
    parts.join("; ")
}

/// First name=value pair of each Set-Cookie header. An empty value means
/// the response instructed the client to drop the cookie.
pub fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for header_value in response.headers().get_all(header::SET_COOKIE) {
        let raw = header_value.to_str().unwrap();
        let pair = raw.split(';').next().unwrap();
        if let Some((name, value)) = pair.split_once('=') {
            out.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
