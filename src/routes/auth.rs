//! Login, callback, refresh, logout and session endpoints.
//!
//! Handlers return `Response` directly so cookie mutations survive the
//! error path: a failed callback still drops the state nonce, and a failed
//! refresh still clears the credential cookies.

use crate::{
    auth::credentials::{
        CookieCredentialStore, CredentialStore, REFRESH_TOKEN_COOKIE, STATE_NONCE_COOKIE,
        removal_cookie,
    },
    error::AppError,
    server::Server,
    spotify::types::UserProfile,
};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub fn router() -> Router<Server> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/refresh", post(refresh))
        .route("/logout", get(logout))
        .route("/session", get(session))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

/// The registered redirect URI, or a same-origin /auth/callback derived
/// from the proxy-aware request headers.
fn resolve_redirect_uri(server: &Server, headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(uri) = &server.config.oauth.redirect_uri {
        return Ok(uri.clone());
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("cannot determine callback host".to_string()))?;

    Ok(format!("{scheme}://{host}/auth/callback"))
}

async fn login(State(server): State<Server>, headers: HeaderMap, jar: CookieJar) -> Response {
    let redirect_uri = match resolve_redirect_uri(&server, &headers) {
        Ok(uri) => uri,
        Err(err) => return (jar, err).into_response(),
    };

    match server.flow.begin_login(&redirect_uri) {
        Ok(redirect) => {
            let jar = jar.add(
                server
                    .cookie_settings
                    .state_nonce_cookie(redirect.state_nonce),
            );
            (jar, Redirect::to(redirect.authorization_url.as_str())).into_response()
        }
        Err(err) => (jar, err).into_response(),
    }
}

async fn callback(
    State(server): State<Server>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let stored_nonce = jar.get(STATE_NONCE_COOKIE).map(|c| c.value().to_string());
    // The nonce is single use: dropped before the outcome is known.
    let jar = jar.remove(removal_cookie(STATE_NONCE_COOKIE));

    if let Some(error) = params.error {
        return (
            jar,
            AppError::BadRequest(format!("authorization denied upstream: {error}")),
        )
            .into_response();
    }

    let redirect_uri = match resolve_redirect_uri(&server, &headers) {
        Ok(uri) => uri,
        Err(err) => return (jar, err).into_response(),
    };

    let outcome = server
        .flow
        .complete_login(
            params.code.as_deref(),
            params.state.as_deref(),
            stored_nonce.as_deref(),
            &redirect_uri,
        )
        .await;

    match outcome {
        Ok(credential) => {
            let store = CookieCredentialStore::new(jar, server.cookie_settings);
            store.store(&credential).await;
            (store.into_jar(), Redirect::to("/")).into_response()
        }
        Err(err) => (jar, err).into_response(),
    }
}

/// Explicit refresh. Requires only the refresh-token cookie, so a session
/// whose access-token cookie already lapsed can still be revived.
async fn refresh(State(server): State<Server>, jar: CookieJar) -> Response {
    let Some(refresh_token) = jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string())
    else {
        return (jar, AppError::AuthRequired).into_response();
    };

    match server.exchange.exchange_refresh_token(&refresh_token).await {
        Ok(grant) => {
            let credential = grant.into_credential(
                server.cookie_settings.expiry_margin,
                Utc::now(),
                Some(refresh_token),
            );
            let body = Json(serde_json::json!({
                "expires_at": credential.expires_at.timestamp_millis(),
            }));

            let store = CookieCredentialStore::new(jar, server.cookie_settings);
            store.store(&credential).await;
            (store.into_jar(), body).into_response()
        }
        Err(err) => {
            // The refresh token is spent or revoked; fail closed.
            let store = CookieCredentialStore::new(jar, server.cookie_settings);
            store.clear().await;
            (store.into_jar(), err).into_response()
        }
    }
}

/// Idempotent: clearing an anonymous session is a success, not an error.
async fn logout(State(server): State<Server>, jar: CookieJar) -> Response {
    let store = CookieCredentialStore::new(jar, server.cookie_settings);
    store.clear().await;
    let jar = store.into_jar().remove(removal_cookie(STATE_NONCE_COOKIE));
    (jar, Redirect::to("/")).into_response()
}

/// Who-am-I. Anonymous callers get `authenticated: false` with a 200, not
/// a 401, so frontends can poll it without special-casing.
async fn session(State(server): State<Server>, jar: CookieJar) -> Response {
    let store = CookieCredentialStore::new(jar, server.cookie_settings);

    let credential = match server.guard.ensure_valid(&store).await {
        Ok(credential) => credential,
        Err(AppError::AuthRequired | AppError::RefreshFailed(_)) => {
            let body = Json(SessionResponse {
                authenticated: false,
                profile: None,
                expires_at: None,
            });
            return (store.into_jar(), body).into_response();
        }
        Err(err) => return (store.into_jar(), err).into_response(),
    };

    match server
        .gateway
        .forward_as::<UserProfile>(&store, "/me", &[])
        .await
    {
        Ok(profile) => {
            let body = Json(SessionResponse {
                authenticated: true,
                profile: Some(profile),
                expires_at: Some(credential.expires_at.timestamp_millis()),
            });
            (store.into_jar(), body).into_response()
        }
        Err(err) => (store.into_jar(), err).into_response(),
    }
}
