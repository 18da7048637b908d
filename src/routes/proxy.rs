//! Authenticated pass-through endpoints for the upstream Web API.
//!
//! Every handler goes through the gateway, which validates or refreshes
//! the credential before anything leaves the process. Read-heavy listing
//! endpoints are cached per credential; search stays uncached because its
//! parameter space makes hits unlikely; discovery endpoints degrade to an
//! empty payload rather than failing the page they decorate.

use crate::{
    auth::credentials::CookieCredentialStore,
    error::AppError,
    proxy::CacheStatus,
    server::Server,
    spotify::types::{
        Artist, CursorPaging, NewReleases, Paging, PlayHistory, Playlist, Recommendations,
        SearchResults, Track, UserProfile,
    },
};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

pub const PROXY_CACHE_HEADER: &str = "x-proxy-cache";

const LISTING_TTL: Duration = Duration::from_secs(60);
const RECENTLY_PLAYED_TTL: Duration = Duration::from_secs(30);

pub fn router() -> Router<Server> {
    Router::new()
        .route("/me", get(me))
        .route("/me/top/tracks", get(top_tracks))
        .route("/me/top/artists", get(top_artists))
        .route("/me/playlists", get(playlists))
        .route("/me/player/recently-played", get(recently_played))
        .route("/search", get(search))
        .route("/recommendations", get(recommendations))
        .route("/browse/new-releases", get(new_releases))
}

async fn me(State(server): State<Server>, jar: CookieJar) -> Response {
    let store = CookieCredentialStore::new(jar, server.cookie_settings);
    match server
        .gateway
        .forward_as::<UserProfile>(&store, "/me", &[])
        .await
    {
        Ok(profile) => (store.into_jar(), Json(profile)).into_response(),
        Err(err) => (store.into_jar(), err).into_response(),
    }
}

async fn top_tracks(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_cached::<Paging<Track>>(&server, jar, "/me/top/tracks", query, LISTING_TTL).await
}

async fn top_artists(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_cached::<Paging<Artist>>(&server, jar, "/me/top/artists", query, LISTING_TTL).await
}

async fn playlists(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_cached::<Paging<Playlist>>(&server, jar, "/me/playlists", query, LISTING_TTL).await
}

async fn recently_played(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_cached::<CursorPaging<PlayHistory>>(
        &server,
        jar,
        "/me/player/recently-played",
        query,
        RECENTLY_PLAYED_TTL,
    )
    .await
}

async fn search(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    if !query.iter().any(|(k, v)| k == "q" && !v.is_empty()) {
        return (
            jar,
            AppError::BadRequest("search requires a q parameter".to_string()),
        )
            .into_response();
    }

    let store = CookieCredentialStore::new(jar, server.cookie_settings);
    match server
        .gateway
        .forward_as::<SearchResults>(&store, "/search", &query)
        .await
    {
        Ok(results) => (store.into_jar(), Json(results)).into_response(),
        Err(err) => (store.into_jar(), err).into_response(),
    }
}

async fn recommendations(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_degradable::<Recommendations>(&server, jar, "/recommendations", query).await
}

async fn new_releases(
    State(server): State<Server>,
    jar: CookieJar,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    forward_degradable::<NewReleases>(&server, jar, "/browse/new-releases", query).await
}

async fn forward_cached<T>(
    server: &Server,
    jar: CookieJar,
    resource: &str,
    query: Vec<(String, String)>,
    ttl: Duration,
) -> Response
where
    T: Serialize + DeserializeOwned,
{
    let store = CookieCredentialStore::new(jar, server.cookie_settings);
    match server
        .gateway
        .forward_cached::<T>(&store, resource, &query, ttl)
        .await
    {
        Ok((body, status)) => cached_response(store.into_jar(), body, status),
        Err(err) => (store.into_jar(), err).into_response(),
    }
}

/// Decorative endpoint: an upstream failure becomes an empty payload with
/// a 200 instead of surfacing the error. Auth failures still surface.
async fn forward_degradable<T>(
    server: &Server,
    jar: CookieJar,
    resource: &str,
    query: Vec<(String, String)>,
) -> Response
where
    T: Default + Serialize + DeserializeOwned,
{
    let store = CookieCredentialStore::new(jar, server.cookie_settings);
    match server.gateway.forward_as::<T>(&store, resource, &query).await {
        Ok(value) => (store.into_jar(), Json(value)).into_response(),
        Err(AppError::UpstreamProxy {
            resource, status, ..
        }) => {
            tracing::warn!(
                %resource,
                status = status.as_u16(),
                "degrading to empty payload"
            );
            (store.into_jar(), Json(T::default())).into_response()
        }
        Err(err) => (store.into_jar(), err).into_response(),
    }
}

/// The cached body is already serialized JSON; bypass Json<T> and tag the
/// response with the cache outcome.
fn cached_response(jar: CookieJar, body: String, status: CacheStatus) -> Response {
    (
        jar,
        [
            (CONTENT_TYPE.as_str(), "application/json"),
            (PROXY_CACHE_HEADER, status.as_str()),
        ],
        body,
    )
        .into_response()
}
