//! Typed upstream response records.
//!
//! Explicit shapes per resource, deserialized leniently: absent or unknown
//! fields become defaults instead of runtime errors, so an upstream schema
//! drift never turns into a 500 here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
    pub images: Vec<Image>,
    pub followers: Followers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Followers {
    pub total: u64,
}

/// Offset-based page wrapper used by most listing endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CursorPaging<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    pub duration_ms: u64,
    pub popularity: u32,
    pub explicit: bool,
    pub preview_url: Option<String>,
    pub album: Album,
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    pub release_date: String,
    pub images: Vec<Image>,
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: u32,
    pub images: Vec<Image>,
    pub followers: Followers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Playlist {
    pub id: Option<String>,
    pub name: String,
    pub public: Option<bool>,
    pub images: Vec<Image>,
    pub tracks: PlaylistTracksRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaylistTracksRef {
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayHistory {
    pub track: Track,
    pub played_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchResults {
    pub tracks: Option<Paging<Track>>,
    pub artists: Option<Paging<Artist>>,
    pub albums: Option<Paging<Album>>,
    pub playlists: Option<Paging<Playlist>>,
}

/// Discovery payload. `Default` doubles as the degraded empty result when
/// the upstream fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Recommendations {
    pub tracks: Vec<Track>,
    pub seeds: Vec<RecommendationSeed>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendationSeed {
    pub id: String,
    #[serde(rename = "type")]
    pub seed_type: String,
    #[serde(rename = "initialPoolSize")]
    pub initial_pool_size: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewReleases {
    pub albums: Paging<Album>,
}
