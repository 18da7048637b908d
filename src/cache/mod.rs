//! Short-TTL response cache.
//!
//! Process-wide key/value store with per-entry absolute expiry, used to
//! memoize upstream responses for a bounded window. Always injected as an
//! `Arc<MemoryCache>`, never reached through ambient global state.

pub mod memory;

pub use memory::MemoryCache;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Deterministic join of the parts that identify a cached value.
///
/// Callers are responsible for including every parameter that affects the
/// value, including the credential fingerprint, so cached data is never
/// shared across distinct credentials.
pub fn compose_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_key_is_deterministic() {
        let a = compose_key(["top-tracks", "time_range=medium_term", "ab12cd34"]);
        let b = compose_key(["top-tracks", "time_range=medium_term", "ab12cd34"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_compose_key_isolates_fingerprints() {
        // Same resource and params, different credentials: distinct keys.
        let f1 = compose_key(["top-tracks", "time_range=medium_term", "ab12cd34"]);
        let f2 = compose_key(["top-tracks", "time_range=medium_term", "ef56gh78"]);
        assert_ne!(f1, f2);
    }

    #[test]
    fn test_compose_key_order_matters() {
        assert_ne!(compose_key(["a", "b"]), compose_key(["b", "a"]));
    }
}
