pub mod http_pool;
pub mod spotify;

use regex::Regex;
use std::sync::OnceLock;

use crate::api::{Playlist, TrackDetails};
use crate::errors::Result;

pub use spotify::SpotifyClient;

/// Music catalog lookups. Implemented against the Spotify Web API; tests and
/// alternative catalogs plug in here.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches playlist metadata and every track across all pages, in order.
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist>;

    async fn track(&self, track_id: &str) -> Result<TrackDetails>;
}

const PLAYLIST_PATTERNS: [&str; 2] = [
    r"^(?:https?://)?open\.spotify\.com/(?:intl-[a-zA-Z-]+/)?playlist/([A-Za-z0-9]+)",
    r"^spotify:playlist:([A-Za-z0-9]+)$",
];

fn playlist_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        PLAYLIST_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Extracts the playlist id from a share link or a `spotify:playlist:` URI.
pub fn extract_playlist_id(url: &str) -> Option<String> {
    let url = url.trim();
    playlist_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_supported_forms() {
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/abc123?si=xyz").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/intl-de/playlist/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_playlist_id("spotify:playlist:abc123").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn ignores_other_resources() {
        assert!(extract_playlist_id("https://open.spotify.com/track/abc123").is_none());
        assert!(extract_playlist_id("spotify:album:abc123").is_none());
        assert!(extract_playlist_id("not a url").is_none());
    }
}
