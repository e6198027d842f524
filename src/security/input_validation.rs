use crate::api::Track;
use crate::catalog::extract_playlist_id;
use crate::errors::{AppError, Result};
use url::Url;

const MAX_QUERY_CHARS: usize = 500;
const MAX_URL_CHARS: usize = 2048;
const MAX_TRACKS_PER_JOB: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Checks a playlist URL or URI and returns the playlist id it names.
    pub fn validate_playlist_url(&self, url: &str) -> Result<String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("Playlist URL is required".to_string()));
        }

        if url.len() > MAX_URL_CHARS {
            return Err(AppError::Validation("Playlist URL too long".to_string()));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let parsed = Url::parse(url)
                .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| AppError::Validation("URL must have a host".to_string()))?;
            if host != "open.spotify.com" {
                return Err(AppError::Validation(format!(
                    "Unsupported platform: {}. Only Spotify playlist links are supported",
                    host
                )));
            }
        }

        extract_playlist_id(url)
            .ok_or_else(|| AppError::Validation("Invalid Spotify playlist URL".to_string()))
    }

    pub fn validate_search_query(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }

        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(AppError::Validation(format!(
                "Search query too long (max {} characters)",
                MAX_QUERY_CHARS
            )));
        }

        // The query ends up as a process argument.
        if query.chars().any(|c| c.is_control()) {
            return Err(AppError::Validation(
                "Search query contains control characters".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_tracks(&self, tracks: &[Track]) -> Result<()> {
        if tracks.is_empty() {
            return Err(AppError::Validation("No tracks provided".to_string()));
        }

        if tracks.len() > MAX_TRACKS_PER_JOB {
            return Err(AppError::Validation(format!(
                "Too many tracks (max {} per conversion)",
                MAX_TRACKS_PER_JOB
            )));
        }

        for (index, track) in tracks.iter().enumerate() {
            if track.name.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Track {} has an empty name",
                    index + 1
                )));
            }
            if track.artists.iter().all(|artist| artist.trim().is_empty()) {
                return Err(AppError::Validation(format!(
                    "Track {} ({}) has no artists",
                    index + 1,
                    track.name
                )));
            }
        }

        Ok(())
    }
}
