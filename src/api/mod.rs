// Shared data types exchanged between the catalog, the resolver, the job
// tracker and the HTTP surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Track {
    pub fn new(name: impl Into<String>, artists: Vec<String>, duration_ms: u64) -> Self {
        Self {
            id: None,
            name: name.into(),
            artists,
            duration_ms,
            preview_url: None,
        }
    }

    /// "Name - Artist A, Artist B", used for progress and reports.
    pub fn display_label(&self) -> String {
        format!("{} - {}", self.name, self.artists.join(", "))
    }

    /// Free-text query handed to the video platform search.
    pub fn search_query(&self) -> String {
        format!("{} {}", self.name, self.artists.join(" "))
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub playlist_id: String,
    pub name: String,
    pub description: Option<String>,
    pub total_tracks: usize,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDetails {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub preview_url: Option<String>,
    pub external_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub duration: Option<String>,
    pub duration_secs: Option<f64>,
    pub views: Option<u64>,
    pub channel: Option<String>,
    pub url: String,
    pub thumbnail: Option<String>,
}

/// Well-known tracks for trying the pipeline without a catalog account.
pub fn sample_tracks() -> Vec<Track> {
    vec![
        Track::new("Shape of You", vec!["Ed Sheeran".to_string()], 233_713),
        Track::new("Blinding Lights", vec!["The Weeknd".to_string()], 200_040),
        Track::new("Levitating", vec!["Dua Lipa".to_string()], 203_064),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_queries_join_artists() {
        let track = Track::new(
            "Under Pressure",
            vec!["Queen".to_string(), "David Bowie".to_string()],
            248_000,
        );
        assert_eq!(track.display_label(), "Under Pressure - Queen, David Bowie");
        assert_eq!(track.search_query(), "Under Pressure Queen David Bowie");
    }

    #[test]
    fn track_accepts_minimal_json() {
        let track: Track =
            serde_json::from_str(r#"{"name": "Song", "artists": ["Someone"]}"#).unwrap();
        assert_eq!(track.duration_ms, 0);
        assert!(track.id.is_none());
    }
}
