// Offline stand-ins used in demo mode: the whole job pipeline runs, but
// nothing touches the network and every "audio" file is a short text note.

use std::path::PathBuf;

use super::{TranscodeRequest, Transcoder};
use crate::api::VideoResult;
use crate::errors::Result;
use crate::search::ranking::format_duration;
use crate::search::MediaResolver;

pub struct OfflineResolver;

#[async_trait::async_trait]
impl MediaResolver for OfflineResolver {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Ok((0..limit.min(1))
            .map(|_| VideoResult {
                id: slug.clone(),
                title: query.to_string(),
                duration: None,
                duration_secs: None,
                views: None,
                channel: Some("offline".to_string()),
                url: format!("offline://{}", slug),
                thumbnail: None,
            })
            .collect())
    }
}

pub struct PlaceholderTranscoder;

#[async_trait::async_trait]
impl Transcoder for PlaceholderTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> Result<PathBuf> {
        let track = &request.track;
        let content = format!(
            "Demo Track Information\nTitle: {}\nArtists: {}\nDuration: {}\nSource: {}\n\nThis is a placeholder file generated in demo mode.\n",
            track.name,
            track.artists.join(", "),
            format_duration(track.duration_ms as f64 / 1000.0),
            request.source_url
        );

        let path = request.output_dir.join(format!("{}.txt", request.file_stem));
        tokio::fs::write(&path, content).await?;
        log::info!("🧪 [JOB] Wrote placeholder {:?}", path);
        Ok(path)
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Track;

    #[tokio::test]
    async fn placeholder_describes_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("Levitating", vec!["Dua Lipa".to_string()], 203_064);
        let candidates = OfflineResolver.resolve(&track, 5).await.unwrap();
        assert_eq!(candidates.len(), 1);

        let request = TranscodeRequest {
            source_url: candidates[0].url.clone(),
            track,
            output_dir: dir.path().to_path_buf(),
            file_stem: "01. Levitating - Dua Lipa".to_string(),
        };
        let path = PlaceholderTranscoder.transcode(&request).await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Demo Track Information\nTitle: Levitating\nArtists: Dua Lipa"));
        assert!(content.contains("Duration: 3:23"));
    }
}
