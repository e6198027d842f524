pub mod ffmpeg;
pub mod placeholder;
pub mod ytdlp;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api::Track;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::search::{MediaResolver, SearchManager};

use placeholder::{OfflineResolver, PlaceholderTranscoder};
use ytdlp::{YtDlp, YtDlpTranscoder};

/// One audio extraction: fetch `source_url` and write `<output_dir>/<file_stem>.<ext>`.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source_url: String,
    pub track: Track,
    pub output_dir: PathBuf,
    pub file_stem: String,
}

#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the path of the produced file.
    async fn transcode(&self, request: &TranscodeRequest) -> Result<PathBuf>;

    fn name(&self) -> &str;
}

/// Resolver and transcoder picked for a configuration.
#[derive(Clone)]
pub struct MediaStack {
    pub resolver: Arc<dyn MediaResolver>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl MediaStack {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.demo_mode {
            log::info!("🧪 [JOB] Demo mode: using offline resolver and placeholder files");
            return Self {
                resolver: Arc::new(OfflineResolver),
                transcoder: Arc::new(PlaceholderTranscoder),
            };
        }

        let media = &config.media;
        let mut ytdlp = YtDlp::new(
            media.ytdlp_path.clone(),
            Duration::from_secs(media.transcode_timeout_secs),
        );
        match ffmpeg::locate_ffmpeg(media.ffmpeg_path.as_deref()) {
            Some(path) => ytdlp = ytdlp.with_ffmpeg(path),
            None => log::warn!("⚠️ [JOB] ffmpeg not found, relying on yt-dlp's own lookup"),
        }
        if let Some(proxy) = &config.proxy {
            ytdlp = ytdlp.with_proxy(proxy.clone());
        }
        let ytdlp = Arc::new(ytdlp);

        let resolver = SearchManager::new(
            ytdlp.clone(),
            Duration::from_secs(media.search_cache_ttl_secs),
        );
        let transcoder = YtDlpTranscoder::new(ytdlp, config.output.processing_options());

        Self {
            resolver: Arc::new(resolver),
            transcoder: Arc::new(transcoder),
        }
    }
}
