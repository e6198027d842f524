use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::{TranscodeRequest, Transcoder};
use crate::api::VideoResult;
use crate::errors::{AppError, Result};
use crate::processing::ProcessingOptions;
use crate::search::ranking::format_duration;
use crate::search::MediaResolver;

/// Subset of the JSON yt-dlp prints per entry with `--dump-json --flat-playlist`.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailInfo {
    pub url: String,
}

impl VideoInfo {
    pub fn into_video_result(self) -> VideoResult {
        let url = self
            .webpage_url
            .or(self.url.filter(|u| u.starts_with("http")))
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));
        let thumbnail = self
            .thumbnail
            .or_else(|| self.thumbnails.last().map(|t| t.url.clone()));

        VideoResult {
            duration: self.duration.map(format_duration),
            duration_secs: self.duration,
            views: self.view_count,
            channel: self.channel.or(self.uploader),
            id: self.id,
            title: self.title,
            url,
            thumbnail,
        }
    }
}

/// One JSON object per line; lines that do not parse are skipped.
pub fn parse_search_output(stdout: &str) -> Vec<VideoInfo> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<VideoInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                log::debug!("⚠️ [SEARCH] Skipping unparsable yt-dlp line: {}", e);
                None
            }
        })
        .collect()
}

/// Thin async wrapper around the yt-dlp binary.
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
    proxy: Option<String>,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self {
            binary,
            ffmpeg: None,
            proxy: None,
            timeout,
        }
    }

    pub fn with_ffmpeg(mut self, path: PathBuf) -> Self {
        self.ffmpeg = Some(path);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Runs yt-dlp and returns stdout. Non-zero exits become `on_error` with
    /// the last stderr line. The child is killed if the timeout elapses.
    async fn run(&self, args: Vec<OsString>, on_error: fn(String) -> AppError) -> Result<String> {
        let mut command = Command::new(&self.binary);
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(on_error(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(on_error(format!(
                    "{} timed out after {}s",
                    self.binary.display(),
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            return Err(on_error(format!("yt-dlp exited with {}: {}", output.status, reason)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<VideoInfo>> {
        log::info!("🔍 [SEARCH] yt-dlp search: '{}' (limit {})", query, limit);
        let args = vec![
            OsString::from("--dump-json"),
            OsString::from("--flat-playlist"),
            OsString::from("--skip-download"),
            OsString::from("--no-warnings"),
            OsString::from("--ignore-errors"),
            OsString::from(format!("ytsearch{}:{}", limit, query)),
        ];
        let stdout = self.run(args, AppError::Search).await?;
        let results = parse_search_output(&stdout);
        log::info!("📊 [SEARCH] {} results for '{}'", results.len(), query);
        Ok(results)
    }

    /// Downloads the best audio stream and converts it with ffmpeg.
    pub async fn extract_audio(
        &self,
        url: &str,
        output_template: &Path,
        options: &ProcessingOptions,
    ) -> Result<()> {
        let mut args = vec![
            OsString::from("-f"),
            OsString::from("bestaudio/best"),
            OsString::from("--extract-audio"),
            OsString::from("--audio-format"),
            OsString::from(options.format.extension()),
            OsString::from("--audio-quality"),
            OsString::from(options.audio_quality_arg()),
            OsString::from("--no-playlist"),
            OsString::from("--no-warnings"),
            OsString::from("-o"),
            output_template.as_os_str().to_owned(),
        ];
        if let Some(ffmpeg) = &self.ffmpeg {
            args.push(OsString::from("--ffmpeg-location"));
            args.push(ffmpeg.as_os_str().to_owned());
        }
        args.push(OsString::from(url));

        self.run(args, AppError::Transcode).await.map(|_| ())
    }

    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(vec![OsString::from("--version")], AppError::Transcode).await?;
        Ok(stdout.trim().to_string())
    }
}

#[async_trait::async_trait]
impl MediaResolver for YtDlp {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        Ok(self
            .search_videos(query, limit)
            .await?
            .into_iter()
            .map(VideoInfo::into_video_result)
            .collect())
    }
}

/// Extracts audio with yt-dlp, which drives ffmpeg for the re-encode.
pub struct YtDlpTranscoder {
    ytdlp: Arc<YtDlp>,
    options: ProcessingOptions,
}

impl YtDlpTranscoder {
    pub fn new(ytdlp: Arc<YtDlp>, options: ProcessingOptions) -> Self {
        Self { ytdlp, options }
    }
}

/// yt-dlp decides the final extension itself; look for what it produced.
fn find_output(dir: &Path, stem: &str, extension: &str) -> Option<PathBuf> {
    let expected = dir.join(format!("{}.{}", stem, extension));
    if expected.is_file() {
        return Some(expected);
    }

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| {
            path.is_file()
                && path.file_stem().and_then(|s| s.to_str()) == Some(stem)
                && !matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("part") | Some("ytdl") | Some("json")
                )
        })
}

/// `-o` template writing `<stem>.<ext>` into `dir`. A literal `%` in the
/// stem must be doubled or yt-dlp reads it as a field.
fn output_template(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.%(ext)s", stem.replace('%', "%%")))
}

#[async_trait::async_trait]
impl Transcoder for YtDlpTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> Result<PathBuf> {
        let template = output_template(&request.output_dir, &request.file_stem);

        log::info!(
            "🎵 [JOB] Extracting '{}' from {}",
            request.track.display_label(),
            request.source_url
        );
        self.ytdlp
            .extract_audio(&request.source_url, &template, &self.options)
            .await?;

        find_output(&request.output_dir, &request.file_stem, self.options.format.extension())
            .ok_or_else(|| {
                AppError::Transcode(format!(
                    "yt-dlp finished but no output file for '{}' was found",
                    request.file_stem
                ))
            })
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_template_escapes_percent_signs() {
        let template = output_template(Path::new("/tmp/job"), "01. 100% Pure Love - Crystal Waters");
        assert_eq!(
            template,
            PathBuf::from("/tmp/job/01. 100%% Pure Love - Crystal Waters.%(ext)s")
        );
        assert_eq!(
            output_template(Path::new("/tmp/job"), "02. Plain"),
            PathBuf::from("/tmp/job/02. Plain.%(ext)s")
        );
    }

    #[test]
    fn parses_flat_search_lines() {
        let stdout = concat!(
            r#"{"id": "abc", "title": "Song (Official Audio)", "duration": 201.0, "view_count": 1500, "channel": "Artist", "url": "https://www.youtube.com/watch?v=abc", "thumbnails": [{"url": "https://i.ytimg.com/a.jpg"}]}"#,
            "\n",
            "WARNING: not json\n",
            r#"{"id": "def", "title": "Song live", "uploader": "Fan"}"#,
            "\n"
        );

        let results: Vec<VideoResult> = parse_search_output(stdout)
            .into_iter()
            .map(VideoInfo::into_video_result)
            .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].duration.as_deref(), Some("3:21"));
        assert_eq!(results[0].views, Some(1500));
        assert_eq!(results[0].thumbnail.as_deref(), Some("https://i.ytimg.com/a.jpg"));
        assert_eq!(results[1].url, "https://www.youtube.com/watch?v=def");
        assert_eq!(results[1].channel.as_deref(), Some("Fan"));
        assert!(results[1].duration_secs.is_none());
    }

    #[test]
    fn finds_produced_file_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01. Song - A.part"), b"partial").unwrap();
        assert!(find_output(dir.path(), "01. Song - A", "mp3").is_none());

        std::fs::write(dir.path().join("01. Song - A.m4a"), b"audio").unwrap();
        let found = find_output(dir.path(), "01. Song - A", "mp3").unwrap();
        assert_eq!(found.file_name().unwrap(), "01. Song - A.m4a");
    }

    #[tokio::test]
    async fn missing_binary_is_a_transcode_error() {
        let ytdlp = YtDlp::new(
            PathBuf::from("/nonexistent/yt-dlp-binary"),
            Duration::from_secs(5),
        );
        let err = ytdlp.version().await.unwrap_err();
        assert!(matches!(err, AppError::Transcode(_)));
    }
}
