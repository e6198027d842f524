use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::MediaConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(windows)]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Availability of one external binary, as reported by `check-tools` and `/debug`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub available: bool,
}

/// Looks for a binary on PATH.
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Configured path first, then a copy shipped next to the executable, then PATH.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if let Some(found) = path.to_str().and_then(find_in_path) {
            return Some(found);
        }
        log::warn!("⚠️ [JOB] Configured ffmpeg {:?} does not exist", path);
    }

    let bundled = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(FFMPEG_BINARY)))
        .filter(|candidate| candidate.is_file());
    if bundled.is_some() {
        return bundled;
    }

    find_in_path(FFMPEG_BINARY)
}

/// First line of `<binary> <flag>` output, or None if it cannot run.
pub async fn probe_version(binary: &Path, flag: &str) -> Option<String> {
    let child = Command::new(binary)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, child).await {
        Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string()),
        _ => None,
    }
}

async fn tool_status(name: &str, path: Option<PathBuf>, flag: &str) -> ToolStatus {
    let version = match &path {
        Some(path) => probe_version(path, flag).await,
        None => None,
    };
    ToolStatus {
        name: name.to_string(),
        available: version.is_some(),
        path,
        version,
    }
}

/// Reports ffmpeg and yt-dlp availability for the configured media settings.
pub async fn check_tools(media: &MediaConfig) -> Vec<ToolStatus> {
    let ffmpeg = locate_ffmpeg(media.ffmpeg_path.as_deref());

    let ytdlp = if media.ytdlp_path.is_file() {
        Some(media.ytdlp_path.clone())
    } else {
        media.ytdlp_path.to_str().and_then(find_in_path)
    };

    vec![
        tool_status("ffmpeg", ffmpeg, "-version").await,
        tool_status("yt-dlp", ytdlp, "--version").await,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-ffmpeg");
        std::fs::write(&fake, b"").unwrap();

        assert_eq!(locate_ffmpeg(Some(fake.as_path())), Some(fake.clone()));
    }

    #[tokio::test]
    async fn missing_tools_are_reported_unavailable() {
        let media = MediaConfig {
            ytdlp_path: PathBuf::from("/nonexistent/yt-dlp"),
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ..MediaConfig::default()
        };

        let statuses = check_tools(&media).await;
        let ytdlp = statuses.iter().find(|s| s.name == "yt-dlp").unwrap();
        assert!(!ytdlp.available);
        assert!(ytdlp.path.is_none());
    }
}
