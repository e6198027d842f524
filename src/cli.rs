use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AppConfig;
use crate::downloader::ffmpeg::check_tools;
use crate::jobs::JobStatus;
use crate::server::{run_server, AppState};
use crate::utils::ensure_dir_exists;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "nasmytunes", version, about = "Convert Spotify playlists into zipped audio files")]
pub struct Cli {
    /// Configuration file. Defaults to <config dir>/nasmytunes/config.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Convert one playlist locally and write the archive to a directory.
    Convert {
        playlist_url: String,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Report whether ffmpeg and yt-dlp can be found and run.
    CheckTools,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = AppConfig::load(self.config.as_deref()).context("loading configuration")?;

        match self.command.unwrap_or(Command::Serve { host: None, port: None }) {
            Command::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
                run_server(&config).await.context("running HTTP server")?;
            }
            Command::Convert { playlist_url, output } => {
                let archive = convert_playlist(&config, &playlist_url, &output).await?;
                println!("Archive written to {}", archive.display());
            }
            Command::CheckTools => {
                let mut missing = false;
                for tool in check_tools(&config.media).await {
                    match (&tool.path, &tool.version) {
                        (Some(path), Some(version)) => {
                            println!("✅ {}: {} ({})", tool.name, version, path.display())
                        }
                        (Some(path), None) => {
                            missing = true;
                            println!("⚠️ {}: found at {} but it did not run", tool.name, path.display())
                        }
                        _ => {
                            missing = true;
                            println!("❌ {}: not found", tool.name)
                        }
                    }
                }
                if missing && !config.demo_mode {
                    bail!("required tools are missing");
                }
            }
        }
        Ok(())
    }
}

/// Runs the whole pipeline for one playlist with a terminal progress bar.
pub async fn convert_playlist(config: &AppConfig, playlist_url: &str, output: &Path) -> Result<PathBuf> {
    ensure_dir_exists(&config.output.work_dir).await?;
    ensure_dir_exists(output).await?;

    let state = AppState::from_config(config)?;
    let playlist_id = state.validator.validate_playlist_url(playlist_url)?;
    let playlist = state.catalog()?.playlist(&playlist_id).await?;
    if playlist.tracks.is_empty() {
        bail!("playlist '{}' has no convertible tracks", playlist.name);
    }
    println!("🎶 {} ({} tracks)", playlist.name, playlist.total_tracks);

    let job = state.jobs.start(playlist.name.clone(), playlist.tracks).await?;

    let progress = ProgressBar::new(job.total_tracks as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")?
            .progress_chars("##-"),
    );
    progress.enable_steady_tick(Duration::from_millis(200));

    let finished = loop {
        let snapshot = state.jobs.status(&job.job_id).await?;
        progress.set_position((snapshot.completed_tracks + snapshot.failed_tracks) as u64);
        if let Some(current) = &snapshot.current_track {
            progress.set_message(current.clone());
        }
        if snapshot.status.is_finished() {
            break snapshot;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    progress.finish_with_message(format!(
        "{} converted, {} failed",
        finished.completed_tracks, finished.failed_tracks
    ));

    if finished.status == JobStatus::Failed {
        let error = finished.error.unwrap_or_else(|| "unknown error".to_string());
        state.jobs.cleanup(&job.job_id).await?;
        bail!("conversion failed: {}", error);
    }

    let download = state.jobs.archive(&job.job_id).await?;
    let destination = output.join(&download.file_name);
    tokio::fs::copy(&download.path, &destination)
        .await
        .with_context(|| format!("copying archive to {}", destination.display()))?;
    state.jobs.cleanup(&job.job_id).await?;

    Ok(destination)
}
