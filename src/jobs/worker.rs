use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::manager::JobManager;
use super::TrackOutcome;
use crate::api::Track;
use crate::archive::{render_report, write_archive};
use crate::config::MediaConfig;
use crate::downloader::{MediaStack, TranscodeRequest, Transcoder};
use crate::errors::{AppError, Result};
use crate::search::MediaResolver;
use crate::utils::{ensure_dir_exists, track_file_stem};

pub const NO_TRACKS_CONVERTED: &str = "No tracks were successfully converted";

/// Per-track retry budget: at most `max_candidates` search hits, each tried
/// up to `attempts_per_candidate` times with `delay` between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_candidates: usize,
    pub attempts_per_candidate: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(media: &MediaConfig) -> Self {
        Self {
            max_candidates: media.max_candidates,
            attempts_per_candidate: media.attempts_per_candidate,
            delay: Duration::from_millis(media.retry_delay_ms),
        }
    }
}

/// Turns one track into one audio file.
pub struct Converter {
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn Transcoder>,
    policy: RetryPolicy,
    search_limit: usize,
}

impl Converter {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        transcoder: Arc<dyn Transcoder>,
        policy: RetryPolicy,
        search_limit: usize,
    ) -> Self {
        Self {
            resolver,
            transcoder,
            policy,
            search_limit: search_limit.max(1),
        }
    }

    pub fn from_config(stack: MediaStack, media: &MediaConfig) -> Self {
        Self::new(
            stack.resolver,
            stack.transcoder,
            RetryPolicy::from_config(media),
            media.search_results,
        )
    }

    pub fn transcoder_name(&self) -> &str {
        self.transcoder.name()
    }

    pub async fn convert_track(&self, position: usize, track: &Track, output_dir: &Path) -> TrackOutcome {
        let label = track.display_label();
        let failed = |reason: String| TrackOutcome::Failed {
            position,
            label: label.clone(),
            reason,
        };

        let candidates = match self.resolver.resolve(track, self.search_limit).await {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => return failed("No matching video found".to_string()),
            Err(e) => return failed(format!("Search failed: {}", e)),
        };

        let file_stem = track_file_stem(position, track);
        let mut last_error = String::from("No candidate could be transcoded");
        let mut first_attempt = true;

        for candidate in candidates.iter().take(self.policy.max_candidates.max(1)) {
            for attempt in 1..=self.policy.attempts_per_candidate.max(1) {
                if !first_attempt && !self.policy.delay.is_zero() {
                    tokio::time::sleep(self.policy.delay).await;
                }
                first_attempt = false;

                let request = TranscodeRequest {
                    source_url: candidate.url.clone(),
                    track: track.clone(),
                    output_dir: output_dir.to_path_buf(),
                    file_stem: file_stem.clone(),
                };
                match self.transcoder.transcode(&request).await {
                    Ok(path) => {
                        log::info!("✅ [JOB] {} -> {:?}", label, path);
                        return TrackOutcome::Converted {
                            position,
                            label: label.clone(),
                            file_name: path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_default(),
                            source_title: candidate.title.clone(),
                        };
                    }
                    Err(e) => {
                        log::warn!(
                            "⚠️ [JOB] {} via '{}' attempt {} failed: {}",
                            label,
                            candidate.title,
                            attempt,
                            e
                        );
                        last_error = e.to_string();
                    }
                }
            }
        }

        failed(last_error)
    }
}

/// Body of the task spawned for each job.
pub(crate) async fn run_job(manager: JobManager, job_id: String, tracks: Vec<Track>, work_dir: PathBuf) {
    let _permit = match manager.acquire_slot().await {
        Some(permit) => permit,
        None => {
            manager.update(&job_id, |job| job.fail("Job manager is shutting down")).await;
            return;
        }
    };

    if !manager.update(&job_id, |job| job.start_processing()).await {
        return;
    }
    log::info!("🚀 [JOB] Processing {} ({} tracks)", job_id, tracks.len());

    if let Err(e) = ensure_dir_exists(&work_dir).await {
        log::error!("❌ [JOB] Cannot create {:?}: {}", work_dir, e);
        manager
            .update(&job_id, |job| job.fail(format!("Cannot create work directory: {}", e)))
            .await;
        return;
    }

    let converter = manager.converter();
    for (index, track) in tracks.iter().enumerate() {
        let label = track.display_label();
        // A false return means the job was cleaned up underneath us.
        if !manager.update(&job_id, |job| job.begin_track(label.clone())).await {
            return;
        }
        log::info!("🎵 [JOB] {} track {}/{}: {}", job_id, index + 1, tracks.len(), label);

        let outcome = converter.convert_track(index + 1, track, &work_dir).await;
        if !manager.update(&job_id, |job| { job.record_outcome(outcome); }).await {
            return;
        }
    }

    match finish_job(&manager, &job_id, &work_dir).await {
        Ok(Some(archive_path)) => {
            log::info!("🎉 [JOB] {} completed, archive at {:?}", job_id, archive_path);
            manager.update(&job_id, |job| job.complete(archive_path)).await;
        }
        Ok(None) => {
            log::warn!("⚠️ [JOB] {}: {}", job_id, NO_TRACKS_CONVERTED);
            manager.update(&job_id, |job| job.fail(NO_TRACKS_CONVERTED)).await;
        }
        Err(e) => {
            log::error!("❌ [JOB] {} archive failed: {}", job_id, e);
            manager
                .update(&job_id, |job| job.fail(format!("Failed to create archive: {}", e)))
                .await;
        }
    }
}

/// Builds the archive for a job that converted at least one track.
async fn finish_job(manager: &JobManager, job_id: &str, work_dir: &Path) -> Result<Option<PathBuf>> {
    let snapshot = manager.status(job_id).await?;
    let files: Vec<PathBuf> = snapshot
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            TrackOutcome::Converted { file_name, .. } => Some(work_dir.join(file_name)),
            TrackOutcome::Failed { .. } => None,
        })
        .collect();

    if files.is_empty() {
        return Ok(None);
    }

    let report = render_report(&snapshot.playlist_name, job_id, Utc::now(), &snapshot.outcomes);
    let archive_path = work_dir.join(format!("playlist_{}.zip", job_id));
    let target = archive_path.clone();

    tokio::task::spawn_blocking(move || write_archive(&target, &files, &report))
        .await
        .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    Ok(Some(archive_path))
}
