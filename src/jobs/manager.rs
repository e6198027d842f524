use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;

use super::worker::{run_job, Converter};
use super::{Job, JobSnapshot, JobStatus};
use crate::api::Track;
use crate::config::JobsConfig;
use crate::errors::{AppError, Result};
use crate::utils::{archive_download_name, generate_job_id};

const JOB_NOT_FOUND: &str = "Job not found";
const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(50);

struct JobEntry {
    job: Job,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    jobs: RwLock<HashMap<String, JobEntry>>,
    converter: Arc<Converter>,
    work_root: PathBuf,
    ttl: chrono::Duration,
    slots: Arc<Semaphore>,
}

/// Owns every job: its state, its worker task and its directory.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

/// An archive ready to stream, with the name offered to the client.
#[derive(Debug, Clone)]
pub struct ArchiveDownload {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobManager {
    pub fn new(converter: Converter, work_root: PathBuf, config: &JobsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                converter: Arc::new(converter),
                work_root,
                ttl: chrono::Duration::hours(config.job_ttl_hours),
                slots: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            }),
        }
    }

    pub(crate) fn converter(&self) -> Arc<Converter> {
        self.inner.converter.clone()
    }

    pub(crate) async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.inner.slots.clone().acquire_owned().await.ok()
    }

    /// Registers a job and spawns its worker. The job starts `queued` and
    /// moves to `processing` once a slot is free.
    pub async fn start(&self, playlist_name: String, tracks: Vec<Track>) -> Result<JobSnapshot> {
        if tracks.is_empty() {
            return Err(AppError::Validation("No tracks provided".to_string()));
        }

        let job_id = generate_job_id();
        let work_dir = self.inner.work_root.join(format!("job_{}", job_id));
        let job = Job::new(job_id.clone(), playlist_name, tracks.len(), work_dir.clone());
        let snapshot = job.snapshot();

        // Hold the write lock across the spawn so the worker cannot observe
        // the entry before its abort handle is stored.
        let mut jobs = self.inner.jobs.write().await;
        let task = tokio::spawn(run_job(self.clone(), job_id.clone(), tracks, work_dir));
        jobs.insert(
            job_id.clone(),
            JobEntry {
                job,
                task: Some(task),
            },
        );
        drop(jobs);

        log::info!(
            "📥 [JOB] Queued {} '{}' with {} tracks",
            job_id,
            snapshot.playlist_name,
            snapshot.total_tracks
        );
        Ok(snapshot)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        self.inner
            .jobs
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.job.snapshot())
            .ok_or_else(|| AppError::NotFound(JOB_NOT_FOUND.to_string()))
    }

    /// Applies `f` to a job. Returns false if the job no longer exists.
    pub(crate) async fn update<F>(&self, job_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        match self.inner.jobs.write().await.get_mut(job_id) {
            Some(entry) => {
                f(&mut entry.job);
                true
            }
            None => false,
        }
    }

    pub async fn archive(&self, job_id: &str) -> Result<ArchiveDownload> {
        let jobs = self.inner.jobs.read().await;
        let job = &jobs
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(JOB_NOT_FOUND.to_string()))?
            .job;

        if job.status != JobStatus::Completed {
            return Err(AppError::NotReady("Conversion not completed".to_string()));
        }

        let path = job
            .archive_path
            .clone()
            .filter(|path| path.is_file())
            .ok_or_else(|| AppError::NotFound("Download file not available".to_string()))?;

        Ok(ArchiveDownload {
            path,
            file_name: archive_download_name(&job.playlist_name, &job.id),
        })
    }

    /// Stops the job's worker if it is still running, then removes its files
    /// and its entry.
    pub async fn cleanup(&self, job_id: &str) -> Result<()> {
        let entry = self
            .inner
            .jobs
            .write()
            .await
            .remove(job_id)
            .ok_or_else(|| AppError::NotFound(JOB_NOT_FOUND.to_string()))?;

        Self::dispose(entry).await;
        log::info!("🧹 [JOB] Cleaned up {}", job_id);
        Ok(())
    }

    /// Aborts the worker and waits for it to unwind before deleting the
    /// directory. Blocking writes the worker handed off can outlive the abort,
    /// so a failed removal is retried.
    async fn dispose(entry: JobEntry) {
        if let Some(task) = entry.task {
            task.abort();
            let _ = task.await;
        }

        let work_dir = &entry.job.work_dir;
        for attempt in 1..=REMOVE_ATTEMPTS {
            match tokio::fs::remove_dir_all(work_dir).await {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) if attempt < REMOVE_ATTEMPTS => {
                    log::debug!("🔁 [JOB] Retrying removal of {:?}: {}", work_dir, e);
                    tokio::time::sleep(REMOVE_RETRY_DELAY).await;
                }
                Err(e) => log::warn!("⚠️ [JOB] Could not remove {:?}: {}", work_dir, e),
            }
        }
    }

    /// Removes jobs created before `now - ttl`. Returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.inner.ttl;
        let expired: Vec<JobEntry> = {
            let mut jobs = self.inner.jobs.write().await;
            let ids: Vec<String> = jobs
                .iter()
                .filter(|(_, entry)| entry.job.created_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        let removed = expired.len();
        for entry in expired {
            Self::dispose(entry).await;
        }
        if removed > 0 {
            log::info!("🧹 [JOB] Swept {} expired jobs", removed);
        }
        removed
    }

    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep_expired(Utc::now()).await;
            }
        })
    }

    pub async fn counts(&self) -> JobCounts {
        let jobs = self.inner.jobs.read().await;
        let mut counts = JobCounts {
            total: jobs.len(),
            ..JobCounts::default()
        };
        for entry in jobs.values() {
            match entry.job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, job_id: &str, created_at: DateTime<Utc>) {
        self.update(job_id, |job| job.created_at = created_at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::placeholder::{OfflineResolver, PlaceholderTranscoder};
    use crate::downloader::{TranscodeRequest, Transcoder};
    use crate::jobs::RetryPolicy;
    use std::path::Path;
    use tokio::sync::Notify;

    /// Waits for a notification before writing each file.
    struct GatedTranscoder {
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl Transcoder for GatedTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> Result<PathBuf> {
            self.gate.notified().await;
            let path = request.output_dir.join(format!("{}.mp3", request.file_stem));
            tokio::fs::write(&path, b"audio").await?;
            Ok(path)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    /// Keeps writing into the job directory from a blocking thread, then
    /// never returns.
    struct BusyWriterTranscoder;

    #[async_trait::async_trait]
    impl Transcoder for BusyWriterTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> Result<PathBuf> {
            let dir = request.output_dir.clone();
            let _ = tokio::task::spawn_blocking(move || {
                let started = std::time::Instant::now();
                let mut n = 0;
                while started.elapsed() < Duration::from_millis(80) {
                    if std::fs::write(dir.join(format!("chunk_{}", n)), b"x").is_err() {
                        break;
                    }
                    n += 1;
                    std::thread::sleep(Duration::from_millis(1));
                }
            });
            std::future::pending::<()>().await;
            Err(AppError::Transcode("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "busy"
        }
    }

    fn manager_with(root: &Path, transcoder: Arc<dyn Transcoder>, max_concurrent_jobs: usize) -> JobManager {
        let converter = Converter::new(
            Arc::new(OfflineResolver),
            transcoder,
            RetryPolicy {
                max_candidates: 1,
                attempts_per_candidate: 1,
                delay: Duration::ZERO,
            },
            5,
        );
        let config = JobsConfig {
            max_concurrent_jobs,
            ..JobsConfig::default()
        };
        JobManager::new(converter, root.to_path_buf(), &config)
    }

    fn manager(root: &Path) -> JobManager {
        manager_with(root, Arc::new(PlaceholderTranscoder), JobsConfig::default().max_concurrent_jobs)
    }

    async fn wait_for_status(manager: &JobManager, job_id: &str, status: JobStatus) {
        for _ in 0..200 {
            if manager.status(job_id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {:?}", job_id, status);
    }

    async fn wait_finished(manager: &JobManager, job_id: &str) -> JobSnapshot {
        for _ in 0..200 {
            let snapshot = manager.status(job_id).await.unwrap();
            if snapshot.status.is_finished() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn unknown_jobs_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(manager.status("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(manager.archive("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(manager.cleanup("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_track_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(
            manager.start("p".into(), vec![]).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn demo_job_completes_with_archive() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let started = manager
            .start("Road Trip".into(), crate::api::sample_tracks())
            .await
            .unwrap();
        assert_eq!(started.total_tracks, 3);

        let finished = wait_finished(&manager, &started.job_id).await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.completed_tracks, 3);
        assert!(finished.download_ready);

        let download = manager.archive(&started.job_id).await.unwrap();
        assert!(download.path.is_file());
        assert!(download.file_name.starts_with("Road Trip_"));

        let counts = manager.counts().await;
        assert_eq!((counts.total, counts.completed), (1, 1));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let old = manager.start("old".into(), crate::api::sample_tracks()).await.unwrap();
        let fresh = manager.start("fresh".into(), crate::api::sample_tracks()).await.unwrap();
        wait_finished(&manager, &old.job_id).await;
        wait_finished(&manager, &fresh.job_id).await;

        manager
            .backdate(&old.job_id, Utc::now() - chrono::Duration::hours(25))
            .await;
        assert_eq!(manager.sweep_expired(Utc::now()).await, 1);

        assert!(manager.status(&old.job_id).await.is_err());
        assert!(!dir.path().join(format!("job_{}", old.job_id)).exists());
        assert!(manager.status(&fresh.job_id).await.is_ok());
    }

    #[tokio::test]
    async fn extra_jobs_wait_queued_for_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let manager = manager_with(dir.path(), Arc::new(GatedTranscoder { gate: gate.clone() }), 1);
        let one_track = || vec![Track::new("Song", vec!["Artist".to_string()], 180_000)];

        let first = manager.start("first".into(), one_track()).await.unwrap();
        let second = manager.start("second".into(), one_track()).await.unwrap();

        // Either job may win the slot.
        let mut running = None;
        for _ in 0..200 {
            for id in [&first.job_id, &second.job_id] {
                if manager.status(id).await.unwrap().status == JobStatus::Processing {
                    running = Some(id.clone());
                }
            }
            if running.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let running = running.expect("no job started processing");
        let waiting = if running == first.job_id { &second.job_id } else { &first.job_id };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(manager.status(waiting).await.unwrap().status, JobStatus::Queued);
        assert_eq!(manager.counts().await.processing, 1);

        gate.notify_one();
        assert_eq!(wait_finished(&manager, &running).await.status, JobStatus::Completed);

        wait_for_status(&manager, waiting, JobStatus::Processing).await;
        gate.notify_one();
        assert_eq!(wait_finished(&manager, waiting).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cleanup_removes_directory_despite_lingering_writes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), Arc::new(BusyWriterTranscoder), 1);

        let started = manager
            .start("busy".into(), crate::api::sample_tracks())
            .await
            .unwrap();
        wait_for_status(&manager, &started.job_id, JobStatus::Processing).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.cleanup(&started.job_id).await.unwrap();
        assert!(!dir.path().join(format!("job_{}", started.job_id)).exists());
    }
}
