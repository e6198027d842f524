pub mod manager;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use manager::{ArchiveDownload, JobCounts, JobManager};
pub use worker::{Converter, RetryPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Result of one playlist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TrackOutcome {
    Converted {
        position: usize,
        label: String,
        file_name: String,
        source_title: String,
    },
    Failed {
        position: usize,
        label: String,
        reason: String,
    },
}

impl TrackOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, TrackOutcome::Converted { .. })
    }
}

/// Server-side record of one conversion. Only the job's worker mutates it,
/// always through the methods below, so `completed + failed <= total` holds.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub playlist_name: String,
    pub status: JobStatus,
    pub total_tracks: usize,
    pub completed_tracks: usize,
    pub failed_tracks: usize,
    pub current_track: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub work_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub error: Option<String>,
    pub outcomes: Vec<TrackOutcome>,
}

impl Job {
    pub fn new(id: String, playlist_name: String, total_tracks: usize, work_dir: PathBuf) -> Self {
        Self {
            id,
            playlist_name,
            status: JobStatus::Queued,
            total_tracks,
            completed_tracks: 0,
            failed_tracks: 0,
            current_track: None,
            created_at: Utc::now(),
            finished_at: None,
            work_dir,
            archive_path: None,
            error: None,
            outcomes: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.completed_tracks + self.failed_tracks
    }

    pub fn start_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
        }
    }

    pub fn begin_track(&mut self, label: String) {
        self.current_track = Some(label);
    }

    /// Counts an outcome. Outcomes past `total_tracks` or after the job has
    /// finished are dropped.
    pub fn record_outcome(&mut self, outcome: TrackOutcome) -> bool {
        if self.status.is_finished() || self.processed() >= self.total_tracks {
            log::warn!("⚠️ [JOB] Ignoring extra outcome for job {}", self.id);
            return false;
        }
        if outcome.is_converted() {
            self.completed_tracks += 1;
        } else {
            self.failed_tracks += 1;
        }
        self.outcomes.push(outcome);
        true
    }

    pub fn complete(&mut self, archive_path: PathBuf) {
        self.status = JobStatus::Completed;
        self.archive_path = Some(archive_path);
        self.current_track = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.current_track = None;
        self.finished_at = Some(Utc::now());
    }

    /// Percentage of processed tracks, one decimal place.
    pub fn progress(&self) -> f64 {
        if self.total_tracks == 0 {
            return 0.0;
        }
        let percent = self.processed() as f64 / self.total_tracks as f64 * 100.0;
        (percent * 10.0).round() / 10.0
    }

    pub fn download_ready(&self) -> bool {
        self.status == JobStatus::Completed && self.archive_path.is_some()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            playlist_name: self.playlist_name.clone(),
            total_tracks: self.total_tracks,
            completed_tracks: self.completed_tracks,
            failed_tracks: self.failed_tracks,
            progress: self.progress(),
            current_track: self.current_track.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            download_ready: self.download_ready(),
            error: self.error.clone(),
            outcomes: self.outcomes.clone(),
        }
    }
}

/// What status requests see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub playlist_name: String,
    pub total_tracks: usize,
    pub completed_tracks: usize,
    pub failed_tracks: usize,
    pub progress: f64,
    pub current_track: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub download_ready: bool,
    pub error: Option<String>,
    pub outcomes: Vec<TrackOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(position: usize) -> TrackOutcome {
        TrackOutcome::Failed {
            position,
            label: "x".to_string(),
            reason: "nope".to_string(),
        }
    }

    fn converted(position: usize) -> TrackOutcome {
        TrackOutcome::Converted {
            position,
            label: "x".to_string(),
            file_name: "x.mp3".to_string(),
            source_title: "x".to_string(),
        }
    }

    #[test]
    fn counters_never_exceed_total() {
        let mut job = Job::new("j".into(), "p".into(), 2, PathBuf::from("/tmp/j"));
        job.start_processing();
        assert!(job.record_outcome(converted(1)));
        assert!(job.record_outcome(failed(2)));
        assert!(!job.record_outcome(failed(3)));
        assert_eq!((job.completed_tracks, job.failed_tracks), (1, 1));
        assert_eq!(job.progress(), 100.0);
    }

    #[test]
    fn progress_rounds_to_one_decimal() {
        let mut job = Job::new("j".into(), "p".into(), 3, PathBuf::from("/tmp/j"));
        job.record_outcome(converted(1));
        assert_eq!(job.progress(), 33.3);
    }

    #[test]
    fn only_completed_jobs_are_downloadable() {
        let mut job = Job::new("j".into(), "p".into(), 1, PathBuf::from("/tmp/j"));
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.download_ready());

        job.start_processing();
        job.record_outcome(converted(1));
        job.complete(PathBuf::from("/tmp/j/playlist_j.zip"));
        let snapshot = job.snapshot();
        assert!(snapshot.download_ready);
        assert!(snapshot.finished_at.is_some());
        assert!(snapshot.current_track.is_none());
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Processing).unwrap(), "\"processing\"");
        let value = serde_json::to_value(failed(4)).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["position"], 4);
    }
}
