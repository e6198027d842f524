use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{AppError, Result};
use crate::jobs::TrackOutcome;

pub const REPORT_FILE_NAME: &str = "conversion_report.txt";

/// Plain-text summary shipped inside every archive.
pub fn render_report(
    playlist_name: &str,
    job_id: &str,
    generated_at: DateTime<Utc>,
    outcomes: &[TrackOutcome],
) -> String {
    let converted: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, TrackOutcome::Converted { .. }))
        .collect();
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, TrackOutcome::Failed { .. }))
        .collect();

    let mut report = String::new();
    report.push_str("Playlist Conversion Report\n");
    report.push_str("==========================\n\n");
    report.push_str(&format!("Playlist: {}\n", playlist_name));
    report.push_str(&format!("Job ID: {}\n", job_id));
    report.push_str(&format!("Generated: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
    report.push_str(&format!(
        "Tracks: {} total, {} converted, {} failed\n",
        outcomes.len(),
        converted.len(),
        failed.len()
    ));

    if !converted.is_empty() {
        report.push_str("\nConverted:\n");
        for outcome in converted {
            if let TrackOutcome::Converted { position, label, source_title, .. } = outcome {
                report.push_str(&format!("  {:02}. {} (source: {})\n", position, label, source_title));
            }
        }
    }

    if !failed.is_empty() {
        report.push_str("\nFailed:\n");
        for outcome in failed {
            if let TrackOutcome::Failed { position, label, reason } = outcome {
                report.push_str(&format!("  {:02}. {}: {}\n", position, label, reason));
            }
        }
    }

    report
}

/// Writes `files` (stored under their base names) and the report into a
/// deflated zip at `archive_path`. Blocking; run it off the async runtime.
pub fn write_archive(archive_path: &Path, files: &[PathBuf], report: &str) -> Result<u64> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a file path: {:?}", path),
            )))?;
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    zip.start_file(REPORT_FILE_NAME, options)?;
    zip.write_all(report.as_bytes())?;

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);

    let size = std::fs::metadata(archive_path)?.len();
    log::info!(
        "📦 [ARCHIVE] Wrote {:?} ({} files, {} bytes)",
        archive_path,
        files.len() + 1,
        size
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn outcomes() -> Vec<TrackOutcome> {
        vec![
            TrackOutcome::Converted {
                position: 1,
                label: "Song - A".to_string(),
                file_name: "01. Song - A.mp3".to_string(),
                source_title: "Song (Official Audio)".to_string(),
            },
            TrackOutcome::Failed {
                position: 2,
                label: "Other - B".to_string(),
                reason: "No matching video found".to_string(),
            },
        ]
    }

    #[test]
    fn report_lists_both_sides() {
        let report = render_report("Road Trip", "job-1", Utc::now(), &outcomes());
        assert!(report.contains("Playlist: Road Trip"));
        assert!(report.contains("Tracks: 2 total, 1 converted, 1 failed"));
        assert!(report.contains("01. Song - A (source: Song (Official Audio))"));
        assert!(report.contains("02. Other - B: No matching video found"));
    }

    #[test]
    fn archive_holds_files_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("01. Song - A.mp3");
        std::fs::write(&audio, b"fake audio").unwrap();
        let archive_path = dir.path().join("playlist_job-1.zip");

        let size = write_archive(&archive_path, &[audio], "report body").unwrap();
        assert!(size > 0);

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("01. Song - A.mp3")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "fake audio");

        content.clear();
        archive
            .by_name(REPORT_FILE_NAME)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "report body");
    }
}
