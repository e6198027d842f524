use crate::api::Track;
use crate::errors::Result;
use log::info;

const MAX_STEM_CHARS: usize = 150;

/// Sanitizes a filename by removing invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// File stem for the n-th track of a job: "01. Name - Artist A, Artist B"
pub fn track_file_stem(position: usize, track: &Track) -> String {
    let stem = sanitize_filename(&format!("{:02}. {}", position, track.display_label()));
    if stem.chars().count() > MAX_STEM_CHARS {
        stem.chars().take(MAX_STEM_CHARS).collect::<String>().trim_end().to_string()
    } else {
        stem
    }
}

/// Attachment name offered for a job archive: keeps alphanumerics, spaces,
/// dashes and underscores of the playlist name.
pub fn archive_download_name(playlist_name: &str, job_id: &str) -> String {
    let safe_name: String = playlist_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe_name = safe_name.trim_end();
    let base = if safe_name.is_empty() { "playlist" } else { safe_name };
    let short_id: String = job_id.chars().take(8).collect();
    format!("{}_{}.zip", base, short_id)
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Generates a unique ID for conversion jobs
pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
