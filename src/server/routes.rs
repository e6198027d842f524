use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use super::state::AppState;
use crate::api::{sample_tracks, Playlist, Track, TrackDetails};
use crate::downloader::ffmpeg::check_tools;
use crate::errors::{AppError, Result};
use crate::jobs::JobSnapshot;

const MAX_SEARCH_RESULTS: usize = 25;
const DEFAULT_PLAYLIST_NAME: &str = "Playlist";

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    #[serde(default)]
    pub playlist_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub playlist_name: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "nasmytunes",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn debug_info(State(state): State<AppState>) -> Json<Value> {
    let tools = check_tools(&state.info.media).await;
    let ffmpeg = tools.iter().find(|tool| tool.name == "ffmpeg");
    let jobs = state.jobs.counts().await;

    Json(json!({
        "ffmpeg_available": ffmpeg.is_some_and(|tool| tool.available),
        "ffmpeg_path": ffmpeg.and_then(|tool| tool.path.clone()),
        "tools": tools,
        "spotify_configured": state.catalog.is_some(),
        "demo_mode": state.info.demo_mode,
        "transcoder": state.jobs.converter().transcoder_name(),
        "work_dir": state.info.work_dir,
        "uptime_secs": state.info.started_at.elapsed().as_secs(),
        "jobs": jobs,
        "app_status": "running",
    }))
}

pub async fn test_conversion() -> Json<Value> {
    let tracks = sample_tracks();
    Json(json!({
        "message": "Test playlist with well-known songs",
        "playlist_name": "Test Conversion",
        "total_tracks": tracks.len(),
        "tracks": tracks,
        "instructions": "Use the /api/convert/start endpoint with this data",
    }))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PlaylistRequest>, JsonRejection>,
) -> Result<Json<Playlist>> {
    let Json(body) = payload?;
    let catalog = state.catalog()?;
    let playlist_id = state.validator.validate_playlist_url(&body.playlist_url)?;

    let playlist = catalog.playlist(&playlist_id).await?;
    log::info!(
        "🌐 [SERVER] Playlist {} resolved with {} tracks",
        playlist_id,
        playlist.total_tracks
    );
    Ok(Json(playlist))
}

pub async fn get_track(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> Result<Json<TrackDetails>> {
    let catalog = state.catalog()?;
    Ok(Json(catalog.track(&track_id).await?))
}

pub async fn search_videos(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = payload?;
    state.validator.validate_search_query(&body.query)?;
    let limit = body
        .limit
        .unwrap_or(state.search_results)
        .clamp(1, MAX_SEARCH_RESULTS);

    let videos = state.resolver.search(body.query.trim(), limit).await?;
    Ok(Json(json!({ "videos": videos })))
}

pub async fn start_conversion(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = payload?;
    state.validator.validate_tracks(&body.tracks)?;
    let playlist_name = body
        .playlist_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string());

    let job = state.jobs.start(playlist_name, body.tracks).await?;
    Ok(Json(json!({
        "job_id": job.job_id,
        "status": job.status,
        "message": "Conversion process started",
        "total_tracks": job.total_tracks,
    })))
}

pub async fn conversion_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>> {
    Ok(Json(state.jobs.status(&job_id).await?))
}

/// `attachment` header with an ASCII fallback name plus the UTF-8 original.
fn content_disposition(file_name: &str) -> HeaderValue {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() && c != '"' { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

pub async fn download_archive(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response> {
    let download = state.jobs.archive(&job_id).await?;
    let file = tokio::fs::File::open(&download.path).await?;
    let length = file.metadata().await?.len();
    log::info!("📤 [SERVER] Streaming {} ({} bytes)", download.file_name, length);

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
            (header::CONTENT_DISPOSITION, content_disposition(&download.file_name)),
        ],
        body,
    )
        .into_response())
}

pub async fn cleanup_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>> {
    state.jobs.cleanup(&job_id).await?;
    Ok(Json(json!({ "message": "Job cleaned up successfully" })))
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}
