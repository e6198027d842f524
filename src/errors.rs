use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Catalog not configured: {0}")]
    CatalogNotConfigured(String),

    #[error("Catalog authentication failed: {0}")]
    CatalogAuth(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Transcoding error: {0}")]
    Transcode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::NotReady(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CatalogNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::CatalogAuth(_)
            | AppError::Catalog(_)
            | AppError::Search(_)
            | AppError::Transcode(_)
            | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Io(_) | AppError::Json(_) | AppError::Archive(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to HTTP clients. Lookup, validation and configuration
    /// errors carry their bare message so existing front ends can match on it.
    pub fn client_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::NotReady(msg)
            | AppError::Validation(msg)
            | AppError::CatalogNotConfigured(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("❌ [SERVER] Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.client_message() });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
