use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{CatalogSource, SpotifyClient};
use crate::config::{AppConfig, MediaConfig};
use crate::downloader::MediaStack;
use crate::errors::{AppError, Result};
use crate::jobs::{Converter, JobManager};
use crate::search::MediaResolver;
use crate::security::InputValidator;

/// Facts about the running service reported by `/debug`.
#[derive(Clone)]
pub struct SystemInfo {
    pub demo_mode: bool,
    pub media: MediaConfig,
    pub work_dir: PathBuf,
    pub started_at: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Option<Arc<dyn CatalogSource>>,
    pub resolver: Arc<dyn MediaResolver>,
    pub jobs: JobManager,
    pub validator: InputValidator,
    pub search_results: usize,
    pub info: SystemInfo,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let catalog: Option<Arc<dyn CatalogSource>> = if config.catalog.has_credentials() {
            Some(Arc::new(SpotifyClient::new(
                &config.catalog,
                config.proxy.as_deref(),
            )?))
        } else {
            log::warn!("⚠️ [CATALOG] Spotify credentials missing, playlist lookups are disabled");
            None
        };

        let stack = MediaStack::from_config(config);
        let resolver = stack.resolver.clone();
        let converter = Converter::from_config(stack, &config.media);
        let jobs = JobManager::new(converter, config.output.work_dir.clone(), &config.jobs);

        Ok(Self {
            catalog,
            resolver,
            jobs,
            validator: InputValidator::new(),
            search_results: config.media.search_results,
            info: SystemInfo {
                demo_mode: config.demo_mode,
                media: config.media.clone(),
                work_dir: config.output.work_dir.clone(),
                started_at: Instant::now(),
            },
        })
    }

    pub fn catalog(&self) -> Result<&Arc<dyn CatalogSource>> {
        self.catalog.as_ref().ok_or_else(|| {
            AppError::CatalogNotConfigured(
                "Spotify API not configured. Please check environment variables.".to_string(),
            )
        })
    }
}
