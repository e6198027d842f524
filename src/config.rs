use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, Result};
use crate::processing::{AudioFormat, AudioQuality, ProcessingOptions};

const ENV_PREFIX: &str = "NASMYTUNES";

/// Variables understood by earlier deployments, mapped onto config keys.
const LEGACY_ENV_KEYS: [(&str, &str); 4] = [
    ("SPOTIFY_CLIENT_ID", "catalog.client_id"),
    ("SPOTIFY_CLIENT_SECRET", "catalog.client_secret"),
    ("PORT", "server.port"),
    ("DEMO_MODE", "demo_mode"),
];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub media: MediaConfig,
    pub output: OutputConfig,
    pub jobs: JobsConfig,
    pub proxy: Option<String>,
    pub demo_mode: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MediaConfig {
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: Option<PathBuf>,
    pub search_results: usize,
    pub max_candidates: usize,
    pub attempts_per_candidate: u32,
    pub retry_delay_ms: u64,
    pub search_cache_ttl_secs: u64,
    pub transcode_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub work_dir: PathBuf,
    pub format: AudioFormat,
    pub quality: AudioQuality,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub max_concurrent_jobs: usize,
    pub job_ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            static_dir: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: "https://api.spotify.com/v1".to_string(),
            accounts_base_url: "https://accounts.spotify.com".to_string(),
            page_size: 100,
            request_timeout_secs: 15,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: None,
            search_results: 5,
            max_candidates: 3,
            attempts_per_candidate: 2,
            retry_delay_ms: 2000,
            search_cache_ttl_secs: 3600,
            transcode_timeout_secs: 300,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("nasmytunes"),
            format: AudioFormat::Mp3,
            quality: AudioQuality::Medium,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            job_ttl_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl CatalogConfig {
    pub fn has_credentials(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.client_id) && present(&self.client_secret)
    }
}

impl OutputConfig {
    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            format: self.format,
            quality: self.quality,
        }
    }
}

impl AppConfig {
    /// Loads defaults, then the config file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, &env)
    }

    pub fn load_with_env(path: Option<&Path>, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::get_config_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone().into_iter().collect())),
        );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = env.get(var).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder.set_override_option(key, value)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nasmytunes").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "jobs.max_concurrent_jobs must be at least 1".to_string(),
            )));
        }
        if self.jobs.sweep_interval_secs == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "jobs.sweep_interval_secs must be at least 1".to_string(),
            )));
        }
        if self.catalog.page_size == 0|| self.catalog.page_size > 100 {
            return Err(AppError::Config(config::ConfigError::Message(
                "catalog.page_size must be between 1 and 100".to_string(),
            )));
        }
        if self.media.max_candidates == 0 || self.media.attempts_per_candidate == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "media.max_candidates and media.attempts_per_candidate must be at least 1"
                    .to_string(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();

        let config = AppConfig::load_with_env(Some(path.as_path()), &HashMap::new()).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.jobs.job_ttl_hours, 24);
        assert_eq!(config.output.format, AudioFormat::Mp3);
        assert!(!config.demo_mode);
        assert!(!config.catalog.has_credentials());
    }

    #[test]
    fn legacy_variables_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nport = 8080\n\n[catalog]\nclient_id = \"from-file\"").unwrap();

        let vars = env(&[
            ("SPOTIFY_CLIENT_ID", "abc"),
            ("SPOTIFY_CLIENT_SECRET", "def"),
            ("PORT", "9000"),
            ("DEMO_MODE", "true"),
        ]);
        let config = AppConfig::load_with_env(Some(path.as_path()), &vars).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.catalog.client_id.as_deref(), Some("abc"));
        assert!(config.catalog.has_credentials());
        assert!(config.demo_mode);
    }

    #[test]
    fn prefixed_variables_reach_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let vars = env(&[
            ("NASMYTUNES_JOBS__MAX_CONCURRENT_JOBS", "2"),
            ("NASMYTUNES_OUTPUT__FORMAT", "m4a"),
        ]);
        let config = AppConfig::load_with_env(Some(path.as_path()), &vars).unwrap();
        assert_eq!(config.jobs.max_concurrent_jobs, 2);
        assert_eq!(config.output.format, AudioFormat::M4a);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[jobs]\nmax_concurrent_jobs = 0\n").unwrap();

        let err = AppConfig::load_with_env(Some(path.as_path()), &HashMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
