use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::http_pool::HttpPool;
use super::CatalogSource;
use crate::api::{Playlist, Track, TrackDetails};
use crate::config::CatalogConfig;
use crate::errors::{AppError, Result};

/// Tokens are refreshed this long before the catalog says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const MAX_IDLE_CONNECTIONS: usize = 10;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct PlaylistMeta {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    track: Option<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artists: Vec<RawArtist>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    album: Option<RawAlbum>,
    #[serde(default)]
    external_urls: HashMap<String, String>,
}

impl RawTrack {
    fn artist_names(&self) -> Vec<String> {
        self.artists
            .iter()
            .map(|artist| artist.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Episodes, local files without metadata and artist-less entries are
    /// dropped from playlists.
    fn into_track(self) -> Option<Track> {
        if self.kind.as_deref() != Some("track") {
            return None;
        }
        let artists = self.artist_names();
        let name = self.name.filter(|name| !name.trim().is_empty())?;
        if artists.is_empty() {
            return None;
        }
        Some(Track {
            id: self.id,
            name,
            artists,
            duration_ms: self.duration_ms,
            preview_url: self.preview_url,
        })
    }
}

/// Spotify Web API client using the client-credentials flow.
pub struct SpotifyClient {
    http: HttpPool,
    client_id: String,
    client_secret: String,
    api_base_url: String,
    accounts_base_url: String,
    page_size: u32,
    token: RwLock<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(config: &CatalogConfig, proxy: Option<&str>) -> Result<Self> {
        let (client_id, client_secret) = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) if config.has_credentials() => {
                (id.trim().to_string(), secret.trim().to_string())
            }
            _ => {
                return Err(AppError::CatalogNotConfigured(
                    "Spotify client id and secret are not set".to_string(),
                ))
            }
        };

        let mut http = HttpPool::new(MAX_IDLE_CONNECTIONS, config.request_timeout_secs)?;
        if let Some(proxy) = proxy {
            http = http.with_proxy(proxy)?;
        }

        Ok(Self {
            http,
            client_id,
            client_secret,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            accounts_base_url: config.accounts_base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another request may have refreshed it while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        log::info!("🔑 [CATALOG] Requesting client-credentials token");
        let response = self
            .http
            .get_client()
            .post(format!("{}/api/token", self.accounts_base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            log::error!("❌ [CATALOG] Token request rejected ({}): {}", status, body);
            return Err(AppError::CatalogAuth(format!(
                "Client credentials rejected ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(AppError::Catalog(format!("Token endpoint returned {}", status)));
        }

        let token: TokenResponse = response.json().await?;
        let value = token.access_token.clone();
        *slot = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        log::info!("✅ [CATALOG] Token acquired, valid for {}s", token.expires_in);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Authorized GET. A 401 drops the cached token and retries once.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, missing: &str) -> Result<T> {
        for attempt in 0..2 {
            let token = self.access_token().await?;
            let response = self
                .http
                .get_client()
                .get(url)
                .bearer_auth(&token)
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => return Ok(response.json::<T>().await?),
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    log::warn!("⚠️ [CATALOG] Token rejected, refreshing");
                    self.invalidate_token().await;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(AppError::CatalogAuth(
                        "Catalog rejected a freshly issued token".to_string(),
                    ))
                }
                StatusCode::NOT_FOUND => return Err(AppError::NotFound(missing.to_string())),
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| format!(", retry after {}s", v))
                        .unwrap_or_default();
                    log::warn!("⚠️ [CATALOG] Rate limited{}", retry_after);
                    return Err(AppError::RateLimited(format!(
                        "Catalog rate limit reached{}",
                        retry_after
                    )));
                }
                status => {
                    return Err(AppError::Catalog(format!(
                        "Catalog returned {} for {}",
                        status, url
                    )))
                }
            }
        }

        Err(AppError::CatalogAuth("Catalog authentication failed".to_string()))
    }
}

#[async_trait::async_trait]
impl CatalogSource for SpotifyClient {
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist> {
        let encoded_id = urlencoding::encode(playlist_id);
        log::info!("📋 [CATALOG] Fetching playlist {}", playlist_id);

        let meta: PlaylistMeta = self
            .get_json(
                &format!(
                    "{}/playlists/{}?fields=name,description",
                    self.api_base_url, encoded_id
                ),
                "Playlist not found",
            )
            .await?;

        let mut tracks = Vec::new();
        let mut skipped = 0usize;
        let mut pages = 0usize;
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit={}&offset=0",
            self.api_base_url, encoded_id, self.page_size
        ));

        while let Some(url) = next_url.take() {
            let page: TracksPage = self.get_json(&url, "Playlist not found").await?;
            pages += 1;
            for item in page.items {
                match item.track.and_then(RawTrack::into_track) {
                    Some(track) => tracks.push(track),
                    None => skipped += 1,
                }
            }
            next_url = page.next;
        }

        log::info!(
            "✅ [CATALOG] Playlist '{}': {} tracks over {} pages ({} skipped)",
            meta.name,
            tracks.len(),
            pages,
            skipped
        );

        Ok(Playlist {
            playlist_id: playlist_id.to_string(),
            name: meta.name,
            description: meta.description.filter(|d| !d.trim().is_empty()),
            total_tracks: tracks.len(),
            tracks,
        })
    }

    async fn track(&self, track_id: &str) -> Result<TrackDetails> {
        let raw: RawTrack = self
            .get_json(
                &format!("{}/tracks/{}", self.api_base_url, urlencoding::encode(track_id)),
                "Track not found",
            )
            .await?;

        let artists = raw.artist_names();
        Ok(TrackDetails {
            id: raw.id.unwrap_or_else(|| track_id.to_string()),
            name: raw.name.unwrap_or_default(),
            artists,
            album: raw.album.map(|album| album.name),
            duration_ms: raw.duration_ms,
            preview_url: raw.preview_url,
            external_urls: raw.external_urls,
        })
    }
}
