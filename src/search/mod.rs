pub mod ranking;

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{Track, VideoResult};
use crate::errors::Result;

/// Maps a track description to candidate media sources on the video platform.
#[async_trait::async_trait]
pub trait MediaResolver: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>>;

    /// Candidates for a track, best first. Falls back through the query
    /// variations until one of them returns results.
    async fn resolve(&self, track: &Track, limit: usize) -> Result<Vec<VideoResult>> {
        let mut last_error = None;

        for query in ranking::query_variations(&track.search_query()) {
            match self.search(&query, limit).await {
                Ok(results) if !results.is_empty() => {
                    log::info!("🎯 [SEARCH] '{}' gave {} candidates", query, results.len());
                    return Ok(ranking::rank_by_duration(results, track.duration_ms));
                }
                Ok(_) => log::info!("🔍 [SEARCH] No results for '{}'", query),
                Err(e) => {
                    log::warn!("⚠️ [SEARCH] Search for '{}' failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Caches search results of another resolver for a fixed time.
pub struct SearchManager {
    backend: Arc<dyn MediaResolver>,
    cache: Cache<String, Arc<Vec<VideoResult>>>,
}

impl SearchManager {
    pub fn new(backend: Arc<dyn MediaResolver>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(ttl)
            .build();
        Self { backend, cache }
    }

    fn cache_key(query: &str, limit: usize) -> String {
        format!("{}:{}", limit, query.trim().to_lowercase())
    }
}

#[async_trait::async_trait]
impl MediaResolver for SearchManager {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        let key = Self::cache_key(query, limit);
        if let Some(cached) = self.cache.get(&key).await {
            log::debug!("💾 [SEARCH] Cache hit for '{}'", query);
            return Ok(cached.as_ref().clone());
        }

        let results = self.backend.search(query, limit).await?;
        // Empty answers are not cached so a later fallback query can retry.
        if !results.is_empty() {
            self.cache.insert(key, Arc::new(results.clone())).await;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        answers_for: &'static str,
    }

    #[async_trait::async_trait]
    impl MediaResolver for CountingBackend {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<VideoResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !query.ends_with(self.answers_for) {
                return Ok(Vec::new());
            }
            Ok(vec![VideoResult {
                id: "vid".to_string(),
                title: query.to_string(),
                duration: Some("3:20".to_string()),
                duration_secs: Some(200.0),
                views: Some(10),
                channel: None,
                url: "https://www.youtube.com/watch?v=vid".to_string(),
                thumbnail: None,
            }])
        }
    }

    #[tokio::test]
    async fn repeated_searches_hit_the_cache() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            answers_for: "",
        });
        let manager = SearchManager::new(backend.clone(), Duration::from_secs(60));

        manager.search("Song Artist", 5).await.unwrap();
        manager.search("song artist ", 5).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        manager.search("Song Artist", 3).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolve_walks_query_variations() {
        let backend = CountingBackend {
            calls: AtomicUsize::new(0),
            answers_for: " audio",
        };
        let track = Track::new("Song", vec!["Artist".to_string()], 200_000);

        let candidates = backend.resolve(&track, 5).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Song Artist official audio");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolve_returns_empty_when_nothing_matches() {
        let backend = CountingBackend {
            calls: AtomicUsize::new(0),
            answers_for: "never",
        };
        let track = Track::new("Song", vec!["Artist".to_string()], 0);

        assert!(backend.resolve(&track, 5).await.unwrap().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
}
