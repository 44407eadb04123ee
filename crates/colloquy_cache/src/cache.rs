//! In-memory response cache implementation.

use async_trait::async_trait;
use colloquy_core::{CacheKey, CachedResponse};
use colloquy_error::{CacheError, ColloquyResult};
use colloquy_interface::ResponseCache;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Configuration for the response cache.
#[derive(
    Debug, Clone, Serialize, Deserialize, Getters, derive_setters::Setters, derive_builder::Builder,
)]
#[setters(prefix = "with_")]
pub struct ResponseCacheConfig {
    /// Maximum number of entries; unbounded when `None`
    #[serde(default)]
    #[builder(default)]
    max_entries: Option<usize>,

    /// Whether the cache is consulted at all
    #[serde(default = "default_enabled")]
    #[builder(default = "true")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            enabled: default_enabled(),
        }
    }
}

impl ResponseCacheConfig {
    /// Start a builder.
    pub fn builder() -> ResponseCacheConfigBuilder {
        ResponseCacheConfigBuilder::default()
    }
}

/// Lookup statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Getters)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
    stores: u64,
    evictions: u64,
    entries: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CachedResponse>,
    access_order: VecDeque<CacheKey>,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(key.clone());
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self.access_order.pop_front() {
            tracing::debug!(key = %oldest, "Evicting least recently used entry");
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
    }
}

/// Response cache held in memory.
///
/// Entries never expire; a bounded cache evicts the least recently used key
/// once `max_entries` is reached.
///
/// # Example
///
/// ```
/// use colloquy_cache::{InMemoryResponseCache, ResponseCacheConfig};
///
/// let cache = InMemoryResponseCache::new(ResponseCacheConfig::default());
/// assert!(cache.is_empty());
/// ```
#[derive(Debug)]
pub struct InMemoryResponseCache {
    config: ResponseCacheConfig,
    inner: Mutex<Inner>,
}

impl Default for InMemoryResponseCache {
    fn default() -> Self {
        Self::new(ResponseCacheConfig::default())
    }
}

impl InMemoryResponseCache {
    /// Create an empty cache.
    pub fn new(config: ResponseCacheConfig) -> Self {
        tracing::debug!(
            max_entries = ?config.max_entries,
            enabled = config.enabled,
            "Creating response cache"
        );
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create a cache seeded with existing entries.
    pub fn with_entries(
        config: ResponseCacheConfig,
        entries: impl IntoIterator<Item = (CacheKey, CachedResponse)>,
    ) -> Self {
        let cache = Self::new(config);
        {
            let mut inner = cache.lock();
            for (key, entry) in entries {
                inner.touch(&key);
                inner.entries.insert(key, entry);
            }
        }
        cache
    }

    /// Load entries previously written by [`save_json`](Self::save_json).
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the file cannot be read or parsed.
    #[tracing::instrument(skip(config, path), fields(path = %path.as_ref().display()))]
    pub fn load_json(config: ResponseCacheConfig, path: impl AsRef<Path>) -> ColloquyResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheError::new(format!(
                "Failed to read cache file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let entries: BTreeMap<CacheKey, CachedResponse> = serde_json::from_str(&text)
            .map_err(|e| CacheError::new(format!("Failed to parse cache file: {}", e)))?;
        tracing::info!(entries = entries.len(), "Loaded response cache");
        Ok(Self::with_entries(config, entries))
    }

    /// Write every entry to `path` as a JSON object keyed by cache key.
    ///
    /// # Errors
    ///
    /// Returns a `CacheError` if the file cannot be written.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save_json(&self, path: impl AsRef<Path>) -> ColloquyResult<()> {
        let entries: BTreeMap<CacheKey, CachedResponse> = self.snapshot().into_iter().collect();
        let text = serde_json::to_string_pretty(&entries)
            .map_err(|e| CacheError::new(format!("Failed to serialize cache: {}", e)))?;
        std::fs::write(path.as_ref(), text).map_err(|e| {
            CacheError::new(format!(
                "Failed to write cache file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        tracing::info!(entries = entries.len(), "Saved response cache");
        Ok(())
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> Vec<(CacheKey, CachedResponse)> {
        self.lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn fetch(&self, key: &CacheKey) -> ColloquyResult<Option<CachedResponse>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut inner = self.lock();
        match inner.entries.get(key).cloned() {
            Some(entry) => {
                inner.stats.hits += 1;
                inner.touch(key);
                tracing::trace!("Cache hit");
                Ok(Some(entry))
            }
            None => {
                inner.stats.misses += 1;
                tracing::trace!("Cache miss");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self, entry), fields(key = %key))]
    async fn store(&self, key: CacheKey, entry: CachedResponse) -> ColloquyResult<()> {
        if !self.config.enabled {
            tracing::debug!("Cache disabled, skipping store");
            return Ok(());
        }

        let mut inner = self.lock();
        if let Some(max) = self.config.max_entries
            && inner.entries.len() >= max
            && !inner.entries.contains_key(&key)
        {
            inner.evict_lru();
        }
        inner.touch(&key);
        inner.entries.insert(key, entry);
        inner.stats.stores += 1;
        Ok(())
    }
}
