//! Two-tier response cache over a pluggable key-value store.
//!
//! The raw tier keeps origin fetch results keyed by the untransformed
//! target URL. The processed tier keeps fully rewritten variant playlists.
//! Reads are awaited; writes are spawned and never awaited by the request
//! that produced them. Store failures only cost hit rate: they are logged
//! and the request carries on as a miss.

use crate::metrics;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[cfg(feature = "valkey")]
use redis::aio::ConnectionManager;
#[cfg(feature = "valkey")]
use tracing::info;

/// Errors raised by cache stores. Never leaves the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    #[cfg(feature = "valkey")]
    #[error("valkey error: {0}")]
    Valkey(#[from] redis::RedisError),

    #[error("cache value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value capability the proxy needs from a cache service
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a live value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `expire_after`.
    async fn put(&self, key: &str, value: String, expire_after: Duration)
    -> Result<(), CacheError>;

    /// Evict expired entries.
    ///
    /// Default: no-op, for stores that expire entries natively.
    async fn purge_expired(&self) {}

    /// Short backend name for logs and the health report
    fn name(&self) -> &'static str;
}

/// Store used when no cache service is bound: every read misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStore;

#[async_trait]
impl KvStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process store with per-entry expiry.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
            // Stale: drop the read guard before removing
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, expire_after: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + expire_after,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Valkey/Redis-backed store; expiry is native (`SET ... EX`).
#[cfg(feature = "valkey")]
#[derive(Clone)]
pub struct ValkeyStore {
    conn: ConnectionManager,
    key_prefix: String,
}

#[cfg(feature = "valkey")]
impl ValkeyStore {
    /// Connect to the Valkey server at `url`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Valkey at {}", url);
        Ok(Self {
            conn,
            key_prefix: "hls-relay".to_string(),
        })
    }
}

#[cfg(feature = "valkey")]
#[async_trait]
impl KvStore for ValkeyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(format!("{}:{}", self.key_prefix, key))
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, expire_after: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(format!("{}:{}", self.key_prefix, key))
            .arg(value)
            .arg("EX")
            .arg(expire_after.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "valkey"
    }
}

/// Cache tiers, each with its own key namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheTier {
    /// Origin fetch results
    Raw,
    /// Rewritten variant playlists
    Processed,
}

impl CacheTier {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheTier::Raw => "raw",
            CacheTier::Processed => "processed",
        }
    }

    /// Store key for `url` in this tier, e.g. `raw:https://...`
    pub fn key(self, url: &str) -> String {
        format!("{}:{}", self.as_str(), url)
    }
}

/// Raw-tier value: origin body plus its lowercased response headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl RawEntry {
    /// Declared content type, empty when the origin sent none
    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Tiered cache handle shared by all requests.
#[derive(Clone)]
pub struct ProxyCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    writes: TaskTracker,
}

impl ProxyCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            writes: TaskTracker::new(),
        }
    }

    /// Cache that never hits
    pub fn disabled(ttl: Duration) -> Self {
        Self::new(Arc::new(NoopStore), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read `url` from `tier`. Store errors read as a miss.
    pub async fn get(&self, tier: CacheTier, url: &str) -> Option<String> {
        let key = tier.key(url);
        let value = match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };

        let hit = value.is_some();
        debug!("[cache {}] {}", if hit { "hit" } else { "miss" }, key);
        metrics::record_cache_lookup(tier, hit);
        value
    }

    /// Schedule a write of `value` under `url` in `tier`.
    ///
    /// Returns immediately; the write runs in the background and its
    /// failure is only logged.
    pub fn put(&self, tier: CacheTier, url: &str, value: String) {
        let store = Arc::clone(&self.store);
        let key = tier.key(url);
        let ttl = self.ttl;

        self.writes.spawn(async move {
            match store.put(&key, value, ttl).await {
                Ok(()) => debug!("Cached {}", key),
                Err(e) => warn!("Cache write failed for {}: {}", key, e),
            }
        });
    }

    /// Raw-tier lookup. A malformed cached value reads as a miss.
    pub async fn get_raw(&self, url: &str) -> Option<RawEntry> {
        let json = self.get(CacheTier::Raw, url).await?;
        match serde_json::from_str(&json) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring malformed raw cache entry for {}: {}", url, e);
                None
            }
        }
    }

    /// Schedule a raw-tier write.
    pub fn put_raw(&self, url: &str, entry: &RawEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.put(CacheTier::Raw, url, json),
            Err(e) => warn!("Failed to encode raw cache entry for {}: {}", url, e),
        }
    }

    pub async fn get_processed(&self, url: &str) -> Option<String> {
        self.get(CacheTier::Processed, url).await
    }

    pub fn put_processed(&self, url: &str, playlist: String) {
        self.put(CacheTier::Processed, url, playlist);
    }

    /// Wait for every write scheduled so far to finish.
    pub async fn flush(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }
}
