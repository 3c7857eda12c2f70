//! Cache store
//!
//! Key-value caching for identity data and session records. The store is
//! an explicitly constructed handle injected from the process entry point;
//! there is no lazily-initialized global. Redis backs production
//! deployments; an in-memory TTL map serves cache-less deployments and
//! tests. The cache is a performance optimization, not a correctness
//! dependency: callers treat backend failures as misses and fall through
//! to the origin.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Cache key families
///
/// User, membership and workspace entries are independently keyed so they
/// can be independently invalidated.
pub mod keys {
    /// User profile
    pub fn user(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    /// User's workspace-membership list
    pub fn user_workspaces(user_id: &str) -> String {
        format!("user:{}:workspaces", user_id)
    }

    /// Workspace detail
    pub fn workspace(workspace_id: &str) -> String {
        format!("workspace:{}", workspace_id)
    }

    /// Session record (sliding expiry)
    pub fn session(session_id: &str) -> String {
        format!("session:{}", session_id)
    }
}

/// Backend contract: string keys and values, explicit TTLs
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites unconditionally; concurrent same-key writers are
    /// last-write-wins
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Idempotent; deleting an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Reset the entry's TTL without touching its value (sliding expiry)
    async fn refresh_expiry(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// Redis-backed cache
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis and build a shared connection manager
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.context("Redis GET failed")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .context("Redis SET failed")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.context("Redis DEL failed")?;
        Ok(())
    }

    async fn refresh_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .context("Redis EXPIRE failed")?;
        Ok(())
    }
}

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// In-memory TTL cache, used when no Redis URL is configured and in tests
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    fn evict_expired_locked(entries: &mut HashMap<String, MemoryEntry>) {
        entries.retain(|_, entry| !entry.is_expired());
    }

    fn find_oldest_key(entries: &HashMap<String, MemoryEntry>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(k, _)| k.clone())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries {
            Self::evict_expired_locked(&mut entries);
        }
        if entries.len() >= self.max_entries {
            if let Some(oldest) = Self::find_oldest_key(&entries) {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn refresh_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                entry.inserted_at = Instant::now();
                entry.ttl = ttl;
            }
        }
        Ok(())
    }
}

/// Typed facade over a cache backend, serializing values as JSON
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCache::default()))
    }

    /// Fetch and decode an entry. An undecodable entry (e.g. written by
    /// an older build) is dropped and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Dropping undecodable cache entry");
                let _ = self.backend.delete(key).await;
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value).context("Failed to encode cache value")?;
        self.backend.set(key, &raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn refresh_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        self.backend.refresh_expiry(key, ttl).await
    }
}
