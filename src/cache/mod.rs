//! In-process query cache shared by the read models.
//!
//! Three disciplines, per the concurrency model of the subsystem:
//!
//! - **Deduplication**: concurrent fetches for the same canonical key share
//!   one backend call; late arrivals wait on a per-key lock and read the
//!   fresh entry.
//! - **Latest wins**: invalidation bumps a global generation; a fetch that
//!   started under an older generation returns its value to its own caller
//!   but is never inserted, so a stale in-flight response cannot shadow a
//!   newer write.
//! - **Prefix invalidation**: every view of the transfer collection lives
//!   under the `transfers:` key space, and mutations drop the whole space in
//!   one call.
//!
//! Values are stored as JSON strings so one map serves every result shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::Future;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::ServiceError;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    generation: u64,
    expires_at: Instant,
}

pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    generation: AtomicU64,
    default_ttl: Duration,
}

impl QueryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            generation: AtomicU64::new(0),
            default_ttl,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Drops every entry under `prefix` and bumps the generation so that
    /// in-flight fetches started before this call cannot re-populate the
    /// cache with pre-invalidation data.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now()
            || entry.generation != self.generation.load(Ordering::SeqCst)
        {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        serde_json::from_str(&entry.payload).ok()
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches the
    /// result. Concurrent callers with the same key serialize on a per-key
    /// lock, so exactly one of them reaches the backend.
    pub async fn get_or_fetch<T, Fut>(
        &self,
        key: &str,
        fetch: impl FnOnce() -> Fut,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if let Some(hit) = self.lookup::<T>(key) {
            return Ok(hit);
        }

        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A waiter that lost the race reads what the winner inserted.
        if let Some(hit) = self.lookup::<T>(key) {
            return Ok(hit);
        }

        let started_generation = self.generation.load(Ordering::SeqCst);
        let value = fetch().await?;

        if self.generation.load(Ordering::SeqCst) == started_generation {
            match serde_json::to_string(&value) {
                Ok(payload) => {
                    self.entries.insert(
                        key.to_string(),
                        CacheEntry {
                            payload,
                            generation: started_generation,
                            expires_at: Instant::now() + self.default_ttl,
                        },
                    );
                }
                Err(err) => warn!(key = key, error = %err, "failed to serialize cache entry"),
            }
        } else {
            debug!(key = key, "discarding fetch result from a stale generation");
        }

        Ok(value)
    }
}
