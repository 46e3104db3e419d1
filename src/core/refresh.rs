//! TTL-driven refresh of cached flag snapshots.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cache::Cache;
use crate::error::Result;
use crate::http::RemoteFlagFetcher;
use crate::types::FlagSnapshot;

/// Something that can produce a fresh snapshot on demand.
///
/// `Ok(None)` means the source gave up without an error; it is treated as a
/// miss and leaves any cached entry alone.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Option<Arc<FlagSnapshot>>>> + Send;
}

impl SnapshotSource for RemoteFlagFetcher {
    fn fetch(&self) -> impl Future<Output = Result<Option<Arc<FlagSnapshot>>>> + Send {
        RemoteFlagFetcher::fetch(self)
    }
}

/// Serves cached snapshots and refreshes them once they go stale.
///
/// At most one refresh per key runs at a time. A caller that finds an expired
/// entry while a refresh is already in flight gets the expired snapshot back
/// immediately; a caller with nothing cached waits for the refresh.
pub struct RefreshCoordinator<S> {
    source: S,
    cache: Cache<String, Arc<FlagSnapshot>>,
    ttl: Duration,
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: SnapshotSource> RefreshCoordinator<S> {
    pub fn new(source: S, ttl: Duration, max_entries: usize) -> Self {
        Self {
            source,
            cache: Cache::new(max_entries),
            ttl,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot for `key`, fetching a new one if the cached entry is
    /// missing or stale.
    ///
    /// Fetch errors and misses are returned as-is; the previous entry is kept
    /// and remains reachable through [`last_known`](Self::last_known).
    pub async fn get_current(&self, key: &str) -> Result<Option<Arc<FlagSnapshot>>> {
        let key = key.to_string();
        let existing = self.cache.get(&key);

        if let Some(entry) = &existing {
            if !entry.is_stale(Instant::now()) {
                return Ok(Some(Arc::clone(&entry.value)));
            }
        }

        let gate = self.gate_for(&key);
        let _guard = match gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(entry) = existing {
                    tracing::trace!(key = %key, "Refresh in flight, serving stale snapshot");
                    return Ok(Some(entry.value));
                }
                gate.lock().await
            }
        };

        // Another task may have finished a refresh while we waited.
        if let Some(entry) = self.cache.peek(&key) {
            if !entry.is_stale(Instant::now()) {
                return Ok(Some(entry.value));
            }
        }

        tracing::debug!(key = %key, "Snapshot stale, refreshing");

        match self.source.fetch().await? {
            Some(snapshot) => {
                self.cache.insert(key, Arc::clone(&snapshot), self.ttl);
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// The most recent snapshot stored for `key`, whether or not it is stale.
    pub fn last_known(&self, key: &str) -> Option<Arc<FlagSnapshot>> {
        self.cache.peek(&key.to_string()).map(|entry| entry.value)
    }

    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.cache
            .peek(&key.to_string())
            .and_then(|entry| entry.expires_at)
    }

    pub fn is_fresh(&self, key: &str) -> bool {
        self.cache.is_fresh(&key.to_string())
    }

    /// Drop the entry for `key` so the next lookup fetches.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(&key.to_string())
    }

    fn gate_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock();
        Arc::clone(
            gates
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
