use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

/// A cached value and the instant after which it is considered stale.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Stale when no expiry was recorded or `now` is past it.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => true,
        }
    }
}

struct Slot<V> {
    entry: CacheEntry<V>,
    last_accessed: Instant,
}

/// Thread-safe, capacity-bounded cache with per-entry expiry and LRU eviction.
///
/// Expired entries are kept and handed out with their expiry so callers can
/// fall back to them; only capacity pressure removes an entry on its own.
pub struct Cache<K, V> {
    entries: RwLock<HashMap<K, Slot<V>>>,
    max_size: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> Cache<K, V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
        }
    }

    /// Look up an entry, fresh or stale, and mark it as recently used.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let mut entries = self.entries.write();
        let slot = entries.get_mut(key)?;
        slot.last_accessed = Instant::now();
        Some(slot.entry.clone())
    }

    /// Look up an entry without affecting eviction order.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.read().get(key).map(|slot| slot.entry.clone())
    }

    /// Replace the entry for `key`, expiring `ttl` from now.
    ///
    /// A `ttl` too large to represent is clamped to a far-future expiry, so the
    /// entry never goes stale on its own.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let entry = CacheEntry {
            value,
            expires_at: Some(expires_at),
        };

        let mut entries = self.entries.write();
        entries.insert(
            key,
            Slot {
                entry,
                last_accessed: now,
            },
        );

        self.evict_if_needed(&mut entries);
    }

    /// Whether a non-stale entry exists for `key`.
    pub fn is_fresh(&self, key: &K) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|slot| !slot.entry.is_stale(Instant::now()))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    fn evict_if_needed(&self, entries: &mut HashMap<K, Slot<V>>) {
        while entries.len() > self.max_size {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_accessed)
                .map(|(k, _)| k.clone());

            match lru_key {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
