//! In-memory conversation state with TTL, LRU-by-access eviction, and
//! debounce-batched write-through to an external `StateProvider`.

use crate::config::EngineConfig;
use crate::metrics;
use crate::state_provider::StateProvider;
use crate::types::{ConversationState, ConversationTuple};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct CacheEntry {
    state: ConversationState,
    last_access: i64,
}

/// Caches `ConversationState` in memory, evicting least-recently-accessed
/// entries once `max_size` is exceeded, and batching dirty writes to the
/// configured `StateProvider` on a debounce timer.
///
/// `SPEC_FULL.md` §4.4 calls out flush-before-evict as a correctness fix
/// over the source it's derived from: eviction here always flushes a dirty
/// victim before dropping it.
pub struct StateCache {
    entries: DashMap<String, CacheEntry>,
    dirty: DashMap<String, ()>,
    provider: Arc<dyn StateProvider>,
    ttl_cache_ms: i64,
    max_size: usize,
    flush_debounce_ms: u64,
    flush_scheduled: Arc<AtomicBool>,
}

impl StateCache {
    pub fn new(config: &EngineConfig, provider: Arc<dyn StateProvider>) -> Self {
        Self {
            entries: DashMap::new(),
            dirty: DashMap::new(),
            provider,
            ttl_cache_ms: config.ttl_cache_ms,
            max_size: config.max_size,
            flush_debounce_ms: config.flush_debounce_ms,
            flush_scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the cached state if present and not stale, refreshing its
    /// access time on hit.
    pub fn get(&self, tuple: &ConversationTuple, now_ms: i64) -> Option<ConversationState> {
        let key = tuple.key();
        let mut entry = self.entries.get_mut(&key)?;
        if now_ms - entry.last_access >= self.ttl_cache_ms {
            return None;
        }
        entry.last_access = now_ms;
        Some(entry.state.clone())
    }

    /// Inserts or replaces the cached state for `tuple`. Evicts the
    /// least-recently-accessed entry first if this insert would exceed
    /// `max_size`, flushing it if dirty.
    pub async fn set(&self, tuple: &ConversationTuple, state: ConversationState, now_ms: i64) {
        let key = tuple.key();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_lru(now_ms).await;
        }
        self.entries.insert(
            key,
            CacheEntry {
                state,
                last_access: now_ms,
            },
        );
    }

    async fn evict_lru(&self, now_ms: i64) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_access)
            .map(|e| e.key().clone());
        let Some(victim) = victim else {
            return;
        };
        if self.dirty.remove(&victim).is_some() {
            if let Some(entry) = self.entries.get(&victim) {
                if let Err(err) = self.provider.save(&entry.state).await {
                    tracing::warn!(key = %victim, error = %err, "flush-before-evict failed");
                }
            }
        }
        self.entries.remove(&victim);
        metrics::record_cache_eviction();
        let _ = now_ms;
    }

    /// Marks `tuple` as needing persistence and arms the debounce flush
    /// timer if it isn't already running.
    pub fn mark_dirty(self: &Arc<Self>, tuple: &ConversationTuple) {
        self.dirty.insert(tuple.key(), ());
        if self
            .flush_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let cache = Arc::clone(self);
            let debounce = Duration::from_millis(cache.flush_debounce_ms);
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                cache.flush_scheduled.store(false, Ordering::SeqCst);
                cache.flush_writes().await;
            });
        }
    }

    /// Persists every dirty entry via the configured provider and clears
    /// the dirty set. Provider errors are logged and non-fatal (§7).
    pub async fn flush_writes(&self) {
        let dirty_keys: Vec<String> = self.dirty.iter().map(|e| e.key().clone()).collect();
        if dirty_keys.is_empty() {
            return;
        }
        metrics::record_flush_batch();
        for key in dirty_keys {
            self.dirty.remove(&key);
            if let Some(entry) = self.entries.get(&key) {
                if let Err(err) = self.provider.save(&entry.state).await {
                    tracing::warn!(key = %key, error = %err, "state flush failed");
                }
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.dirty.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}
