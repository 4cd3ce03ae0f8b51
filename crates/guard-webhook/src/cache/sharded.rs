//! Sharded in-memory decision cache with time-windowed expiry

use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::config::CacheConfig;
use super::error::{CacheError, CacheResult};
use super::provider::{CacheStats, DecisionStore};
use crate::observability;

/// Queue entries beyond `2 * live + COMPACT_SLACK` trigger a compaction
const COMPACT_SLACK: usize = 32;

struct Entry {
    allowed: bool,
    inserted_at: Instant,
    generation: u64,
}

impl Entry {
    fn is_fresh(&self, now: Instant, life_window: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < life_window
    }
}

/// One independently locked partition.
///
/// `order` records insertions oldest first. An overwrite pushes a new
/// `(key, generation)` pair and leaves the old pair stale, so only pairs whose
/// generation matches the live entry count.
#[derive(Default)]
struct Shard {
    entries: HashMap<String, Entry>,
    order: VecDeque<(String, u64)>,
    generation: u64,
}

enum Lookup {
    Hit(bool),
    Expired,
    Miss,
}

impl Shard {
    fn lookup(&mut self, key: &str, now: Instant, life_window: Duration) -> Lookup {
        let state = self
            .entries
            .get(key)
            .map(|entry| (entry.allowed, entry.is_fresh(now, life_window)));

        match state {
            Some((allowed, true)) => Lookup::Hit(allowed),
            Some((_, false)) => {
                self.entries.remove(key);
                Lookup::Expired
            }
            None => Lookup::Miss,
        }
    }

    /// Overwrite an existing entry in place, `false` when the key is absent
    fn refresh(&mut self, key: &str, allowed: bool, now: Instant) -> bool {
        let generation = self.generation + 1;
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.allowed = allowed;
        entry.inserted_at = now;
        entry.generation = generation;

        self.generation = generation;
        self.push_order(key, generation);
        true
    }

    /// Insert or overwrite, returning `true` when a new entry was added
    fn upsert(&mut self, key: &str, allowed: bool, now: Instant) -> bool {
        if self.refresh(key, allowed, now) {
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        self.entries.insert(
            key.to_owned(),
            Entry {
                allowed,
                inserted_at: now,
                generation,
            },
        );
        self.push_order(key, generation);
        true
    }

    fn push_order(&mut self, key: &str, generation: u64) {
        self.order.push_back((key.to_owned(), generation));
        if self.order.len() > self.entries.len().saturating_mul(2) + COMPACT_SLACK {
            self.compact();
        }
    }

    /// Insertion time of the oldest live entry, dropping stale queue pairs on the way
    fn oldest(&mut self) -> Option<Instant> {
        while let Some((key, generation)) = self.order.front() {
            if let Some(entry) = self
                .entries
                .get(key)
                .filter(|entry| entry.generation == *generation)
            {
                return Some(entry.inserted_at);
            }
            self.order.pop_front();
        }
        None
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, generation)) = self.order.pop_front() {
            if self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    /// Drop expired entries from the front of the queue.
    ///
    /// Insertion times are monotonic within a shard, so the scan stops at the
    /// first fresh live entry.
    fn sweep(&mut self, now: Instant, life_window: Duration) -> u64 {
        let mut removed = 0;

        while let Some((key, generation)) = self.order.front() {
            let live = self
                .entries
                .get(key)
                .filter(|entry| entry.generation == *generation);

            if let Some(entry) = live {
                if entry.is_fresh(now, life_window) {
                    break;
                }
                self.entries.remove(key);
                removed += 1;
            }
            self.order.pop_front();
        }

        removed
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order.retain(|(key, generation)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.generation == *generation)
        });
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    rejected: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Bounded, sharded, time-windowed decision cache.
///
/// A key hash selects one of `shards` partitions, each guarded by its own
/// mutex, so concurrent requests only contend when they land on the same
/// shard. The total entry count across all shards never exceeds
/// `max_entries`: a new key arriving at the cap first evicts the oldest entry
/// of the whole cache. Entries older than the life window are never returned
/// and are dropped by [`CacheSweeper`] every clean window.
pub struct ShardedCache {
    shards: Box<[Mutex<Shard>]>,
    mask: usize,
    hasher: RandomState,
    config: CacheConfig,
    /// Live entries plus slots claimed by inserts in progress
    occupied: AtomicUsize,
    counters: Counters,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ShardedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedCache")
            .field("shards", &self.shards.len())
            .field("max_entries", &self.config.max_entries)
            .field("life_window", &self.config.life_window)
            .field("clean_window", &self.config.clean_window)
            .field("entry_count", &self.len())
            .finish_non_exhaustive()
    }
}

impl ShardedCache {
    /// Create a cache without a background sweeper
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let shards = (0..config.shards)
            .map(|_| Mutex::new(Shard::default()))
            .collect();

        Ok(Self {
            shards,
            mask: config.shards - 1,
            hasher: RandomState::new(),
            config,
            occupied: AtomicUsize::new(0),
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a cache and spawn its sweeper on the current tokio runtime
    pub fn start(config: CacheConfig) -> CacheResult<Arc<Self>> {
        let cache = Arc::new(Self::new(config)?);
        CacheSweeper::new(&cache).spawn();
        Ok(cache)
    }

    /// Bytes accounted against the per-entry ceiling: the key plus one value byte
    #[must_use]
    pub const fn entry_size(key: &str) -> usize {
        key.len() + 1
    }

    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of stored entries, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().entries.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry older than the life window, returning how many were dropped
    pub fn sweep_expired(&self) -> u64 {
        let now = Instant::now();
        let removed: u64 = self
            .shards
            .iter()
            .map(|shard| shard.lock().sweep(now, self.config.life_window))
            .sum();

        self.occupied
            .fetch_sub(removed as usize, Ordering::AcqRel);
        self.counters
            .expirations
            .fetch_add(removed, Ordering::Relaxed);
        removed
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash & self.mask]
    }

    /// Claim room for one new entry, evicting the oldest entries while at the cap.
    ///
    /// Returns the number of evicted entries.
    fn reserve_slot(&self) -> u64 {
        let mut evicted = 0;
        loop {
            let current = self.occupied.load(Ordering::Acquire);
            if current < self.config.max_entries {
                if self
                    .occupied
                    .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return evicted;
                }
                continue;
            }

            if self.evict_oldest() {
                evicted += 1;
            } else {
                // Every counted slot belongs to an insert still in flight
                self.occupied.fetch_add(1, Ordering::AcqRel);
                return evicted;
            }
        }
    }

    /// Evict the entry with the earliest insertion time across all shards
    fn evict_oldest(&self) -> bool {
        loop {
            let oldest = self
                .shards
                .iter()
                .enumerate()
                .filter_map(|(index, shard)| shard.lock().oldest().map(|at| (at, index)))
                .min_by_key(|(at, _)| *at);

            let Some((_, index)) = oldest else {
                return false;
            };

            if self.shards[index].lock().evict_oldest() {
                self.occupied.fetch_sub(1, Ordering::AcqRel);
                return true;
            }
        }
    }
}

impl DecisionStore for ShardedCache {
    fn get(&self, key: &str) -> Option<bool> {
        let lookup = self
            .shard_for(key)
            .lock()
            .lookup(key, Instant::now(), self.config.life_window);

        match lookup {
            Lookup::Hit(allowed) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(allowed)
            }
            Lookup::Expired => {
                self.occupied.fetch_sub(1, Ordering::AcqRel);
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Miss => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &str, allowed: bool) -> CacheResult<()> {
        let size = Self::entry_size(key);
        if size > self.config.max_entry_size {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.config.max_entry_size,
            });
        }

        let shard = self.shard_for(key);
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        if shard.lock().refresh(key, allowed, Instant::now()) {
            return Ok(());
        }

        let evicted = self.reserve_slot();
        if !shard.lock().upsert(key, allowed, Instant::now()) {
            // Another writer added the same key first
            self.occupied.fetch_sub(1, Ordering::AcqRel);
        }

        if evicted > 0 {
            self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            entry_count: self.entry_count(),
        }
    }

    fn entry_count(&self) -> u64 {
        self.occupied.load(Ordering::Acquire) as u64
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ShardedCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Background task that sweeps expired entries every clean window
pub struct CacheSweeper {
    cache: Weak<ShardedCache>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for CacheSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSweeper")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl CacheSweeper {
    #[must_use]
    pub fn new(cache: &Arc<ShardedCache>) -> Self {
        Self {
            cache: Arc::downgrade(cache),
            interval: cache.config.clean_window,
            shutdown: cache.shutdown.clone(),
        }
    }

    /// Drop expired entries and publish the resulting cache size
    pub fn sweep_once(cache: &ShardedCache) -> u64 {
        let removed = cache.sweep_expired();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired decisions");
        }
        observability::set_cache_size(cache.entry_count());
        removed
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cache) = self.cache.upgrade() else {
                            break;
                        };
                        Self::sweep_once(&cache);
                    }
                    () = self.shutdown.cancelled() => {
                        tracing::debug!("Decision cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
