//! Cache tiers and their storage backends
//!
//! Each tier is a capability behind the [`TierBackend`] trait so the
//! promotion algorithm never depends on a specific storage technology. The
//! bundled [`MemoryTier`] backend is an in-process LRU store with TTL
//! awareness and an availability toggle for outage simulation and degraded
//! operation.

use crate::cache::key::{CacheKey, KeyPattern};
use crate::traits::ContentArtifact;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The four ordered tiers, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLevel {
    Edge,
    Application,
    Durable,
    Predictive,
}

impl TierLevel {
    /// Scan order for reads and cascade writes
    pub const ORDERED: [TierLevel; 4] = [
        TierLevel::Edge,
        TierLevel::Application,
        TierLevel::Durable,
        TierLevel::Predictive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TierLevel::Edge => "edge",
            TierLevel::Application => "application",
            TierLevel::Durable => "durable",
            TierLevel::Predictive => "predictive",
        }
    }
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One cached artifact in one tier
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: ContentArtifact,
    pub created_at: Instant,
    pub ttl: Duration,
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: ContentArtifact, ttl: Duration) -> Self {
        let size_bytes = payload.size_bytes();
        Self {
            key,
            payload,
            created_at: Instant::now(),
            ttl,
            size_bytes,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }

    /// Copy of this entry with a fresh creation time and a new TTL,
    /// used when promoting into a faster tier.
    pub fn refreshed(&self, ttl: Duration) -> Self {
        Self {
            key: self.key.clone(),
            payload: self.payload.clone(),
            created_at: Instant::now(),
            ttl,
            size_bytes: self.size_bytes,
        }
    }
}

/// Storage capability of a single tier
#[async_trait]
pub trait TierBackend: Send + Sync {
    fn level(&self) -> TierLevel;

    /// Whether the tier is currently reachable. Unavailable tiers read as
    /// permanent miss and skip writes; the rest of the hierarchy keeps
    /// serving.
    fn is_available(&self) -> bool;

    /// Mark the tier reachable or unreachable (outage handling)
    fn set_available(&self, available: bool);

    /// Fresh entry or nothing. Expired entries are left in place for
    /// serve-stale fallback until evicted.
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Any entry, expired or not
    async fn get_any(&self, key: &CacheKey) -> Option<CacheEntry>;

    async fn set(&self, entry: CacheEntry);

    async fn remove(&self, key: &CacheKey) -> bool;

    /// Remove all entries matching the pattern, returning how many
    async fn remove_matching(&self, pattern: &KeyPattern) -> usize;

    async fn len(&self) -> usize;
}

/// In-process LRU tier backend
pub struct MemoryTier {
    level: TierLevel,
    store: Mutex<LruCache<CacheKey, CacheEntry>>,
    available: AtomicBool,
}

impl MemoryTier {
    pub fn new(level: TierLevel, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            level,
            store: Mutex::new(LruCache::new(capacity)),
            available: AtomicBool::new(true),
        }
    }

}

#[async_trait]
impl TierBackend for MemoryTier {
    fn level(&self) -> TierLevel {
        self.level
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            tracing::warn!(tier = %self.level, "Cache tier marked unavailable");
        } else {
            tracing::info!(tier = %self.level, "Cache tier available again");
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.is_available() {
            return None;
        }
        let mut store = self.store.lock();
        match store.get(key) {
            Some(entry) if entry.is_fresh() => Some(entry.clone()),
            _ => None,
        }
    }

    async fn get_any(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.is_available() {
            return None;
        }
        self.store.lock().peek(key).cloned()
    }

    async fn set(&self, entry: CacheEntry) {
        if !self.is_available() {
            return;
        }
        self.store.lock().put(entry.key.clone(), entry);
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        if !self.is_available() {
            return false;
        }
        self.store.lock().pop(key).is_some()
    }

    async fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        if !self.is_available() {
            return 0;
        }
        let mut store = self.store.lock();
        let matching: Vec<CacheKey> = store
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            store.pop(key);
        }
        matching.len()
    }

    async fn len(&self) -> usize {
        self.store.lock().len()
    }
}
