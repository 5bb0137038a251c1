//! Multi-tier cache manager
//!
//! Reads scan edge → application → durable → predictive; a hit at a slower
//! tier is promoted to every faster tier by a spawned task so the read path
//! never waits on promotion. Writes after generation cascade synchronously
//! into all tiers with tier-appropriate TTLs. Invalidation removes matching
//! entries from every tier synchronously.

use crate::cache::key::{CacheKey, KeyPattern};
use crate::cache::tier::{CacheEntry, MemoryTier, TierBackend, TierLevel};
use crate::config::CacheSettings;
use crate::telemetry::CacheTelemetry;
use crate::traits::ContentArtifact;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Owns the ordered tier hierarchy
pub struct CacheTierManager {
    /// Fastest first; always the four levels of [`TierLevel::ORDERED`]
    tiers: Vec<Arc<dyn TierBackend>>,
    settings: CacheSettings,
    telemetry: Arc<CacheTelemetry>,
}

impl CacheTierManager {
    /// Build the default in-process hierarchy
    pub fn new(settings: CacheSettings, telemetry: Arc<CacheTelemetry>) -> Self {
        let tiers: Vec<Arc<dyn TierBackend>> = vec![
            Arc::new(MemoryTier::new(TierLevel::Edge, settings.edge_capacity)),
            Arc::new(MemoryTier::new(
                TierLevel::Application,
                settings.application_capacity,
            )),
            Arc::new(MemoryTier::new(TierLevel::Durable, settings.durable_capacity)),
            Arc::new(MemoryTier::new(
                TierLevel::Predictive,
                settings.predictive_capacity,
            )),
        ];
        Self {
            tiers,
            settings,
            telemetry,
        }
    }

    /// Build over injected backends, ordered fastest first. The injection
    /// seam for network-backed application/durable tiers.
    pub fn with_tiers(
        tiers: Vec<Arc<dyn TierBackend>>,
        settings: CacheSettings,
        telemetry: Arc<CacheTelemetry>,
    ) -> Self {
        Self {
            tiers,
            settings,
            telemetry,
        }
    }

    fn ttl_for(&self, level: TierLevel) -> Duration {
        match level {
            TierLevel::Edge => self.settings.edge_ttl(),
            TierLevel::Application => self.settings.application_ttl(),
            TierLevel::Durable => self.settings.durable_ttl(),
            TierLevel::Predictive => self.settings.predictive_ttl(),
        }
    }

    /// Fresh lookup with read-through promotion
    pub async fn get(&self, key: &CacheKey) -> Option<(CacheEntry, TierLevel)> {
        let start = Instant::now();
        for (index, tier) in self.tiers.iter().enumerate() {
            if !tier.is_available() {
                continue;
            }
            if let Some(entry) = tier.get(key).await {
                let level = tier.level();
                self.telemetry.record_hit(level);
                crate::logging::log_tier_outcome(
                    &key.render(),
                    Some(level.name()),
                    start.elapsed().as_micros() as u64,
                );
                if index > 0 {
                    self.spawn_promotion(entry.clone(), index);
                }
                return Some((entry, level));
            }
        }
        self.telemetry.record_miss();
        crate::logging::log_tier_outcome(&key.render(), None, start.elapsed().as_micros() as u64);
        None
    }

    /// Any copy at all, expired included; used for serve-stale fallback when
    /// the generator is slow or failing.
    pub async fn get_stale(&self, key: &CacheKey) -> Option<CacheEntry> {
        for tier in &self.tiers {
            if let Some(entry) = tier.get_any(key).await {
                return Some(entry);
            }
        }
        None
    }

    /// Promotion never blocks the caller's read: copies into every faster
    /// tier on a detached task. A read racing with the promotion may observe
    /// either copy; tier hits are "fresh enough", not "latest possible".
    fn spawn_promotion(&self, entry: CacheEntry, hit_index: usize) {
        let faster: Vec<(Arc<dyn TierBackend>, Duration)> = self.tiers[..hit_index]
            .iter()
            .map(|tier| (Arc::clone(tier), self.ttl_for(tier.level())))
            .collect();
        let rendered = entry.key.render();
        tokio::spawn(async move {
            for (tier, ttl) in faster {
                if !tier.is_available() {
                    continue;
                }
                tier.set(entry.refreshed(ttl)).await;
            }
            debug!(key = %rendered, "Promoted entry into faster tiers");
        });
    }

    /// Cascade write into all tiers with tier-appropriate TTLs; the write
    /// path after a successful generation (origin tier: edge).
    pub async fn set(&self, key: &CacheKey, artifact: ContentArtifact) {
        debug!(
            key = %key.render(),
            size = %crate::utils::format_bytes(artifact.size_bytes()),
            "Caching generated artifact in all tiers"
        );
        for tier in &self.tiers {
            if !tier.is_available() {
                continue;
            }
            let ttl = self.ttl_for(tier.level());
            tier.set(CacheEntry::new(key.clone(), artifact.clone(), ttl))
                .await;
        }
    }

    /// Speculative write from the prefetcher: predictive tier only, TTL
    /// scaled by prediction confidence.
    pub async fn set_speculative(&self, key: &CacheKey, artifact: ContentArtifact, confidence: f64) {
        let base = self.settings.predictive_ttl();
        let ttl = base.mul_f64(confidence.clamp(0.1, 1.0));
        for tier in &self.tiers {
            if tier.level() == TierLevel::Predictive && tier.is_available() {
                tier.set(CacheEntry::new(key.clone(), artifact.clone(), ttl))
                    .await;
            }
        }
    }

    /// Synchronous pattern invalidation across every tier. Returns the total
    /// number of entries removed (a key held in all four tiers counts four).
    pub async fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let mut removed = 0;
        for tier in &self.tiers {
            removed += tier.remove_matching(pattern).await;
        }
        self.telemetry.record_invalidated_entries(removed);
        removed
    }

    /// True while every tier is down; combined with a generator failure this
    /// is the TotalUnavailable condition.
    pub fn all_tiers_unavailable(&self) -> bool {
        self.tiers.iter().all(|tier| !tier.is_available())
    }

    /// Backend handle for a level; used by outage handling and tests
    pub fn tier(&self, level: TierLevel) -> Option<Arc<dyn TierBackend>> {
        self.tiers
            .iter()
            .find(|tier| tier.level() == level)
            .map(Arc::clone)
    }

    pub async fn entry_counts(&self) -> Vec<(TierLevel, usize)> {
        let mut counts = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            counts.push((tier.level(), tier.len().await));
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration as TokioDuration};

    fn manager() -> CacheTierManager {
        CacheTierManager::new(CacheSettings::default(), Arc::new(CacheTelemetry::new()))
    }

    fn key(topic: &str, diff: u8) -> CacheKey {
        CacheKey::new(topic, "eng", diff, None)
    }

    fn artifact(bytes: &[u8]) -> ContentArtifact {
        ContentArtifact::new(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_set_populates_every_tier() {
        let manager = manager();
        manager.set(&key("5", 3), artifact(b"lesson")).await;

        for (_, count) in manager.entry_counts().await {
            assert_eq!(count, 1);
        }

        let (entry, tier) = manager.get(&key("5", 3)).await.unwrap();
        assert_eq!(tier, TierLevel::Edge);
        assert_eq!(entry.payload.as_bytes(), b"lesson");
    }

    #[tokio::test]
    async fn test_hit_on_slower_tier_promotes_upward() {
        let manager = manager();
        manager.set(&key("5", 3), artifact(b"lesson")).await;

        // Knock the entry out of the faster tiers only
        manager
            .tier(TierLevel::Edge)
            .unwrap()
            .remove(&key("5", 3))
            .await;
        manager
            .tier(TierLevel::Application)
            .unwrap()
            .remove(&key("5", 3))
            .await;

        let (_, tier) = manager.get(&key("5", 3)).await.unwrap();
        assert_eq!(tier, TierLevel::Durable);

        // Promotion runs on a detached task; give it a beat
        sleep(TokioDuration::from_millis(50)).await;

        let (_, tier) = manager.get(&key("5", 3)).await.unwrap();
        assert!(tier <= TierLevel::Durable, "second read from a tier no slower than the first");
        assert_eq!(tier, TierLevel::Edge);
    }

    #[tokio::test]
    async fn test_double_get_is_idempotent() {
        let manager = manager();
        manager.set(&key("9", 2), artifact(b"same")).await;

        let (first, first_tier) = manager.get(&key("9", 2)).await.unwrap();
        let (second, second_tier) = manager.get(&key("9", 2)).await.unwrap();
        assert_eq!(first.payload.as_bytes(), second.payload.as_bytes());
        assert!(second_tier <= first_tier);
    }

    #[tokio::test]
    async fn test_invalidate_scopes_to_pattern() {
        let manager = manager();
        manager.set(&key("42", 3), artifact(b"a")).await;
        manager.set(&key("42", 4), artifact(b"b")).await;
        manager.set(&key("7", 3), artifact(b"c")).await;

        let removed = manager.invalidate(&KeyPattern::topic("42")).await;
        // two keys, each present in four tiers
        assert_eq!(removed, 8);

        assert!(manager.get(&key("42", 3)).await.is_none());
        assert!(manager.get(&key("42", 4)).await.is_none());
        assert!(manager.get(&key("7", 3)).await.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_tier_degrades_not_fails() {
        let manager = manager();
        manager.set(&key("5", 3), artifact(b"lesson")).await;

        // Edge and application outage: the durable tier still serves
        manager
            .tier(TierLevel::Edge)
            .unwrap()
            .set_available(false);
        manager
            .tier(TierLevel::Application)
            .unwrap()
            .set_available(false);

        let (_, tier) = manager.get(&key("5", 3)).await.unwrap();
        assert_eq!(tier, TierLevel::Durable);
        assert!(!manager.all_tiers_unavailable());

        manager
            .tier(TierLevel::Durable)
            .unwrap()
            .set_available(false);
        manager
            .tier(TierLevel::Predictive)
            .unwrap()
            .set_available(false);
        assert!(manager.all_tiers_unavailable());
        assert!(manager.get(&key("5", 3)).await.is_none());
    }

    #[tokio::test]
    async fn test_get_stale_returns_expired_copy() {
        let mut settings = CacheSettings::default();
        settings.edge_ttl_secs = 0;
        settings.application_ttl_secs = 0;
        settings.durable_ttl_secs = 0;
        settings.predictive_ttl_secs = 0;
        let manager = CacheTierManager::new(settings, Arc::new(CacheTelemetry::new()));

        manager.set(&key("5", 3), artifact(b"stale")).await;
        assert!(manager.get(&key("5", 3)).await.is_none());
        let stale = manager.get_stale(&key("5", 3)).await.unwrap();
        assert_eq!(stale.payload.as_bytes(), b"stale");
    }

    #[tokio::test]
    async fn test_speculative_set_lands_in_predictive_only() {
        let manager = manager();
        manager
            .set_speculative(&key("8", 5), artifact(b"warm"), 0.8)
            .await;

        let counts = manager.entry_counts().await;
        for (level, count) in counts {
            if level == TierLevel::Predictive {
                assert_eq!(count, 1);
            } else {
                assert_eq!(count, 0);
            }
        }

        let (_, tier) = manager.get(&key("8", 5)).await.unwrap();
        assert_eq!(tier, TierLevel::Predictive);
    }
}
