//! Telemetry surface for the cache subsystem
//!
//! Lock-free counters for tier hits/misses, generation latency, prefetch
//! contribution, and the flow-percentage distribution. `snapshot()` exports
//! a serializable view for dashboards and metrics scrapers.

use crate::cache::tier::TierLevel;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared telemetry counters
#[derive(Debug, Default)]
pub struct CacheTelemetry {
    tier_hits: [AtomicU64; 4],
    misses: AtomicU64,
    generation_count: AtomicU64,
    generation_latency_ms_total: AtomicU64,
    generation_timeouts: AtomicU64,
    generation_failures: AtomicU64,
    prefetch_issued: AtomicU64,
    prefetch_generated: AtomicU64,
    prefetch_contributions: AtomicU64,
    invalidation_races: AtomicU64,
    invalidated_entries: AtomicU64,
    /// Flow percentage deciles, 0-9 → [0,10), [10,20), .. [90,100]
    flow_deciles: [AtomicU64; 10],
}

impl CacheTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_index(level: TierLevel) -> usize {
        match level {
            TierLevel::Edge => 0,
            TierLevel::Application => 1,
            TierLevel::Durable => 2,
            TierLevel::Predictive => 3,
        }
    }

    pub fn record_hit(&self, level: TierLevel) {
        self.tier_hits[Self::tier_index(level)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation(&self, latency_ms: u64) {
        self.generation_count.fetch_add(1, Ordering::Relaxed);
        self.generation_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_generation_timeout(&self) {
        self.generation_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch_issued(&self) {
        self.prefetch_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch_generated(&self) {
        self.prefetch_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// A foreground hit landing on the predictive tier: content a prefetch
    /// materialized before it was asked for.
    pub fn record_prefetch_contribution(&self) {
        self.prefetch_contributions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation_race(&self) {
        self.invalidation_races.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidated_entries(&self, count: usize) {
        self.invalidated_entries
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_flow_percentage(&self, percentage: f64) {
        let decile = ((percentage / 10.0).floor() as usize).min(9);
        self.flow_deciles[decile].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let tier_hits: HashMap<String, u64> = TierLevel::ORDERED
            .iter()
            .map(|level| {
                (
                    level.name().to_string(),
                    self.tier_hits[Self::tier_index(*level)].load(Ordering::Relaxed),
                )
            })
            .collect();

        let total_hits: u64 = tier_hits.values().sum();
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = total_hits + misses;

        let generation_count = self.generation_count.load(Ordering::Relaxed);
        let avg_generation_ms = if generation_count > 0 {
            self.generation_latency_ms_total.load(Ordering::Relaxed) as f64
                / generation_count as f64
        } else {
            0.0
        };

        let prefetch_contributions = self.prefetch_contributions.load(Ordering::Relaxed);
        let prefetch_hit_contribution_rate = if total_hits > 0 {
            prefetch_contributions as f64 / total_hits as f64
        } else {
            0.0
        };

        TelemetrySnapshot {
            tier_hits,
            misses,
            overall_hit_rate: if lookups > 0 {
                total_hits as f64 / lookups as f64
            } else {
                0.0
            },
            generation_count,
            avg_generation_ms,
            generation_timeouts: self.generation_timeouts.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            prefetch_issued: self.prefetch_issued.load(Ordering::Relaxed),
            prefetch_generated: self.prefetch_generated.load(Ordering::Relaxed),
            prefetch_contributions,
            prefetch_hit_contribution_rate,
            invalidation_races: self.invalidation_races.load(Ordering::Relaxed),
            invalidated_entries: self.invalidated_entries.load(Ordering::Relaxed),
            flow_percentage_deciles: self
                .flow_deciles
                .iter()
                .map(|d| d.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// Point-in-time export of the telemetry counters
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub tier_hits: HashMap<String, u64>,
    pub misses: u64,
    pub overall_hit_rate: f64,
    pub generation_count: u64,
    pub avg_generation_ms: f64,
    pub generation_timeouts: u64,
    pub generation_failures: u64,
    pub prefetch_issued: u64,
    pub prefetch_generated: u64,
    pub prefetch_contributions: u64,
    pub prefetch_hit_contribution_rate: f64,
    pub invalidation_races: u64,
    pub invalidated_entries: u64,
    pub flow_percentage_deciles: Vec<u64>,
}
