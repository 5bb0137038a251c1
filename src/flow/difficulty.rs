//! Per-learner difficulty bucket tracking
//!
//! Applies difficulty adjustments from the evaluator to the 1..=10 bucket
//! that parameterizes cache keys. Learners start mid-scale.

use crate::flow::evaluator::DifficultyAdjustment;
use dashmap::DashMap;
use tracing::debug;

pub const DEFAULT_BUCKET: u8 = 5;

/// Current difficulty bucket per learner
pub struct DifficultyTracker {
    buckets: DashMap<String, u8>,
}

impl DifficultyTracker {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Bucket currently assigned to a learner
    pub fn current(&self, learner_id: &str) -> u8 {
        self.buckets
            .get(learner_id)
            .map(|bucket| *bucket)
            .unwrap_or(DEFAULT_BUCKET)
    }

    /// Apply an adjustment and return the resulting bucket
    pub fn apply(&self, learner_id: &str, adjustment: &DifficultyAdjustment) -> u8 {
        let delta = adjustment.bucket_delta();
        let mut entry = self
            .buckets
            .entry(learner_id.to_string())
            .or_insert(DEFAULT_BUCKET);
        let updated = (i16::from(*entry) + i16::from(delta)).clamp(1, 10) as u8;
        if updated != *entry {
            debug!(
                learner_id = %learner_id,
                from = *entry,
                to = updated,
                "Difficulty bucket moved"
            );
        }
        *entry = updated;
        updated
    }

    /// Forget a learner's bucket (learner reset)
    pub fn reset(&self, learner_id: &str) {
        self.buckets.remove(learner_id);
    }
}

impl Default for DifficultyTracker {
    fn default() -> Self {
        Self::new()
    }
}
