//! Event-driven cache invalidation
//!
//! Two upstream events reach the cache: content updates (curriculum edits)
//! and learner resets. Both translate into synchronous pattern invalidation
//! across every tier; content updates are additionally timestamped so a
//! generation that started before an update can be flagged as a race.

use crate::cache::key::KeyPattern;
use crate::cache::manager::CacheTierManager;
use crate::flow::difficulty::DifficultyTracker;
use crate::flow::metrics::FlowMetricsAggregator;
use crate::telemetry::CacheTelemetry;
use crate::traits::LearnerProfileProvider;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct CacheInvalidator {
    manager: Arc<CacheTierManager>,
    aggregator: Arc<FlowMetricsAggregator>,
    difficulty: Arc<DifficultyTracker>,
    profiles: Arc<dyn LearnerProfileProvider>,
    telemetry: Arc<CacheTelemetry>,
    /// Last content-update instant per topic, for race detection
    topic_updates: DashMap<String, Instant>,
}

impl CacheInvalidator {
    pub fn new(
        manager: Arc<CacheTierManager>,
        aggregator: Arc<FlowMetricsAggregator>,
        difficulty: Arc<DifficultyTracker>,
        profiles: Arc<dyn LearnerProfileProvider>,
        telemetry: Arc<CacheTelemetry>,
    ) -> Self {
        Self {
            manager,
            aggregator,
            difficulty,
            profiles,
            telemetry,
            topic_updates: DashMap::new(),
        }
    }

    /// Curriculum content changed: every cached variant of the topic, at any
    /// difficulty and career context, is removed from all tiers before this
    /// returns. Returns the number of entries removed across tiers.
    pub async fn on_content_update(&self, topic_id: &str) -> usize {
        self.topic_updates
            .insert(topic_id.to_string(), Instant::now());
        let removed = self.manager.invalidate(&KeyPattern::topic(topic_id)).await;
        info!(
            topic_id = %topic_id,
            removed = removed,
            "Invalidated cached content after topic update"
        );
        removed
    }

    /// Learner state reset: the rolling performance window and difficulty
    /// bucket are dropped unconditionally; cohort-tagged cache entries are
    /// invalidated when the learner's profile names a cohort. A profile
    /// lookup failure degrades to the local reset alone.
    pub async fn on_learner_reset(&self, learner_id: &str) -> usize {
        self.aggregator.reset(learner_id);
        self.difficulty.reset(learner_id);

        let profile = match self.profiles.profile(learner_id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(
                    learner_id = %learner_id,
                    error = %err,
                    "Learner reset without cohort invalidation, profile lookup failed"
                );
                return 0;
            }
        };

        let Some(cohort_id) = profile.cohort_id else {
            return 0;
        };
        let tag = crate::utils::cohort_tag(&cohort_id);
        let removed = self.manager.invalidate(&KeyPattern::cohort(&tag)).await;
        info!(
            learner_id = %learner_id,
            cohort_tag = %tag,
            removed = removed,
            "Invalidated cohort-tagged entries after learner reset"
        );
        removed
    }

    /// Whether the topic was invalidated after `since`. A generation that
    /// started before an overlapping content update produced an artifact from
    /// pre-update inputs; the caller records this as a race.
    pub fn invalidated_since(&self, topic_id: &str, since: Instant) -> bool {
        self.topic_updates
            .get(topic_id)
            .map(|updated| *updated > since)
            .unwrap_or(false)
    }

    /// Record and log a generation/invalidation race. The artifact is still
    /// served and cached; the next content update will sweep it again.
    pub fn record_race(&self, topic_id: &str) {
        self.telemetry.record_invalidation_race();
        warn!(
            topic_id = %topic_id,
            "Generation overlapped a content update for the same topic"
        );
    }
}
