//! Predictive prefetch warming
//!
//! Ranks a learner's likely-next topics, scores them by probability against
//! generation cost, and warms the winners into the predictive tier in the
//! background. Warming competes with foreground traffic for the upstream
//! generator, so total prefetch concurrency is capped by a semaphore and a
//! prefetch failure is never more than a debug log.

use crate::cache::key::CacheKey;
use crate::cache::manager::CacheTierManager;
use crate::cache::single_flight::SingleFlightCoordinator;
use crate::config::{FlowSettings, PrefetchSettings};
use crate::flow::difficulty::DifficultyTracker;
use crate::flow::evaluator::{AdjustmentAction, FlowStateEvaluator};
use crate::flow::metrics::FlowMetricsAggregator;
use crate::prefetch_debug;
use crate::telemetry::CacheTelemetry;
use crate::traits::{ContentGenerator, LearnerProfile, LearnerProfileProvider};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Base probability assigned to the most likely upcoming topic; each later
/// position decays by the same factor.
const PROBABILITY_DECAY: f64 = 0.7;

/// One scored warming candidate
#[derive(Debug, Clone)]
pub struct PrefetchCandidate {
    pub key: CacheKey,
    /// Estimated probability the learner requests this key soon, 0..=1
    pub probability: f64,
    /// Estimated generation cost in abstract units
    pub estimated_cost: f64,
}

impl PrefetchCandidate {
    /// Probability-per-cost score candidates are filtered and ranked by
    pub fn score(&self) -> f64 {
        self.probability / self.estimated_cost.max(f64::EPSILON)
    }
}

/// Background warmer for the predictive tier
pub struct PredictivePrefetcher {
    manager: Arc<CacheTierManager>,
    flights: Arc<SingleFlightCoordinator>,
    generator: Arc<dyn ContentGenerator>,
    profiles: Arc<dyn LearnerProfileProvider>,
    aggregator: Arc<FlowMetricsAggregator>,
    evaluator: FlowStateEvaluator,
    buckets: Arc<DifficultyTracker>,
    permits: Arc<Semaphore>,
    settings: PrefetchSettings,
    telemetry: Arc<CacheTelemetry>,
    tasks: Mutex<JoinSet<()>>,
}

impl PredictivePrefetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<CacheTierManager>,
        flights: Arc<SingleFlightCoordinator>,
        generator: Arc<dyn ContentGenerator>,
        profiles: Arc<dyn LearnerProfileProvider>,
        aggregator: Arc<FlowMetricsAggregator>,
        buckets: Arc<DifficultyTracker>,
        settings: PrefetchSettings,
        flow_settings: FlowSettings,
        telemetry: Arc<CacheTelemetry>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_warms.max(1)));
        Self {
            manager,
            flights,
            generator,
            profiles,
            aggregator,
            evaluator: FlowStateEvaluator::new(flow_settings),
            buckets,
            permits,
            settings,
            telemetry,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Score the learner's upcoming topics into warming candidates.
    ///
    /// Position in `upcoming_topics` drives a geometric probability decay.
    /// When the flow engine is about to move the learner's difficulty, the
    /// most likely topic is additionally warmed at the adjacent bucket, at
    /// half its probability.
    fn rank_candidates(&self, profile: &LearnerProfile, bucket: u8) -> Vec<PrefetchCandidate> {
        let cohort_tag = profile
            .cohort_id
            .as_deref()
            .map(crate::utils::cohort_tag);
        let cost = self.settings.generation_cost_units.max(f64::EPSILON);

        let history = self.aggregator.history(&profile.learner_id);
        let (_, adjustment) = self.evaluator.evaluate(&profile.learner_id, &history);

        let mut candidates = Vec::new();
        for (position, topic_id) in profile.upcoming_topics.iter().enumerate() {
            let probability = PROBABILITY_DECAY.powi(position as i32 + 1);
            candidates.push(PrefetchCandidate {
                key: CacheKey::new(
                    topic_id,
                    &profile.career_context_id,
                    bucket,
                    cohort_tag.clone(),
                ),
                probability,
                estimated_cost: cost,
            });

            if position == 0 && adjustment.action != AdjustmentAction::Maintain {
                let shifted = (i16::from(bucket) + i16::from(adjustment.bucket_delta()))
                    .clamp(1, 10) as u8;
                if shifted != bucket {
                    candidates.push(PrefetchCandidate {
                        key: CacheKey::new(
                            topic_id,
                            &profile.career_context_id,
                            shifted,
                            cohort_tag.clone(),
                        ),
                        probability: probability * 0.5,
                        estimated_cost: cost,
                    });
                }
            }
        }

        candidates.retain(|c| c.score() >= self.settings.score_threshold);
        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
        candidates.truncate(self.settings.max_candidates);
        candidates
    }

    /// Run one warm cycle for a learner, returning how many warming tasks
    /// were issued. Already-fresh keys are skipped; each issued task waits
    /// for a concurrency permit before generating.
    pub async fn warm(&self, learner_id: &str) -> usize {
        if !self.settings.enabled {
            return 0;
        }

        let profile = match self.profiles.profile(learner_id).await {
            Ok(profile) => profile,
            Err(err) => {
                prefetch_debug!(learner_id = %learner_id, error = %err, "Skipping warm cycle, no profile");
                return 0;
            }
        };

        let bucket = self.buckets.current(learner_id);
        let candidates = self.rank_candidates(&profile, bucket);
        let span = crate::logging::prefetch_span(learner_id, candidates.len());

        let mut issued: u64 = 0;
        let mut tasks = self.tasks.lock().await;
        // Reap tasks from earlier cycles
        while tasks.try_join_next().is_some() {}

        for candidate in candidates {
            if let Some(existing) = self.manager.get_stale(&candidate.key).await {
                if existing.is_fresh() {
                    continue;
                }
            }

            self.telemetry.record_prefetch_issued();
            issued += 1;

            let permits = Arc::clone(&self.permits);
            let flights = Arc::clone(&self.flights);
            let generator = Arc::clone(&self.generator);
            let manager = Arc::clone(&self.manager);
            let telemetry = Arc::clone(&self.telemetry);
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    // Semaphore closed during shutdown
                    Err(_) => return,
                };
                let key = candidate.key.clone();
                let generation = {
                    let key = key.clone();
                    move || async move {
                        generator
                            .generate(&key.topic_id, &key.career_context_id, key.difficulty_bucket)
                            .await
                    }
                };
                match flights.execute(&key, generation).await {
                    Ok(artifact) => {
                        manager
                            .set_speculative(&key, artifact, candidate.probability)
                            .await;
                        telemetry.record_prefetch_generated();
                        prefetch_debug!(key = %key, "Warmed predictive tier");
                    }
                    Err(err) => {
                        prefetch_debug!(key = %key, error = %err, "Prefetch generation dropped");
                    }
                }
            });
        }

        span.record("issued", issued);
        issued as usize
    }

    /// Wait for every outstanding warming task; shutdown path and tests
    pub async fn drain(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}
