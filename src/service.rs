//! Service facade tying the cache, flow engine, and prefetcher together
//!
//! The request pipeline for one content read:
//!
//! 1. resolve the learner's profile and current difficulty bucket
//! 2. derive the composite cache key
//! 3. scan the tier hierarchy; a hit returns immediately
//! 4. on miss, generate through the single-flight coordinator under the
//!    foreground deadline
//! 5. on deadline or failure, fall back to a stale copy if any tier holds one
//!
//! A caller leaves empty-handed only when every tier is down and the
//! generator failed too.

use crate::cache::invalidator::CacheInvalidator;
use crate::cache::key::CacheKey;
use crate::cache::manager::CacheTierManager;
use crate::cache::single_flight::SingleFlightCoordinator;
use crate::cache::tier::TierLevel;
use crate::config::PathIqConfig;
use crate::errors::{GenerationError, PathIqError, PathIqResult};
use crate::flow::difficulty::DifficultyTracker;
use crate::flow::evaluator::{DifficultyAdjustment, FlowState, FlowStateEvaluator};
use crate::flow::metrics::{FlowMetricsAggregator, InteractionEvent};
use crate::logging::PerformanceLogger;
use crate::prefetch::PredictivePrefetcher;
use crate::telemetry::{CacheTelemetry, TelemetrySnapshot};
use crate::traits::{ContentArtifact, ContentGenerator, LearnerProfile, LearnerProfileProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct PathIqService {
    config: PathIqConfig,
    manager: Arc<CacheTierManager>,
    flights: Arc<SingleFlightCoordinator>,
    generator: Arc<dyn ContentGenerator>,
    profiles: Arc<dyn LearnerProfileProvider>,
    aggregator: Arc<FlowMetricsAggregator>,
    evaluator: FlowStateEvaluator,
    buckets: Arc<DifficultyTracker>,
    prefetcher: Arc<PredictivePrefetcher>,
    invalidator: Arc<CacheInvalidator>,
    telemetry: Arc<CacheTelemetry>,
}

impl PathIqService {
    pub fn new(
        config: PathIqConfig,
        generator: Arc<dyn ContentGenerator>,
        profiles: Arc<dyn LearnerProfileProvider>,
    ) -> Self {
        let telemetry = Arc::new(CacheTelemetry::new());
        let manager = Arc::new(CacheTierManager::new(
            config.cache.clone(),
            Arc::clone(&telemetry),
        ));
        let flights = Arc::new(SingleFlightCoordinator::new());
        let aggregator = Arc::new(FlowMetricsAggregator::new(config.flow.clone()));
        let buckets = Arc::new(DifficultyTracker::new());
        let prefetcher = Arc::new(PredictivePrefetcher::new(
            Arc::clone(&manager),
            Arc::clone(&flights),
            Arc::clone(&generator),
            Arc::clone(&profiles),
            Arc::clone(&aggregator),
            Arc::clone(&buckets),
            config.prefetch.clone(),
            config.flow.clone(),
            Arc::clone(&telemetry),
        ));
        let invalidator = Arc::new(CacheInvalidator::new(
            Arc::clone(&manager),
            Arc::clone(&aggregator),
            Arc::clone(&buckets),
            Arc::clone(&profiles),
            Arc::clone(&telemetry),
        ));
        let evaluator = FlowStateEvaluator::new(config.flow.clone());
        Self {
            config,
            manager,
            flights,
            generator,
            profiles,
            aggregator,
            evaluator,
            buckets,
            prefetcher,
            invalidator,
            telemetry,
        }
    }

    /// Derive the cache key for a learner/topic pair from the learner's
    /// profile and current difficulty bucket. The raw learner id never
    /// reaches the key. A profile lookup failure degrades to the default
    /// context; it never blocks content delivery.
    async fn key_for(&self, learner_id: &str, topic_id: &str) -> CacheKey {
        let profile = match self.profiles.profile(learner_id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(
                    learner_id = %learner_id,
                    error = %err,
                    "Profile lookup failed, serving default-context content"
                );
                LearnerProfile::default_context(learner_id)
            }
        };
        let cohort_tag = profile.cohort_id.as_deref().map(crate::utils::cohort_tag);
        CacheKey::new(
            topic_id,
            &profile.career_context_id,
            self.buckets.current(learner_id),
            cohort_tag,
        )
    }

    /// Fetch content for a learner, generating on miss
    pub async fn get_content(
        &self,
        learner_id: &str,
        topic_id: &str,
    ) -> PathIqResult<ContentArtifact> {
        let span = crate::logging::content_request_span(learner_id, topic_id);
        let key = self.key_for(learner_id, topic_id).await;
        span.record("difficulty_bucket", u64::from(key.difficulty_bucket));

        if let Some((entry, tier)) = self.manager.get(&key).await {
            if tier == TierLevel::Predictive {
                self.telemetry.record_prefetch_contribution();
            }
            span.record("cache_tier", tier.name());
            return Ok(entry.payload);
        }

        self.generate_and_cache(&key, &span).await
    }

    /// Miss path: single-flight generation under the foreground deadline,
    /// with bounded retries on failure and a stale fallback afterwards.
    async fn generate_and_cache(
        &self,
        key: &CacheKey,
        span: &tracing::Span,
    ) -> PathIqResult<ContentArtifact> {
        let deadline = self.config.generation.deadline();
        let started_at = Instant::now();
        let perf = PerformanceLogger::start("content_generation");
        let mut last_error = GenerationError::FlightInterrupted {
            reason: "no generation attempted".to_string(),
        };

        for attempt in 0..=self.config.generation.max_retries {
            let generation = self.generation_closure(key);
            match tokio::time::timeout(deadline, self.flights.execute(key, generation)).await {
                Ok(Ok(artifact)) => {
                    let elapsed_ms = perf.finish();
                    self.telemetry.record_generation(elapsed_ms);
                    span.record("generation_ms", elapsed_ms);
                    if self.invalidator.invalidated_since(&key.topic_id, started_at) {
                        self.invalidator.record_race(&key.topic_id);
                    }
                    self.manager.set(key, artifact.clone()).await;
                    return Ok(artifact);
                }
                Ok(Err(err)) => {
                    self.telemetry.record_generation_failure();
                    warn!(
                        key = %key,
                        attempt = attempt,
                        elapsed_ms = perf.elapsed_ms(),
                        error = %err,
                        "Content generation failed"
                    );
                    last_error = err;
                }
                Err(_) => {
                    self.telemetry.record_generation_timeout();
                    last_error = GenerationError::Timeout {
                        topic_id: key.topic_id.clone(),
                        difficulty: key.difficulty_bucket,
                        deadline_ms: self.config.generation.deadline_ms,
                    };
                    // The in-flight leader keeps running; make sure its late
                    // result still lands in the cache.
                    self.spawn_background_fill(key);
                    break;
                }
            }
        }

        if let Some(stale) = self.manager.get_stale(key).await {
            info!(key = %key, "Serving stale entry while generation is unavailable");
            span.record("cache_tier", "stale");
            return Ok(stale.payload);
        }

        if self.manager.all_tiers_unavailable() {
            return Err(PathIqError::TotalUnavailable);
        }
        Err(PathIqError::Generation(last_error))
    }

    fn generation_closure(
        &self,
        key: &CacheKey,
    ) -> impl FnOnce() -> std::pin::Pin<
        Box<dyn std::future::Future<Output = crate::errors::GenerationResult<ContentArtifact>> + Send>,
    > {
        let generator = Arc::clone(&self.generator);
        let key = key.clone();
        move || {
            Box::pin(async move {
                generator
                    .generate(&key.topic_id, &key.career_context_id, key.difficulty_bucket)
                    .await
            })
        }
    }

    /// Re-join the in-flight generation on a detached task and cache its
    /// outcome, so a foreground deadline does not waste the work.
    fn spawn_background_fill(&self, key: &CacheKey) {
        let flights = Arc::clone(&self.flights);
        let manager = Arc::clone(&self.manager);
        let telemetry = Arc::clone(&self.telemetry);
        let generation = self.generation_closure(key);
        let key = key.clone();
        tokio::spawn(async move {
            match flights.execute(&key, generation).await {
                Ok(artifact) => {
                    manager.set(&key, artifact).await;
                    info!(key = %key, "Late generation result cached");
                }
                Err(_) => telemetry.record_generation_failure(),
            }
        });
    }

    /// Ingest one interaction event: update the rolling window, evaluate the
    /// flow state, move the difficulty bucket, and optionally trigger a warm
    /// cycle in the background.
    pub async fn report_interaction(
        &self,
        event: InteractionEvent,
    ) -> (FlowState, DifficultyAdjustment) {
        let learner_id = event.learner_id.clone();
        self.aggregator.record(&event);
        let history = self.aggregator.history(&learner_id);

        let span = crate::logging::flow_evaluation_span(&learner_id, history.len());
        let (state, adjustment) = self.evaluator.evaluate(&learner_id, &history);
        span.record("flow_percentage", state.percentage);
        span.record("adjustment", format!("{:?}", adjustment.action).as_str());

        self.telemetry.record_flow_percentage(state.percentage);
        crate::logging::log_difficulty_adjustment(
            &learner_id,
            &format!("{:?}", adjustment.action),
            adjustment.magnitude,
            &format!("{:?}", adjustment.reason),
            state.percentage,
        );
        self.buckets.apply(&learner_id, &adjustment);

        if self.config.prefetch.warm_on_interaction {
            let prefetcher = Arc::clone(&self.prefetcher);
            tokio::spawn(async move {
                prefetcher.warm(&learner_id).await;
            });
        }

        (state, adjustment)
    }

    /// Current flow state for a learner, neutral when no history exists
    pub fn get_flow_state(&self, learner_id: &str) -> FlowState {
        let history = self.aggregator.history(learner_id);
        self.evaluator.evaluate(learner_id, &history).0
    }

    /// Trigger one prefetch warm cycle for a learner
    pub async fn warm(&self, learner_id: &str) -> usize {
        self.prefetcher.warm(learner_id).await
    }

    /// Curriculum content changed for a topic
    pub async fn invalidate_topic(&self, topic_id: &str) -> usize {
        self.invalidator.on_content_update(topic_id).await
    }

    /// Reset a learner's flow window, difficulty, and cohort entries
    pub async fn reset_learner(&self, learner_id: &str) -> usize {
        self.invalidator.on_learner_reset(learner_id).await
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn cache_manager(&self) -> &Arc<CacheTierManager> {
        &self.manager
    }

    /// Wait for outstanding background warms; shutdown path
    pub async fn shutdown(&self) {
        self.prefetcher.drain().await;
        info!("PathIQ service drained");
    }
}
