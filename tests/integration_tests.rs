//! End-to-end tests for the PathIQ cache service
//!
//! Exercises the full request pipeline against mock collaborators: tier
//! population and promotion, single-flight deduplication, invalidation,
//! stale fallback, prefetch contribution, and degraded operation.

use async_trait::async_trait;
use pathiq_cache::errors::{GenerationError, GenerationResult, ProfileError, ProfileResult};
use pathiq_cache::traits::{
    ContentArtifact, ContentGenerator, LearnerProfile, LearnerProfileProvider,
};
use pathiq_cache::{
    CacheKey, FlowCategory, InteractionEvent, PathIqConfig, PathIqService, TierBackend, TierLevel,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct MockGenerator {
    calls: AtomicUsize,
    delay: Duration,
}

impl MockGenerator {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(
        &self,
        topic_id: &str,
        career_context_id: &str,
        difficulty_bucket: u8,
    ) -> GenerationResult<ContentArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if topic_id == "broken" {
            return Err(GenerationError::Failed {
                topic_id: topic_id.to_string(),
                reason: "upstream 503".to_string(),
            });
        }
        Ok(ContentArtifact::new(
            format!("{topic_id}/{career_context_id}/{difficulty_bucket}").into_bytes(),
        ))
    }
}

struct MapProfiles {
    profiles: HashMap<String, LearnerProfile>,
}

impl MapProfiles {
    fn new(profiles: Vec<LearnerProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.learner_id.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl LearnerProfileProvider for MapProfiles {
    async fn profile(&self, learner_id: &str) -> ProfileResult<LearnerProfile> {
        self.profiles
            .get(learner_id)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownLearner {
                learner_id: learner_id.to_string(),
            })
    }
}

fn quiet_config() -> PathIqConfig {
    let mut config = PathIqConfig::default();
    // Deterministic generator call counts: no warms behind our back
    config.prefetch.warm_on_interaction = false;
    config
}

fn service_with(
    config: PathIqConfig,
    generator: Arc<MockGenerator>,
    profiles: Vec<LearnerProfile>,
) -> PathIqService {
    PathIqService::new(
        config,
        generator as Arc<dyn ContentGenerator>,
        Arc::new(MapProfiles::new(profiles)),
    )
}

fn learner(id: &str) -> LearnerProfile {
    LearnerProfile::new(id, "eng")
}

#[tokio::test]
async fn test_cold_miss_populates_every_tier_then_hits_edge() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![learner("l1")]);

    let first = service.get_content("l1", "42").await.unwrap();
    assert_eq!(first.as_bytes(), b"42/eng/5");
    assert_eq!(generator.call_count(), 1);

    let counts = service.cache_manager().entry_counts().await;
    for (_, count) in counts {
        assert_eq!(count, 1);
    }

    let second = service.get_content("l1", "42").await.unwrap();
    assert_eq!(second.as_bytes(), b"42/eng/5");
    assert_eq!(generator.call_count(), 1);

    let snap = service.telemetry_snapshot();
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.tier_hits["edge"], 1);
    assert!(snap.overall_hit_rate > 0.0);
}

#[tokio::test]
async fn test_concurrent_cold_misses_generate_exactly_once() {
    let generator = Arc::new(MockGenerator::new(Duration::from_millis(40)));
    let service = Arc::new(service_with(
        quiet_config(),
        Arc::clone(&generator),
        vec![learner("l1"), learner("l2"), learner("l3")],
    ));

    // Different learners, same career and default bucket: identical key
    let mut handles = Vec::new();
    for learner_id in ["l1", "l2", "l3", "l1", "l2", "l3"] {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.get_content(learner_id, "42").await
        }));
    }

    for handle in handles {
        let artifact = handle.await.unwrap().unwrap();
        assert_eq!(artifact.as_bytes(), b"42/eng/5");
    }
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_topic_invalidation_forces_regeneration() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![learner("l1")]);

    service.get_content("l1", "42").await.unwrap();
    service.get_content("l1", "7").await.unwrap();
    assert_eq!(generator.call_count(), 2);

    let removed = service.invalidate_topic("42").await;
    // one key held in four tiers
    assert_eq!(removed, 4);

    service.get_content("l1", "42").await.unwrap();
    assert_eq!(generator.call_count(), 3);

    // The untouched topic still hits
    service.get_content("l1", "7").await.unwrap();
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test]
async fn test_slow_generator_falls_back_to_stale() {
    let generator = Arc::new(MockGenerator::new(Duration::from_millis(200)));
    let mut config = quiet_config();
    config.generation.deadline_ms = 20;
    config.cache.edge_ttl_secs = 0;
    config.cache.application_ttl_secs = 0;
    config.cache.durable_ttl_secs = 0;
    config.cache.predictive_ttl_secs = 0;
    let service = service_with(config, Arc::clone(&generator), vec![learner("l1")]);

    // Plant a copy that is stale the moment it lands
    let key = CacheKey::new("42", "eng", 5, None);
    service
        .cache_manager()
        .set(&key, ContentArtifact::new(b"previous".to_vec()))
        .await;

    let artifact = service.get_content("l1", "42").await.unwrap();
    assert_eq!(artifact.as_bytes(), b"previous");
    assert_eq!(service.telemetry_snapshot().generation_timeouts, 1);
}

#[tokio::test]
async fn test_prefetch_warm_turns_into_predictive_hits() {
    let generator = Arc::new(MockGenerator::new(Duration::from_millis(5)));
    let profile = learner("l1").with_upcoming(vec!["a".to_string(), "b".to_string()]);
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![profile]);

    let issued = service.warm("l1").await;
    assert_eq!(issued, 2);
    service.shutdown().await;
    assert_eq!(generator.call_count(), 2);

    // The foreground request finds the warmed entry instead of generating
    let artifact = service.get_content("l1", "a").await.unwrap();
    assert_eq!(artifact.as_bytes(), b"a/eng/5");
    assert_eq!(generator.call_count(), 2);

    let snap = service.telemetry_snapshot();
    assert_eq!(snap.tier_hits["predictive"], 1);
    assert_eq!(snap.prefetch_contributions, 1);
    assert!(snap.prefetch_hit_contribution_rate > 0.0);
}

#[tokio::test]
async fn test_tier_outages_degrade_gracefully() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![learner("l1")]);

    let manager = service.cache_manager();
    manager
        .tier(TierLevel::Edge)
        .unwrap()
        .set_available(false);
    manager
        .tier(TierLevel::Application)
        .unwrap()
        .set_available(false);

    // Generation succeeds and lands in the tiers that remain
    service.get_content("l1", "42").await.unwrap();
    let (_, tier) = manager
        .get(&CacheKey::new("42", "eng", 5, None))
        .await
        .unwrap();
    assert_eq!(tier, TierLevel::Durable);

    // A recovered tier is refilled by promotion on the next hit
    manager.tier(TierLevel::Edge).unwrap().set_available(true);
    service.get_content("l1", "42").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let (_, tier) = manager
        .get(&CacheKey::new("42", "eng", 5, None))
        .await
        .unwrap();
    assert_eq!(tier, TierLevel::Edge);
}

#[tokio::test]
async fn test_generation_failure_without_stale_is_an_error() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![learner("l1")]);

    let result = service.get_content("l1", "broken").await;
    assert!(result.is_err());
    assert!(service.telemetry_snapshot().generation_failures > 0);
}

#[tokio::test]
async fn test_cohort_learners_share_entries_until_reset() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(
        quiet_config(),
        Arc::clone(&generator),
        vec![
            learner("l1").with_cohort("cohort-a"),
            learner("l2").with_cohort("cohort-a"),
        ],
    );

    service.get_content("l1", "42").await.unwrap();
    service.get_content("l2", "42").await.unwrap();
    // Same cohort, same bucket: the second learner rides the first's entry
    assert_eq!(generator.call_count(), 1);

    let removed = service.reset_learner("l1").await;
    assert!(removed >= 4);

    service.get_content("l2", "42").await.unwrap();
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_interactions_move_difficulty_and_key() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![learner("l1")]);

    // Struggling learner: wrong answers on hard content with hints
    let mut category = FlowCategory::Neutral;
    for _ in 0..6 {
        let (state, _) = service
            .report_interaction(InteractionEvent::now("l1", false, 40_000, true, 9))
            .await;
        category = state.category;
    }
    assert_eq!(category, FlowCategory::Anxiety);

    // The next request generates at a reduced bucket
    let artifact = service.get_content("l1", "42").await.unwrap();
    let rendered = String::from_utf8(artifact.as_bytes().to_vec()).unwrap();
    let bucket: u8 = rendered.rsplit('/').next().unwrap().parse().unwrap();
    assert!(bucket < 5, "expected a reduced bucket, got {bucket}");

    // Flow percentages reached the telemetry histogram
    let snap = service.telemetry_snapshot();
    assert_eq!(snap.flow_percentage_deciles.iter().sum::<u64>(), 6);
}

struct FailingProfiles;

#[async_trait]
impl LearnerProfileProvider for FailingProfiles {
    async fn profile(&self, learner_id: &str) -> ProfileResult<LearnerProfile> {
        Err(ProfileError::LookupFailed {
            learner_id: learner_id.to_string(),
            reason: "profile service down".to_string(),
        })
    }
}

#[tokio::test]
async fn test_profile_outage_degrades_to_default_context() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = PathIqService::new(
        quiet_config(),
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
        Arc::new(FailingProfiles),
    );

    // Healthy tiers and generator: the profile outage must not block content
    let artifact = service.get_content("l1", "42").await.unwrap();
    assert_eq!(artifact.as_bytes(), b"42/general/5");
    assert_eq!(generator.call_count(), 1);

    // The default-context key caches normally
    let again = service.get_content("l1", "42").await.unwrap();
    assert_eq!(again.as_bytes(), b"42/general/5");
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_unknown_learner_still_receives_content() {
    let generator = Arc::new(MockGenerator::new(Duration::ZERO));
    let service = service_with(quiet_config(), Arc::clone(&generator), vec![]);

    let artifact = service.get_content("stranger", "42").await.unwrap();
    assert_eq!(artifact.as_bytes(), b"42/general/5");
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_content_update_during_generation_counts_as_race() {
    let generator = Arc::new(MockGenerator::new(Duration::from_millis(60)));
    let service = Arc::new(service_with(
        quiet_config(),
        Arc::clone(&generator),
        vec![learner("l1")],
    ));

    let request = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.get_content("l1", "42").await })
    };

    // The topic is updated while its generation is still in flight
    sleep(Duration::from_millis(15)).await;
    service.invalidate_topic("42").await;

    let artifact = request.await.unwrap().unwrap();
    assert_eq!(artifact.as_bytes(), b"42/eng/5");

    let snap = service.telemetry_snapshot();
    assert_eq!(snap.invalidation_races, 1);

    // The pre-update artifact was still cached once; the next update sweeps it
    assert_eq!(service.invalidate_topic("42").await, 4);
}
