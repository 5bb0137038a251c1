//! # PathIQ Cache
//!
//! A predictive multi-tier content cache with a learner flow-state engine.
//! Generated learning content is expensive to produce, so the subsystem keeps
//! it close to the reader and tries to have it ready before it is asked for:
//!
//! - **Four-tier hierarchy**: edge, application, durable, and predictive
//!   tiers with read-through promotion and cascade writes
//! - **Single-flight generation**: concurrent misses on one key share a
//!   single upstream generation call
//! - **Predictive prefetch**: likely-next content is generated in the
//!   background under a bounded concurrency budget
//! - **Flow-state engine**: rolling performance windows drive the difficulty
//!   bucket that parameterizes cache keys
//!
//! ## Architecture
//!
//! The system consists of several key components:
//!
//! - **Cache tier manager**: ordered tier scan, promotion, invalidation
//! - **Single-flight coordinator**: deduplicates in-flight generations
//! - **Flow engine**: metrics aggregation, flow evaluation, difficulty tracking
//! - **Predictive prefetcher**: ranks upcoming topics and warms them
//! - **Service facade**: the request pipeline tying the above together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pathiq_cache::{logging, PathIqConfig, PathIqService};
//! # use pathiq_cache::traits::{ContentArtifact, ContentGenerator, LearnerProfile, LearnerProfileProvider};
//! # use pathiq_cache::errors::{GenerationResult, ProfileResult};
//! # use std::sync::Arc;
//! # struct Generator;
//! # #[async_trait::async_trait]
//! # impl ContentGenerator for Generator {
//! #     async fn generate(&self, _: &str, _: &str, _: u8) -> GenerationResult<ContentArtifact> {
//! #         Ok(ContentArtifact::new(vec![]))
//! #     }
//! # }
//! # struct Profiles;
//! # #[async_trait::async_trait]
//! # impl LearnerProfileProvider for Profiles {
//! #     async fn profile(&self, id: &str) -> ProfileResult<LearnerProfile> {
//! #         Ok(LearnerProfile::new(id, "career"))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     logging::init_logging()?;
//!
//!     let config = PathIqConfig::default();
//!     let service = PathIqService::new(config, Arc::new(Generator), Arc::new(Profiles));
//!     let content = service.get_content("learner-1", "topic-42").await?;
//!     println!("{} bytes", content.size_bytes());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod flow;
pub mod logging;
pub mod prefetch;
pub mod service;
pub mod telemetry;

// Re-export commonly used types and functions
pub use cache::{
    CacheEntry, CacheInvalidator, CacheKey, CacheTierManager, KeyPattern, MemoryTier,
    SingleFlightCoordinator, TierBackend, TierLevel,
};
pub use config::{ConfigBuilder, PathIqConfig};
pub use errors::{PathIqError, PathIqResult};
pub use flow::{
    AdjustmentAction, AdjustmentReason, DifficultyAdjustment, DifficultyTracker, FlowCategory,
    FlowMetricsAggregator, FlowState, FlowStateEvaluator, InteractionEvent, PerformanceSample,
};
pub use logging::{
    content_request_span, flow_evaluation_span, init_json_logging, init_logging, prefetch_span,
    PerformanceLogger,
};
pub use prefetch::{PredictivePrefetcher, PrefetchCandidate};
pub use service::PathIqService;
pub use telemetry::{CacheTelemetry, TelemetrySnapshot};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core traits and value types at the subsystem boundary
pub mod traits {
    use crate::errors::{GenerationResult, ProfileResult};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// One generated content payload. Cheap to clone; the payload is shared
    /// between tiers, in-flight broadcasts, and callers.
    #[derive(Debug, Clone)]
    pub struct ContentArtifact {
        payload: Arc<Vec<u8>>,
    }

    impl ContentArtifact {
        pub fn new(payload: Vec<u8>) -> Self {
            Self {
                payload: Arc::new(payload),
            }
        }

        /// Serialize a structured document into an artifact
        pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
            Ok(Self::new(serde_json::to_vec(value)?))
        }

        pub fn as_bytes(&self) -> &[u8] {
            &self.payload
        }

        pub fn size_bytes(&self) -> usize {
            self.payload.len()
        }
    }

    /// Upstream generator of learning content. Slow and expensive; the whole
    /// cache hierarchy exists to call this as rarely as possible.
    #[async_trait]
    pub trait ContentGenerator: Send + Sync {
        async fn generate(
            &self,
            topic_id: &str,
            career_context_id: &str,
            difficulty_bucket: u8,
        ) -> GenerationResult<ContentArtifact>;
    }

    /// Learner profile as seen by the cache: career context, optional cohort,
    /// and the topic neighborhood used for prefetch ranking.
    #[derive(Debug, Clone)]
    pub struct LearnerProfile {
        pub learner_id: String,
        pub career_context_id: String,
        pub cohort_id: Option<String>,
        pub recent_topics: Vec<String>,
        /// Likely-next topics, most likely first
        pub upcoming_topics: Vec<String>,
    }

    impl LearnerProfile {
        /// Career context used when the profile service cannot answer
        pub const DEFAULT_CAREER_CONTEXT: &'static str = "general";

        pub fn new(learner_id: &str, career_context_id: &str) -> Self {
            Self {
                learner_id: learner_id.to_string(),
                career_context_id: career_context_id.to_string(),
                cohort_id: None,
                recent_topics: Vec::new(),
                upcoming_topics: Vec::new(),
            }
        }

        /// Fallback profile for learners the profile service cannot resolve:
        /// default career context, no cohort, no trajectory.
        pub fn default_context(learner_id: &str) -> Self {
            Self::new(learner_id, Self::DEFAULT_CAREER_CONTEXT)
        }

        pub fn with_cohort(mut self, cohort_id: &str) -> Self {
            self.cohort_id = Some(cohort_id.to_string());
            self
        }

        pub fn with_upcoming(mut self, topics: Vec<String>) -> Self {
            self.upcoming_topics = topics;
            self
        }
    }

    #[async_trait]
    pub trait LearnerProfileProvider: Send + Sync {
        async fn profile(&self, learner_id: &str) -> ProfileResult<LearnerProfile>;
    }
}

/// Utility functions and helpers
pub mod utils {
    use sha2::{Digest, Sha256};

    /// Short opaque tag for a cohort id. Keys never carry the raw cohort id,
    /// only this tag.
    pub fn cohort_tag(cohort_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cohort_id.as_bytes());
        hex::encode(hasher.finalize())[..8].to_string()
    }

    /// Convert bytes to human-readable size
    pub fn format_bytes(bytes: usize) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", bytes, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
