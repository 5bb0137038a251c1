//! Logging configuration and utilities for the PathIQ cache subsystem
//!
//! Provides structured logging for:
//! - Foreground content requests and cache tier hits/misses
//! - Flow-state evaluation and difficulty adjustments
//! - Background prefetch warming
//! - Performance measurements around upstream generation

use tracing::Span;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use std::io;

/// Initialize the logging system for the cache subsystem
pub fn init_logging() -> eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pathiq_cache=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("PathIQ cache logging initialized");
    Ok(())
}

/// Initialize logging with JSON output for ingestion pipelines
pub fn init_json_logging() -> eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pathiq_cache=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .json()
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("PathIQ cache logging initialized with JSON format");
    Ok(())
}

/// Create a tracing span for a foreground content request
pub fn content_request_span(learner_id: &str, topic_id: &str) -> Span {
    tracing::info_span!(
        "content_request",
        learner_id = %learner_id,
        topic_id = %topic_id,
        cache_tier = tracing::field::Empty,
        difficulty_bucket = tracing::field::Empty,
        generation_ms = tracing::field::Empty,
    )
}

/// Create a tracing span for a flow-state evaluation
pub fn flow_evaluation_span(learner_id: &str, sample_count: usize) -> Span {
    tracing::info_span!(
        "flow_evaluation",
        learner_id = %learner_id,
        sample_count = sample_count,
        flow_percentage = tracing::field::Empty,
        adjustment = tracing::field::Empty,
    )
}

/// Create a tracing span for a background prefetch cycle
pub fn prefetch_span(learner_id: &str, candidate_count: usize) -> Span {
    tracing::info_span!(
        "prefetch_warm",
        learner_id = %learner_id,
        candidate_count = candidate_count,
        issued = tracing::field::Empty,
    )
}

/// Structured logging for performance measurements
pub struct PerformanceLogger {
    start_time: std::time::Instant,
    operation: String,
}

impl PerformanceLogger {
    pub fn start(operation: &str) -> Self {
        tracing::debug!("Starting performance measurement for: {}", operation);
        Self {
            start_time: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn finish(self) -> u64 {
        let total_ms = self.start_time.elapsed().as_millis() as u64;
        tracing::info!(
            operation = %self.operation,
            total_time_ms = total_ms,
            "Performance measurement completed"
        );
        total_ms
    }
}

/// Log a difficulty adjustment decision with its inputs
pub fn log_difficulty_adjustment(
    learner_id: &str,
    action: &str,
    magnitude: f64,
    reason: &str,
    flow_percentage: f64,
) {
    tracing::info!(
        learner_id = learner_id,
        action = action,
        magnitude = magnitude,
        reason = reason,
        flow_percentage = flow_percentage,
        "Difficulty adjustment decided"
    );
}

/// Log a cache tier outcome for a key
pub fn log_tier_outcome(key: &str, tier: Option<&str>, latency_us: u64) {
    match tier {
        Some(tier) => tracing::debug!(
            key = key,
            tier = tier,
            latency_us = latency_us,
            "Cache hit"
        ),
        None => tracing::debug!(key = key, latency_us = latency_us, "Cache miss at all tiers"),
    }
}

/// Custom macro for prefetch-component debug logging
#[macro_export]
macro_rules! prefetch_debug {
    ($($arg:tt)*) => {
        tracing::debug!(
            target: "pathiq_cache",
            component = "prefetch",
            $($arg)*
        )
    };
}
