//! Configuration management for the PathIQ cache subsystem
//!
//! Provides configuration for:
//! - Cache tier capacities and TTLs
//! - Upstream generation deadlines and retries
//! - Predictive prefetch budget and concurrency
//! - Flow-state evaluation thresholds
//!
//! Supports TOML files, environment variable overrides, validation, and a
//! fluent builder.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the cache subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathIqConfig {
    /// Cache tier settings
    pub cache: CacheSettings,
    /// Upstream generation settings
    pub generation: GenerationSettings,
    /// Predictive prefetch settings
    pub prefetch: PrefetchSettings,
    /// Flow-state evaluation settings
    pub flow: FlowSettings,
}

/// Cache tier capacities and TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Edge tier capacity (entries)
    pub edge_capacity: usize,
    /// Application tier capacity (entries)
    pub application_capacity: usize,
    /// Durable tier capacity (entries)
    pub durable_capacity: usize,
    /// Predictive tier capacity (entries)
    pub predictive_capacity: usize,
    /// Edge tier TTL in seconds
    pub edge_ttl_secs: u64,
    /// Application tier effective freshness window in seconds
    pub application_ttl_secs: u64,
    /// Durable tier TTL in seconds
    pub durable_ttl_secs: u64,
    /// Predictive tier base TTL in seconds, scaled by prediction confidence
    pub predictive_ttl_secs: u64,
}

/// Upstream generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Foreground deadline in milliseconds
    pub deadline_ms: u64,
    /// Bounded retries after a generation failure
    pub max_retries: u32,
}

/// Predictive prefetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchSettings {
    /// Enable prefetch warming
    pub enabled: bool,
    /// Hard cap on concurrent prefetch generations, system-wide
    pub max_concurrent_warms: usize,
    /// Candidates whose probability/cost score falls below this are dropped
    pub score_threshold: f64,
    /// Top-N candidate cap per warm cycle
    pub max_candidates: usize,
    /// Estimated cost units for one generation call
    pub generation_cost_units: f64,
    /// Trigger a warm cycle after each reported interaction
    pub warm_on_interaction: bool,
}

/// Flow-state evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Rolling window cap (samples)
    pub window_max_samples: usize,
    /// Rolling window cap (age in seconds)
    pub window_max_age_secs: u64,
    /// Flow percentage floor below which a small corrective nudge is emitted
    pub target_floor: f64,
    /// Challenge/skill ratio above which anxiety prevention kicks in
    pub anxiety_ratio: f64,
    /// Challenge/skill ratio below which boredom prevention kicks in
    pub boredom_ratio: f64,
    /// Histories shorter than this always yield a maintain adjustment.
    /// 0 or 1 disables the guard.
    pub min_confidence_samples: usize,
}

impl Default for PathIqConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            generation: GenerationSettings::default(),
            prefetch: PrefetchSettings::default(),
            flow: FlowSettings::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            edge_capacity: 1_000,
            application_capacity: 10_000,
            durable_capacity: 100_000,
            predictive_capacity: 5_000,
            edge_ttl_secs: 3_600,
            application_ttl_secs: 900,
            durable_ttl_secs: 86_400,
            predictive_ttl_secs: 600,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            deadline_ms: 3_000,
            max_retries: 1,
        }
    }
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_warms: 4.min(num_cpus::get()),
            score_threshold: 0.25,
            max_candidates: 4,
            generation_cost_units: 1.0,
            warm_on_interaction: true,
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            window_max_samples: 50,
            window_max_age_secs: 1_800,
            target_floor: 70.0,
            anxiety_ratio: 1.3,
            boredom_ratio: 0.7,
            min_confidence_samples: 3,
        }
    }
}

impl CacheSettings {
    pub fn edge_ttl(&self) -> Duration {
        Duration::from_secs(self.edge_ttl_secs)
    }

    pub fn application_ttl(&self) -> Duration {
        Duration::from_secs(self.application_ttl_secs)
    }

    pub fn durable_ttl(&self) -> Duration {
        Duration::from_secs(self.durable_ttl_secs)
    }

    pub fn predictive_ttl(&self) -> Duration {
        Duration::from_secs(self.predictive_ttl_secs)
    }
}

impl GenerationSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl PathIqConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(&path).map_err(|_| {
            ConfigurationError::FileNotFound {
                path: path.as_ref().to_string_lossy().to_string(),
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ConfigurationError::ParsingFailed {
                reason: e.to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables on top of defaults
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut config = Self::default();

        if let Ok(deadline) = std::env::var("PATHIQ_GENERATION_DEADLINE_MS") {
            config.generation.deadline_ms =
                deadline
                    .parse()
                    .map_err(|e| ConfigurationError::EnvironmentVariable {
                        var: "PATHIQ_GENERATION_DEADLINE_MS".to_string(),
                        error: format!("{e}"),
                    })?;
        }

        if let Ok(enabled) = std::env::var("PATHIQ_PREFETCH_ENABLED") {
            config.prefetch.enabled = enabled.parse().unwrap_or(true);
        }

        if let Ok(warms) = std::env::var("PATHIQ_PREFETCH_MAX_WARMS") {
            config.prefetch.max_concurrent_warms =
                warms
                    .parse()
                    .map_err(|e| ConfigurationError::EnvironmentVariable {
                        var: "PATHIQ_PREFETCH_MAX_WARMS".to_string(),
                        error: format!("{e}"),
                    })?;
        }

        if let Ok(floor) = std::env::var("PATHIQ_FLOW_TARGET_FLOOR") {
            config.flow.target_floor =
                floor
                    .parse()
                    .map_err(|e| ConfigurationError::EnvironmentVariable {
                        var: "PATHIQ_FLOW_TARGET_FLOOR".to_string(),
                        error: format!("{e}"),
                    })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cache.edge_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "cache.edge_capacity".to_string(),
                value: "0".to_string(),
                reason: "edge tier must hold at least one entry".to_string(),
            });
        }

        if self.generation.deadline_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "generation.deadline_ms".to_string(),
                value: "0".to_string(),
                reason: "foreground deadline must be positive".to_string(),
            });
        }

        if self.prefetch.max_concurrent_warms == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "prefetch.max_concurrent_warms".to_string(),
                value: "0".to_string(),
                reason: "prefetch pool needs at least one permit".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.prefetch.score_threshold) {
            return Err(ConfigurationError::InvalidValue {
                key: "prefetch.score_threshold".to_string(),
                value: self.prefetch.score_threshold.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&self.flow.target_floor) {
            return Err(ConfigurationError::InvalidValue {
                key: "flow.target_floor".to_string(),
                value: self.flow.target_floor.to_string(),
                reason: "must be between 0.0 and 100.0".to_string(),
            });
        }

        if self.flow.boredom_ratio >= self.flow.anxiety_ratio {
            return Err(ConfigurationError::InvalidValue {
                key: "flow.boredom_ratio".to_string(),
                value: self.flow.boredom_ratio.to_string(),
                reason: "boredom ratio must be below the anxiety ratio".to_string(),
            });
        }

        if self.flow.window_max_samples == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "flow.window_max_samples".to_string(),
                value: "0".to_string(),
                reason: "rolling window must hold at least one sample".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: PathIqConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: PathIqConfig::default(),
        }
    }

    /// Set the foreground generation deadline
    pub fn generation_deadline_ms(mut self, ms: u64) -> Self {
        self.config.generation.deadline_ms = ms;
        self
    }

    /// Set the prefetch concurrency cap
    pub fn max_concurrent_warms(mut self, warms: usize) -> Self {
        self.config.prefetch.max_concurrent_warms = warms;
        self
    }

    /// Enable or disable prefetch warming
    pub fn prefetch_enabled(mut self, enabled: bool) -> Self {
        self.config.prefetch.enabled = enabled;
        self
    }

    /// Set the edge tier TTL
    pub fn edge_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache.edge_ttl_secs = secs;
        self
    }

    /// Set the minimum sample count before non-maintain adjustments
    pub fn min_confidence_samples(mut self, samples: usize) -> Self {
        self.config.flow.min_confidence_samples = samples;
        self
    }

    /// Set the flow target floor
    pub fn target_floor(mut self, floor: f64) -> Self {
        self.config.flow.target_floor = floor;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PathIqConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
