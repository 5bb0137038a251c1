//! Error types and handling for the PathIQ cache subsystem
//!
//! Covers:
//! - Content generation (timeouts, upstream failures)
//! - Cache tier operations and availability
//! - Configuration loading and validation
//! - Learner profile lookups

use thiserror::Error;
use std::fmt;

/// Main error type for the PathIQ cache subsystem
#[derive(Error, Debug)]
pub enum PathIqError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Every tier and the upstream generator are down. The only case in
    /// which a caller receives no content artifact at all.
    #[error("all cache tiers and the content generator are unavailable")]
    TotalUnavailable,

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Upstream content generation errors
///
/// `Clone` because the single-flight coordinator broadcasts one outcome to
/// every concurrent waiter for the same key.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("generation timed out: topic={topic_id}, difficulty={difficulty}, deadline_ms={deadline_ms}")]
    Timeout {
        topic_id: String,
        difficulty: u8,
        deadline_ms: u64,
    },

    #[error("generation failed: topic={topic_id}, reason={reason}")]
    Failed { topic_id: String, reason: String },

    #[error("generation flight interrupted: {reason}")]
    FlightInterrupted { reason: String },
}

/// Cache tier operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("tier unavailable: {tier}")]
    TierUnavailable { tier: String },

    #[error("invalid key pattern: pattern={pattern}, reason={reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("invalid configuration value: key={key}, value={value}, reason={reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("configuration parsing failed: {reason}")]
    ParsingFailed { reason: String },

    #[error("environment variable error: {var}, error={error}")]
    EnvironmentVariable { var: String, error: String },
}

/// Learner profile collaborator errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile lookup failed: learner={learner_id}, reason={reason}")]
    LookupFailed { learner_id: String, reason: String },

    #[error("unknown learner: {learner_id}")]
    UnknownLearner { learner_id: String },
}

/// Result type aliases for convenience
pub type PathIqResult<T> = Result<T, PathIqError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Utility functions for error handling
pub mod utils {
    use super::*;

    /// Check if the request path can still produce content after this error
    /// (stale fallback, remaining tiers).
    pub fn is_recoverable_error(error: &PathIqError) -> bool {
        match error {
            PathIqError::Generation(GenerationError::Timeout { .. }) => true,
            PathIqError::Generation(GenerationError::Failed { .. }) => true,
            PathIqError::Cache(CacheError::TierUnavailable { .. }) => true,
            PathIqError::Profile(_) => true,
            PathIqError::Configuration(_) => false,
            PathIqError::TotalUnavailable => false,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn get_error_severity(error: &PathIqError) -> ErrorSeverity {
        match error {
            PathIqError::TotalUnavailable => ErrorSeverity::Critical,
            PathIqError::Configuration(_) => ErrorSeverity::High,
            PathIqError::Generation(GenerationError::Failed { .. }) => ErrorSeverity::Medium,
            PathIqError::Generation(_) => ErrorSeverity::Low,
            PathIqError::Cache(_) => ErrorSeverity::Low,
            PathIqError::Profile(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
