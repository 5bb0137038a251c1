//! Cache key derivation and pattern matching
//!
//! Keys are a deterministic composite of topic, career context, difficulty
//! bucket, and an optional cohort tag. The raw learner id never appears in a
//! key, so learners in similar state share entries while difficulty
//! sensitivity is preserved.

use crate::errors::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub topic_id: String,
    pub career_context_id: String,
    /// 1..=10
    pub difficulty_bucket: u8,
    /// Short cohort tag, already hashed; absent for cohort-less learners
    pub cohort_id: Option<String>,
}

impl CacheKey {
    pub fn new(
        topic_id: &str,
        career_context_id: &str,
        difficulty_bucket: u8,
        cohort_id: Option<String>,
    ) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            career_context_id: career_context_id.to_string(),
            difficulty_bucket: difficulty_bucket.clamp(1, 10),
            cohort_id,
        }
    }

    /// Canonical string form, used for pattern matching and logging
    pub fn render(&self) -> String {
        match &self.cohort_id {
            Some(cohort) => format!(
                "topic:{}:career:{}:diff:{}:cohort:{}",
                self.topic_id, self.career_context_id, self.difficulty_bucket, cohort
            ),
            None => format!(
                "topic:{}:career:{}:diff:{}",
                self.topic_id, self.career_context_id, self.difficulty_bucket
            ),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Pattern over rendered keys: prefix match or cohort-tag match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Matches keys whose rendered form starts with the prefix
    Prefix(String),
    /// Matches keys carrying the given cohort tag
    CohortTag(String),
}

impl KeyPattern {
    /// Pattern covering every difficulty and career variant of a topic
    pub fn topic(topic_id: &str) -> Self {
        KeyPattern::Prefix(format!("topic:{topic_id}:"))
    }

    /// Pattern covering every entry tagged with a cohort
    pub fn cohort(cohort_tag: &str) -> Self {
        KeyPattern::CohortTag(cohort_tag.to_string())
    }

    /// Parse the string form: a trailing `*` denotes a prefix pattern, a
    /// `cohort:` prefix denotes a tag pattern, anything else is an exact
    /// rendered-key prefix.
    pub fn parse(pattern: &str) -> CacheResult<Self> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty pattern".to_string(),
            });
        }
        if let Some(tag) = pattern.strip_prefix("cohort:") {
            if tag.is_empty() {
                return Err(CacheError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "empty cohort tag".to_string(),
                });
            }
            return Ok(KeyPattern::CohortTag(tag.to_string()));
        }
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        if prefix.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "wildcard-only pattern would match everything".to_string(),
            });
        }
        Ok(KeyPattern::Prefix(prefix.to_string()))
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::Prefix(prefix) => key.render().starts_with(prefix.as_str()),
            KeyPattern::CohortTag(tag) => key.cohort_id.as_deref() == Some(tag.as_str()),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            KeyPattern::CohortTag(tag) => write!(f, "cohort:{tag}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_matches_documented_shape() {
        let key = CacheKey::new("5", "eng", 3, None);
        assert_eq!(key.render(), "topic:5:career:eng:diff:3");

        let key = CacheKey::new("5", "eng", 3, Some("a1b2c3d4".to_string()));
        assert_eq!(key.render(), "topic:5:career:eng:diff:3:cohort:a1b2c3d4");
    }

    #[test]
    fn test_bucket_is_clamped() {
        assert_eq!(CacheKey::new("t", "c", 0, None).difficulty_bucket, 1);
        assert_eq!(CacheKey::new("t", "c", 14, None).difficulty_bucket, 10);
    }

    #[test]
    fn test_topic_pattern_scopes_to_exact_topic() {
        let pattern = KeyPattern::parse("topic:42:*").unwrap();
        assert!(pattern.matches(&CacheKey::new("42", "eng", 3, None)));
        assert!(!pattern.matches(&CacheKey::new("421", "eng", 3, None)));
        assert!(!pattern.matches(&CacheKey::new("5", "eng", 3, None)));
    }

    #[test]
    fn test_cohort_pattern_matches_tag_only() {
        let pattern = KeyPattern::parse("cohort:a1b2").unwrap();
        assert!(pattern.matches(&CacheKey::new("5", "eng", 3, Some("a1b2".to_string()))));
        assert!(!pattern.matches(&CacheKey::new("5", "eng", 3, Some("zzzz".to_string()))));
        assert!(!pattern.matches(&CacheKey::new("5", "eng", 3, None)));
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        assert!(KeyPattern::parse("").is_err());
        assert!(KeyPattern::parse("*").is_err());
        assert!(KeyPattern::parse("cohort:").is_err());
    }
}
