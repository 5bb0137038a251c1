//! Rolling performance metrics per learner
//!
//! Ingests raw interaction events from the learning-session layer and keeps a
//! bounded window of immutable [`PerformanceSample`]s per learner. The window
//! is capped by both sample count and age; either limit evicts.

use crate::config::FlowSettings;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Raw interaction event delivered by the learning-session layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub learner_id: String,
    pub timestamp: DateTime<Utc>,
    pub correct: bool,
    pub latency_ms: u64,
    pub hint_used: bool,
    /// Difficulty bucket (1..=10) of the content this event refers to
    pub difficulty: u8,
}

impl InteractionEvent {
    pub fn now(learner_id: &str, correct: bool, latency_ms: u64, hint_used: bool, difficulty: u8) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            timestamp: Utc::now(),
            correct,
            latency_ms,
            hint_used,
            difficulty,
        }
    }
}

/// One immutable sample in a learner's rolling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub learner_id: String,
    pub timestamp: DateTime<Utc>,
    /// Challenge level of the attempted content, 1..=10
    pub challenge_level: f64,
    /// Running skill estimate at the time of the attempt, 1..=10
    pub skill_level: f64,
    /// 0..=1
    pub engagement: f64,
    /// 0..=1
    pub frustration: f64,
}

#[derive(Debug)]
struct LearnerWindow {
    samples: VecDeque<PerformanceSample>,
    skill_estimate: f64,
}

impl LearnerWindow {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            // Mid-scale until the learner shows us otherwise
            skill_estimate: 5.0,
        }
    }
}

/// Aggregates interaction events into per-learner rolling windows
pub struct FlowMetricsAggregator {
    windows: DashMap<String, LearnerWindow>,
    settings: FlowSettings,
}

impl FlowMetricsAggregator {
    pub fn new(settings: FlowSettings) -> Self {
        Self {
            windows: DashMap::new(),
            settings,
        }
    }

    /// Record one event, producing the sample that entered the window
    pub fn record(&self, event: &InteractionEvent) -> PerformanceSample {
        let mut window = self
            .windows
            .entry(event.learner_id.clone())
            .or_insert_with(LearnerWindow::new);

        window.skill_estimate = next_skill_estimate(window.skill_estimate, event);

        let sample = PerformanceSample {
            learner_id: event.learner_id.clone(),
            timestamp: event.timestamp,
            challenge_level: f64::from(event.difficulty.clamp(1, 10)),
            skill_level: window.skill_estimate,
            engagement: engagement_score(event),
            frustration: frustration_score(event),
        };

        window.samples.push_back(sample.clone());

        let max_samples = self.settings.window_max_samples;
        while window.samples.len() > max_samples {
            window.samples.pop_front();
        }
        let cutoff = Utc::now() - ChronoDuration::seconds(self.settings.window_max_age_secs as i64);
        while window
            .samples
            .front()
            .map(|s| s.timestamp < cutoff)
            .unwrap_or(false)
        {
            window.samples.pop_front();
        }

        sample
    }

    /// Current window for a learner, oldest first, age-pruned
    pub fn history(&self, learner_id: &str) -> Vec<PerformanceSample> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.settings.window_max_age_secs as i64);
        self.windows
            .get(learner_id)
            .map(|window| {
                window
                    .samples
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a learner's window and skill estimate (learner reset)
    pub fn reset(&self, learner_id: &str) {
        self.windows.remove(learner_id);
    }

    pub fn tracked_learners(&self) -> usize {
        self.windows.len()
    }
}

fn next_skill_estimate(current: f64, event: &InteractionEvent) -> f64 {
    let delta = match (event.correct, event.hint_used) {
        (true, false) => 0.4,
        (true, true) => 0.2,
        (false, false) => -0.6,
        (false, true) => -0.3,
    };
    (current + delta).clamp(1.0, 10.0)
}

fn engagement_score(event: &InteractionEvent) -> f64 {
    let latency_s = event.latency_ms as f64 / 1000.0;
    // Quick answers within the comfort span read as engaged; long stalls decay.
    let score = if latency_s <= 20.0 {
        0.7 + 0.3 * (1.0 - latency_s / 20.0)
    } else {
        0.7 - (latency_s - 20.0) / 40.0 * 0.5
    };
    score.clamp(0.2, 1.0)
}

fn frustration_score(event: &InteractionEvent) -> f64 {
    let mut score: f64 = if event.correct { 0.1 } else { 0.5 };
    if event.hint_used {
        score += 0.2;
    }
    if event.latency_ms > 30_000 {
        score += 0.2;
    }
    if event.correct && event.latency_ms < 8_000 {
        score -= 0.1;
    }
    score.clamp(0.0, 1.0)
}
