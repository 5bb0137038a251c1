//! Flow-state evaluation and difficulty adjustment
//!
//! Pure evaluation over a performance window: the challenge/skill ratio picks
//! the band (anxiety, boredom, in-band), the in-band case weighs engagement
//! against frustration to produce a 0..100 flow percentage.

use crate::config::FlowSettings;
use crate::flow::metrics::PerformanceSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical flow label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowCategory {
    Anxiety,
    Flow,
    Boredom,
    Neutral,
}

/// Derived flow state for a learner; superseded by later computations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState {
    pub learner_id: String,
    /// Always within 0..=100
    pub percentage: f64,
    pub category: FlowCategory,
    pub computed_at: DateTime<Utc>,
}

impl FlowState {
    /// The state reported for learners with no history yet
    pub fn neutral(learner_id: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            percentage: 50.0,
            category: FlowCategory::Neutral,
            computed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentAction {
    Increase,
    Decrease,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    AnxietyPrevention,
    BoredomPrevention,
    FlowOptimization,
    OptimalFlow,
}

/// One difficulty decision per evaluation; consumed immediately
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyAdjustment {
    pub action: AdjustmentAction,
    /// Always within 0..=1; zero exactly when `action == Maintain`
    pub magnitude: f64,
    pub reason: AdjustmentReason,
}

impl DifficultyAdjustment {
    pub fn maintain(reason: AdjustmentReason) -> Self {
        Self {
            action: AdjustmentAction::Maintain,
            magnitude: 0.0,
            reason,
        }
    }

    /// Signed bucket step this adjustment applies to a 1..=10 difficulty
    /// bucket. Non-maintain adjustments always move at least one step.
    pub fn bucket_delta(&self) -> i8 {
        match self.action {
            AdjustmentAction::Maintain => 0,
            AdjustmentAction::Increase | AdjustmentAction::Decrease => {
                let steps = ((self.magnitude * 3.0).round() as i8).max(1);
                if self.action == AdjustmentAction::Increase {
                    steps
                } else {
                    -steps
                }
            }
        }
    }
}

/// Stateless evaluator; all inputs arrive in the history slice
pub struct FlowStateEvaluator {
    settings: FlowSettings,
}

impl FlowStateEvaluator {
    pub fn new(settings: FlowSettings) -> Self {
        Self { settings }
    }

    /// Evaluate a learner's window into a flow state and a difficulty
    /// adjustment.
    pub fn evaluate(
        &self,
        learner_id: &str,
        history: &[PerformanceSample],
    ) -> (FlowState, DifficultyAdjustment) {
        if history.is_empty() {
            return (
                FlowState::neutral(learner_id),
                DifficultyAdjustment::maintain(AdjustmentReason::OptimalFlow),
            );
        }

        let n = history.len() as f64;
        let avg_challenge = history.iter().map(|s| s.challenge_level).sum::<f64>() / n;
        let avg_skill = history.iter().map(|s| s.skill_level).sum::<f64>() / n;
        let avg_engagement = history.iter().map(|s| s.engagement).sum::<f64>() / n;
        let avg_frustration = history.iter().map(|s| s.frustration).sum::<f64>() / n;

        // Samples are clamped to 1..=10 on ingest, so the denominator is safe.
        let ratio = avg_challenge / avg_skill.max(1.0);
        let flow_percentage =
            ((avg_engagement * 0.5 + (1.0 - avg_frustration) * 0.5) * 100.0).clamp(0.0, 100.0);

        let (category, adjustment) = if ratio > self.settings.anxiety_ratio {
            (
                FlowCategory::Anxiety,
                DifficultyAdjustment {
                    action: AdjustmentAction::Decrease,
                    magnitude: ((ratio - self.settings.anxiety_ratio) * 0.5).min(1.0),
                    reason: AdjustmentReason::AnxietyPrevention,
                },
            )
        } else if ratio < self.settings.boredom_ratio {
            (
                FlowCategory::Boredom,
                DifficultyAdjustment {
                    action: AdjustmentAction::Increase,
                    magnitude: ((self.settings.boredom_ratio - ratio) * 0.5).min(1.0),
                    reason: AdjustmentReason::BoredomPrevention,
                },
            )
        } else if flow_percentage < self.settings.target_floor {
            let action = if ratio >= 1.0 {
                AdjustmentAction::Decrease
            } else {
                AdjustmentAction::Increase
            };
            let deficit = (self.settings.target_floor - flow_percentage)
                / self.settings.target_floor.max(1.0);
            (
                FlowCategory::Neutral,
                DifficultyAdjustment {
                    action,
                    magnitude: (deficit * 0.1).clamp(0.01, 0.1),
                    reason: AdjustmentReason::FlowOptimization,
                },
            )
        } else {
            (
                FlowCategory::Flow,
                DifficultyAdjustment::maintain(AdjustmentReason::OptimalFlow),
            )
        };

        // A couple of noisy samples must not swing difficulty; the flow state
        // itself is still reported.
        let adjustment = if self.settings.min_confidence_samples > 1
            && history.len() < self.settings.min_confidence_samples
        {
            DifficultyAdjustment::maintain(adjustment.reason)
        } else {
            adjustment
        };

        let state = FlowState {
            learner_id: learner_id.to_string(),
            percentage: flow_percentage,
            category,
            computed_at: Utc::now(),
        };

        (state, adjustment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(challenge: f64, skill: f64, engagement: f64, frustration: f64) -> PerformanceSample {
        PerformanceSample {
            learner_id: "learner-1".to_string(),
            timestamp: Utc::now(),
            challenge_level: challenge,
            skill_level: skill,
            engagement,
            frustration,
        }
    }

    fn evaluator() -> FlowStateEvaluator {
        FlowStateEvaluator::new(FlowSettings::default())
    }

    fn evaluator_without_guard() -> FlowStateEvaluator {
        let mut settings = FlowSettings::default();
        settings.min_confidence_samples = 0;
        FlowStateEvaluator::new(settings)
    }

    #[test]
    fn test_empty_history_is_neutral_maintain() {
        let (state, adj) = evaluator().evaluate("learner-1", &[]);
        assert_eq!(state.percentage, 50.0);
        assert_eq!(state.category, FlowCategory::Neutral);
        assert_eq!(adj.action, AdjustmentAction::Maintain);
        assert_eq!(adj.magnitude, 0.0);
    }

    #[test]
    fn test_overwhelmed_learner_gets_decrease() {
        // challenge 8 vs skill 3, five times: ratio 8/3
        let history: Vec<_> = (0..5).map(|_| sample(8.0, 3.0, 0.5, 0.5)).collect();
        let (state, adj) = evaluator().evaluate("learner-1", &history);

        assert_eq!(state.category, FlowCategory::Anxiety);
        assert_eq!(adj.action, AdjustmentAction::Decrease);
        assert_eq!(adj.reason, AdjustmentReason::AnxietyPrevention);
        let expected = ((8.0 / 3.0) - 1.3) * 0.5;
        assert!((adj.magnitude - expected).abs() < 1e-9);
        assert!((0.68..0.69).contains(&adj.magnitude));
    }

    #[test]
    fn test_bored_learner_gets_increase() {
        let history: Vec<_> = (0..5).map(|_| sample(3.0, 9.0, 0.9, 0.1)).collect();
        let (state, adj) = evaluator().evaluate("learner-1", &history);

        assert_eq!(state.category, FlowCategory::Boredom);
        assert_eq!(adj.action, AdjustmentAction::Increase);
        assert_eq!(adj.reason, AdjustmentReason::BoredomPrevention);
        assert!(adj.magnitude > 0.0);
    }

    #[test]
    fn test_in_band_low_flow_gets_small_nudge() {
        // ratio 1.0, heavy frustration pushes flow percentage under the floor
        let history: Vec<_> = (0..5).map(|_| sample(5.0, 5.0, 0.4, 0.8)).collect();
        let (state, adj) = evaluator().evaluate("learner-1", &history);

        assert!(state.percentage < 70.0);
        assert_eq!(adj.reason, AdjustmentReason::FlowOptimization);
        assert_ne!(adj.action, AdjustmentAction::Maintain);
        assert!(adj.magnitude <= 0.1);
    }

    #[test]
    fn test_optimal_flow_maintains() {
        let history: Vec<_> = (0..5).map(|_| sample(5.0, 5.0, 0.9, 0.1)).collect();
        let (state, adj) = evaluator().evaluate("learner-1", &history);

        assert_eq!(state.category, FlowCategory::Flow);
        assert_eq!(adj.action, AdjustmentAction::Maintain);
        assert_eq!(adj.magnitude, 0.0);
        assert_eq!(adj.reason, AdjustmentReason::OptimalFlow);
    }

    #[test]
    fn test_short_history_forces_maintain() {
        let history = vec![sample(9.0, 2.0, 0.5, 0.5)];
        let (state, adj) = evaluator().evaluate("learner-1", &history);

        // State still reflects the band, the adjustment does not act on it yet
        assert_eq!(state.category, FlowCategory::Anxiety);
        assert_eq!(adj.action, AdjustmentAction::Maintain);
        assert_eq!(adj.magnitude, 0.0);
    }

    #[test]
    fn test_single_sample_valid_with_guard_disabled() {
        let history = vec![sample(9.0, 2.0, 0.5, 0.5)];
        let (_, adj) = evaluator_without_guard().evaluate("learner-1", &history);
        assert_eq!(adj.action, AdjustmentAction::Decrease);
        assert!(adj.magnitude > 0.0);
    }

    #[test]
    fn test_bucket_delta_moves_at_least_one_step() {
        let adj = DifficultyAdjustment {
            action: AdjustmentAction::Increase,
            magnitude: 0.05,
            reason: AdjustmentReason::FlowOptimization,
        };
        assert_eq!(adj.bucket_delta(), 1);

        let adj = DifficultyAdjustment {
            action: AdjustmentAction::Decrease,
            magnitude: 0.9,
            reason: AdjustmentReason::AnxietyPrevention,
        };
        assert_eq!(adj.bucket_delta(), -3);

        assert_eq!(
            DifficultyAdjustment::maintain(AdjustmentReason::OptimalFlow).bucket_delta(),
            0
        );
    }

    proptest! {
        #[test]
        fn prop_high_ratio_always_decreases(
            challenge in 4.0f64..10.0,
            skill in 1.0f64..3.0,
            engagement in 0.0f64..1.0,
            frustration in 0.0f64..1.0,
        ) {
            prop_assume!(challenge / skill > 1.3);
            let history: Vec<_> = (0..5)
                .map(|_| sample(challenge, skill, engagement, frustration))
                .collect();
            let (_, adj) = evaluator_without_guard().evaluate("p", &history);
            prop_assert_eq!(adj.action, AdjustmentAction::Decrease);
            prop_assert!(adj.magnitude > 0.0);
        }

        #[test]
        fn prop_low_ratio_always_increases(
            challenge in 1.0f64..4.0,
            skill in 6.0f64..10.0,
            engagement in 0.0f64..1.0,
            frustration in 0.0f64..1.0,
        ) {
            prop_assume!(challenge / skill < 0.7);
            let history: Vec<_> = (0..5)
                .map(|_| sample(challenge, skill, engagement, frustration))
                .collect();
            let (_, adj) = evaluator_without_guard().evaluate("p", &history);
            prop_assert_eq!(adj.action, AdjustmentAction::Increase);
            prop_assert!(adj.magnitude > 0.0);
        }

        #[test]
        fn prop_invariants_hold_for_all_histories(
            entries in prop::collection::vec(
                (1.0f64..=10.0, 1.0f64..=10.0, 0.0f64..=1.0, 0.0f64..=1.0),
                0..30,
            )
        ) {
            let history: Vec<_> = entries
                .iter()
                .map(|(c, s, e, f)| sample(*c, *s, *e, *f))
                .collect();
            let (state, adj) = evaluator().evaluate("p", &history);

            prop_assert!((0.0..=100.0).contains(&state.percentage));
            prop_assert!((0.0..=1.0).contains(&adj.magnitude));
            if adj.action == AdjustmentAction::Maintain {
                prop_assert_eq!(adj.magnitude, 0.0);
            }
        }
    }
}
