//! Learner flow-state engine
//!
//! Turns raw interaction events into rolling performance windows and derives
//! the flow state and difficulty adjustment that parameterize cache keys.

pub mod difficulty;
pub mod evaluator;
pub mod metrics;

pub use difficulty::DifficultyTracker;
pub use evaluator::{
    AdjustmentAction, AdjustmentReason, DifficultyAdjustment, FlowCategory, FlowState,
    FlowStateEvaluator,
};
pub use metrics::{FlowMetricsAggregator, InteractionEvent, PerformanceSample};
