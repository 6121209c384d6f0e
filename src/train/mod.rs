//! Training and evaluation
//!
//! This module runs agents through environment episodes, stores their
//! experience, applies batched updates and writes run results.

pub mod aggregate;
pub mod config;
pub mod stats;
pub mod trainer;

pub use aggregate::{
    EvaluationSummary, action_accuracy, aggregate_episode_results, evaluation_summary,
    flatten_episodic_metrics,
};
pub use config::TrainerConfig;
pub use stats::{AggregatedStats, TrainingStats};
pub use trainer::{EvaluationReport, QuickEvaluation, RunOutcome, Trainer, belief_scalar, validate_belief};
