//! # Social RL
//!
//! Multi-agent learning in social environments under partial observability
//!
//! Agents observe private signals and their neighbors' actions, maintain a
//! belief over a hidden world state and a latent estimate of the other
//! agents' strategies, and learn from replayed experience. Two reference
//! environments are included: discrete social learning and Keller–Rady
//! strategic experimentation. Optional Synaptic Intelligence protects
//! parameters that mattered for previously seen world states.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use social_rl::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let env = SocialLearningEnv::new(SocialLearningConfig::default());
//! let config = TrainerConfig::new().horizon(200);
//! let agents: Vec<BayesianAgent> = (0..env.descriptor().num_agents)
//!     .map(|id| BayesianAgent::new(id, env.descriptor(), config.agent_config()))
//!     .collect();
//!
//! let mut trainer = Trainer::new(env, agents, config)?;
//! let outcome = trainer.run_agents(true, None)?;
//! println!("learning rates: {:?}", outcome.learning_rates);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Agent capability interface and reference agent
pub mod agent;

/// Replay storage for agent updates
pub mod buffer;

/// Environment traits and implementations
pub mod env;

/// Error types
pub mod error;

/// Per-episode metrics recording and serialization
pub mod metrics;

/// Simulation loop, training and evaluation
pub mod train;

/// Utility functions and helpers
pub mod utils;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        agent::{Agent, BayesianAgent, BayesianAgentConfig, ContinualLearning, LossDiagnostics},
        buffer::{ReplayBuffer, Transition, TransitionBatch},
        env::{
            Action, AgentId, EnvironmentDescriptor, EnvironmentKind, Observation, Reward,
            SocialEnvironment, SocialLearningConfig, SocialLearningEnv, StateId,
            StrategicExperimentationConfig, StrategicExperimentationEnv, StrategicParams,
        },
        error::SimulationError,
        metrics::{EpisodeMetrics, MetricValue, MetricsTracker},
        train::{Trainer, TrainerConfig},
    };
}

/// Current version of social-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
