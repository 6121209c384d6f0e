//! Agent capability interface
//!
//! The simulation loop treats an agent as an opaque capability: it selects
//! actions, updates its belief and latent state from encoded observations,
//! learns from sampled transition batches, and exposes continual-learning
//! hooks. Network internals are up to the implementation; [`bayesian`]
//! provides a closed-form reference agent.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    buffer::TransitionBatch,
    env::{Action, AgentId, StrategicParams},
    metrics::EpisodeMetrics,
};

pub mod bayesian;
pub mod continual;

pub use bayesian::{BayesianAgent, BayesianAgentConfig};
pub use continual::{ContinualLearning, SynapticIntelligence, TaskSwitch};

/// Square matrix of attention weights between agents
pub type AttentionMatrix = Vec<Vec<f64>>;

/// Action chosen by an agent together with its action distribution
#[derive(Debug, Clone, PartialEq)]
pub struct ActionChoice {
    /// Action sent to the environment
    pub action: Action,

    /// Probability per discrete action (`[1 - a, a]` for an allocation `a`)
    pub probs: Vec<f64>,
}

/// Loss diagnostics returned by one parameter update
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossDiagnostics {
    /// Belief network loss
    pub belief_loss: f64,

    /// Policy loss
    pub policy_loss: f64,

    /// Continual-learning penalty on the belief network
    pub belief_si_penalty: f64,

    /// Continual-learning penalty on the policy network
    pub policy_si_penalty: f64,

    /// Sum of all terms
    pub total_loss: f64,
}

impl LossDiagnostics {
    /// Named entries for metrics recording
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("belief_loss", self.belief_loss),
            ("policy_loss", self.policy_loss),
            ("belief_si_penalty", self.belief_si_penalty),
            ("policy_si_penalty", self.policy_si_penalty),
            ("total_loss", self.total_loss),
        ]
    }
}

/// Capability interface consumed by the simulation loop
///
/// Each agent exclusively owns its belief, latent state and
/// continual-learning trackers; the loop never hands one agent's state to
/// another.
pub trait Agent {
    /// Identifier of this agent
    fn id(&self) -> AgentId;

    /// Choose an action from the current belief and latent state
    ///
    /// `metrics` is the current episode's record, for implementations that
    /// log their own per-step diagnostics.
    fn select_action(&mut self, metrics: &mut EpisodeMetrics) -> Result<ActionChoice>;

    /// Update the belief from an encoded observation
    ///
    /// Returns the new belief and belief distribution.
    fn observe(&mut self, signal: &[f64], neighbor_actions: &[f64]) -> Result<(Vec<f64>, Vec<f64>)>;

    /// Update the latent estimate of the other agents' strategies
    fn infer_latent(
        &mut self,
        signal: &[f64],
        neighbor_actions: &[f64],
        reward: f64,
        next_signal: &[f64],
    ) -> Result<Vec<f64>>;

    /// Run one parameter update on a sampled batch
    fn update(&mut self, batch: &TransitionBatch) -> Result<LossDiagnostics>;

    /// Current belief state
    fn current_belief(&self) -> &[f64];

    /// Current latent state
    fn current_latent(&self) -> &[f64];

    /// Current belief distribution over world states
    fn belief_distribution(&self) -> &[f64];

    /// Mean and log-variance of the latent distribution
    fn latent_distribution_params(&self) -> (Vec<f64>, Vec<f64>);

    /// Allocation the policy would choose without exploration noise
    ///
    /// `None` for agents without a continuous policy head. Must not mutate
    /// any learnable state.
    fn deterministic_allocation(&self) -> Option<f64>;

    /// Raw policy logits from the most recent action selection
    fn action_logits(&self) -> Option<&[f64]> {
        None
    }

    /// Attention weights over neighbors, if this agent computes them
    fn try_get_attention(&self) -> Option<AttentionMatrix> {
        None
    }

    /// Provide the payoff structure of a strategic-experimentation environment
    fn set_environment_parameters(&mut self, params: &StrategicParams);

    /// Enable learning
    fn set_train_mode(&mut self);

    /// Disable learning; belief and latent updates run without gradient
    /// tracking
    fn set_eval_mode(&mut self);

    /// Reset belief and latent state for a new episode
    fn reset_internal_state(&mut self);

    /// Reseed the agent's random source
    fn reseed(&mut self, seed: u64);

    /// Continual-learning state, if the agent uses it
    fn continual(&self) -> Option<&ContinualLearning> {
        None
    }

    /// Mutable continual-learning state, if the agent uses it
    fn continual_mut(&mut self) -> Option<&mut ContinualLearning> {
        None
    }

    /// Persist learnable parameters
    fn save(&self, path: &Path) -> Result<()>;

    /// Restore learnable parameters
    fn load(&mut self, path: &Path) -> Result<()>;
}
