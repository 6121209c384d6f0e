//! Environment traits and shared types
//!
//! This module defines the interface the simulation loop consumes from an
//! environment, plus the observation, reward and step-info records that
//! flow across that boundary. Two reference environments are provided.
//!
//! The environment variant is carried explicitly as an [`EnvironmentKind`]
//! decided once at construction, so the rest of the crate never probes an
//! environment for variant-specific attributes.

use std::collections::BTreeMap;

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

pub mod social_learning;
pub mod strategic;

pub use social_learning::{SocialLearningConfig, SocialLearningEnv};
pub use strategic::{StrategicExperimentationConfig, StrategicExperimentationEnv};

/// Identifier of an agent (index into the population)
pub type AgentId = usize;

/// Identifier of a world state; doubles as the continual-learning task id
pub type StateId = usize;

/// Reference values derived from the environment description
pub type TheoreticalBounds = BTreeMap<String, f64>;

/// Joint action of all agents for one step
pub type JointActions = BTreeMap<AgentId, Action>;

/// Per-agent action probability vectors for one step
pub type JointActionProbs = BTreeMap<AgentId, Vec<f64>>;

/// Core trait for multi-agent social environments
///
/// The environment is a black-box state machine: it is initialized once per
/// episode and then advanced one tick per call to [`step`](Self::step).
pub trait SocialEnvironment {
    /// Static description of the environment (agents, states, variant)
    fn descriptor(&self) -> &EnvironmentDescriptor;

    /// Current realized world state
    fn true_state(&self) -> StateId;

    /// Reset the environment and return each agent's initial observation
    fn initialize(&mut self) -> Result<BTreeMap<AgentId, Observation>>;

    /// Advance one tick given the joint action and action probabilities
    fn step(
        &mut self,
        actions: &JointActions,
        action_probs: &JointActionProbs,
    ) -> Result<StepOutcome>;

    /// Reseed the environment's random source
    fn reseed(&mut self, seed: u64);

    /// Reference convergence rates for contextualizing learning rates
    fn theoretical_bounds(&self) -> TheoreticalBounds {
        TheoreticalBounds::new()
    }
}

/// Environment variant, decided once when the environment is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvironmentKind {
    /// Discrete private signals and neighbors' discrete actions
    SocialLearning,

    /// Two-armed bandit with continuous background signal and allocations
    StrategicExperimentation(StrategicParams),
}

impl EnvironmentKind {
    /// Human-readable variant name
    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentKind::SocialLearning => "social learning",
            EnvironmentKind::StrategicExperimentation(_) => "strategic experimentation",
        }
    }

    /// Whether this is the strategic-experimentation variant
    pub fn is_strategic(&self) -> bool {
        matches!(self, EnvironmentKind::StrategicExperimentation(_))
    }

    /// Payoff parameters of the strategic-experimentation variant
    pub fn strategic_params(&self) -> Option<&StrategicParams> {
        match self {
            EnvironmentKind::StrategicExperimentation(params) => Some(params),
            EnvironmentKind::SocialLearning => None,
        }
    }
}

/// Payoff structure of a strategic-experimentation environment
///
/// Per-state vectors are indexed by [`StateId`]; state 0 is the bad state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicParams {
    /// Known flow payoff of the safe arm
    pub safe_payoff: f64,

    /// Drift of the risky arm per state
    pub drift_rates: Vec<f64>,

    /// Poisson jump intensity of the risky arm per state
    pub jump_rates: Vec<f64>,

    /// Jump size of the risky arm per state
    pub jump_sizes: Vec<f64>,

    /// Informativeness of the public background signal
    pub background_informativeness: f64,

    /// Length of one discrete step in continuous time
    pub time_step: f64,
}

impl StrategicParams {
    /// Expected flow payoff of the risky arm in `state`
    pub fn risky_payoff(&self, state: StateId) -> f64 {
        let drift = self.drift_rates.get(state).copied().unwrap_or(0.0);
        let rate = self.jump_rates.get(state).copied().unwrap_or(0.0);
        let size = self.jump_sizes.get(state).copied().unwrap_or(0.0);
        drift + rate * size
    }
}

/// Static description of an environment instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    /// Number of agents
    pub num_agents: usize,

    /// Number of possible world states
    pub num_states: usize,

    /// Environment variant
    pub kind: EnvironmentKind,
}

/// Action taken by one agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    /// Index of a discrete action
    Discrete(usize),

    /// Allocation to the risky arm in [0, 1]
    Continuous(f64),
}

impl Action {
    /// Numeric value of the action (index or allocation)
    pub fn value(&self) -> f64 {
        match *self {
            Action::Discrete(index) => index as f64,
            Action::Continuous(allocation) => allocation,
        }
    }

    /// Discrete index, if this is a discrete action
    pub fn index(&self) -> Option<usize> {
        match *self {
            Action::Discrete(index) => Some(index),
            Action::Continuous(_) => None,
        }
    }
}

/// Raw per-agent observation emitted by an environment
///
/// Exactly one variant is produced by a given environment instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    /// Social-learning observation
    Social {
        /// Private categorical signal
        signal: StateId,
        /// Neighbors' previous discrete actions
        neighbor_actions: BTreeMap<AgentId, usize>,
    },

    /// Strategic-experimentation observation
    Strategic {
        /// Cumulative background signal
        background_signal: f64,
        /// Background signal increment over the last step
        background_increment: Option<f64>,
        /// Neighbors' previous allocations to the risky arm
        neighbor_allocations: Option<BTreeMap<AgentId, f64>>,
    },
}

/// Reward as emitted by an environment: bare scalar or structured mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawReward {
    /// Scalar reward
    Scalar(f64),

    /// Structured reward carrying a `total` entry plus components
    Structured(BTreeMap<String, f64>),
}

impl From<f64> for RawReward {
    fn from(value: f64) -> Self {
        RawReward::Scalar(value)
    }
}

impl RawReward {
    /// Normalize into the canonical [`Reward`]
    pub fn normalize(&self, agent_id: AgentId) -> Result<Reward, SimulationError> {
        match self {
            RawReward::Scalar(total) => Ok(Reward { total: *total, components: BTreeMap::new() }),
            RawReward::Structured(fields) => {
                let total = *fields
                    .get("total")
                    .ok_or(SimulationError::MissingRewardTotal { agent_id })?;
                let components = fields
                    .iter()
                    .filter(|(name, _)| name.as_str() != "total")
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                Ok(Reward { total, components })
            }
        }
    }
}

/// Canonical reward used everywhere inside the crate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reward {
    /// Total reward
    pub total: f64,

    /// Named components (empty for scalar rewards)
    pub components: BTreeMap<String, f64>,
}

/// Normalize every agent's raw reward at the environment boundary
pub fn normalize_rewards(
    rewards: &BTreeMap<AgentId, RawReward>,
) -> Result<BTreeMap<AgentId, Reward>, SimulationError> {
    rewards.iter().map(|(&id, raw)| Ok((id, raw.normalize(id)?))).collect()
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Next observation per agent
    pub observations: BTreeMap<AgentId, Observation>,

    /// Reward per agent
    pub rewards: BTreeMap<AgentId, RawReward>,

    /// Whether the episode ended
    pub done: bool,

    /// Step-level information
    pub info: StepInfo,
}

/// Step-level information reported by the environment and enriched by the
/// simulation loop before it reaches the metrics tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Realized world state at this step
    pub true_state: Option<StateId>,

    /// Allocation to the risky arm per agent
    pub allocations: Option<BTreeMap<AgentId, f64>>,

    /// Markov-perfect-equilibrium reference allocations
    pub mpe_allocations: Option<BTreeMap<AgentId, f64>>,

    /// Scalar belief that the state is good, per agent
    pub agent_beliefs: Option<BTreeMap<AgentId, f64>>,

    /// Deterministic policy allocation per agent (continuous actions)
    pub policy_means: Option<BTreeMap<AgentId, f64>>,

    /// Policy standard deviation per agent (continuous actions)
    pub policy_stds: Option<BTreeMap<AgentId, f64>>,

    /// Environment parameters snapshot (training, strategic variant)
    pub env_params: Option<StrategicParams>,
}

/// With probability `probability`, move to a different uniformly chosen state
pub(crate) fn maybe_change_state(
    rng: &mut impl Rng,
    state: StateId,
    num_states: usize,
    probability: f64,
) -> StateId {
    if num_states < 2 || probability <= 0.0 || !rng.gen_bool(probability.min(1.0)) {
        return state;
    }
    let offset = rng.gen_range(1..num_states);
    (state + offset) % num_states
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_state_change_never_stays_when_certain() {
        let mut rng = StdRng::seed_from_u64(0);
        for state in 0..3 {
            assert_ne!(maybe_change_state(&mut rng, state, 3, 1.0), state);
            assert_eq!(maybe_change_state(&mut rng, state, 3, 0.0), state);
        }
    }

    #[test]
    fn test_scalar_and_structured_rewards_agree() {
        let scalar: RawReward = serde_json::from_str("1.5").unwrap();
        let structured: RawReward = serde_json::from_str(r#"{"total": 1.5}"#).unwrap();

        assert_eq!(scalar.normalize(0).unwrap().total, 1.5);
        assert_eq!(structured.normalize(0).unwrap().total, 1.5);
    }

    #[test]
    fn test_structured_reward_keeps_components() {
        let mut fields = BTreeMap::new();
        fields.insert("total".to_string(), 2.0);
        fields.insert("risky".to_string(), 1.25);
        let reward = RawReward::Structured(fields).normalize(3).unwrap();

        assert_eq!(reward.total, 2.0);
        assert_eq!(reward.components.len(), 1);
        assert_eq!(reward.components["risky"], 1.25);
    }

    #[test]
    fn test_structured_reward_without_total_is_rejected() {
        let mut fields = BTreeMap::new();
        fields.insert("safe".to_string(), 0.5);
        let err = RawReward::Structured(fields).normalize(2).unwrap_err();

        assert!(matches!(err, SimulationError::MissingRewardTotal { agent_id: 2 }));
    }

    #[test]
    fn test_risky_payoff() {
        let params = StrategicParams {
            safe_payoff: 0.5,
            drift_rates: vec![0.0, 1.0],
            jump_rates: vec![0.0, 0.1],
            jump_sizes: vec![1.0, 2.0],
            background_informativeness: 0.001,
            time_step: 1.0,
        };

        assert_eq!(params.risky_payoff(0), 0.0);
        assert!((params.risky_payoff(1) - 1.2).abs() < 1e-12);
        assert_eq!(params.risky_payoff(5), 0.0);
    }
}
