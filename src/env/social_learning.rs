//! Social learning with private signals
//!
//! Agents on a complete network repeatedly guess a hidden binary (or
//! categorical) state. Each step every agent receives a private signal that
//! equals the true state with probability `q` and observes the actions its
//! neighbors took on the previous step. Guessing the state pays 1.
//!
//! # Theoretical bounds
//!
//! For two states the per-step KL divergence between the signal
//! distributions is `(2q - 1) ln(q / (1 - q))`. An isolated agent cannot
//! learn faster than this (`autarky_rate`); a population that pools every
//! signal learns at most `N` times faster (`coordination_rate`).

use std::collections::BTreeMap;

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::{
    AgentId, EnvironmentDescriptor, EnvironmentKind, JointActionProbs, JointActions, Observation,
    RawReward, SocialEnvironment, StateId, StepInfo, StepOutcome, TheoreticalBounds,
    maybe_change_state,
};
use crate::error::SimulationError;

/// Accuracy values are kept this far from 0 and 1 when computing bounds
const ACCURACY_EPSILON: f64 = 1e-10;

/// Parameters of a [`SocialLearningEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialLearningConfig {
    /// Number of agents
    pub num_agents: usize,

    /// Number of world states
    pub num_states: usize,

    /// Probability that a private signal equals the true state
    pub signal_accuracy: f64,

    /// Steps per episode
    pub horizon: usize,

    /// Per-step probability of a true-state change
    pub state_change_probability: f64,

    /// Initial random seed
    pub seed: u64,
}

impl Default for SocialLearningConfig {
    fn default() -> Self {
        Self {
            num_agents: 2,
            num_states: 2,
            signal_accuracy: 0.75,
            horizon: 100,
            state_change_probability: 0.0,
            seed: 0,
        }
    }
}

/// Private-signal social learning environment
#[derive(Debug)]
pub struct SocialLearningEnv {
    config: SocialLearningConfig,
    descriptor: EnvironmentDescriptor,
    true_state: StateId,
    steps: usize,
    rng: StdRng,
}

impl SocialLearningEnv {
    /// Create an environment from its configuration
    pub fn new(config: SocialLearningConfig) -> Self {
        let descriptor = EnvironmentDescriptor {
            num_agents: config.num_agents,
            num_states: config.num_states.max(1),
            kind: EnvironmentKind::SocialLearning,
        };
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, descriptor, true_state: 0, steps: 0, rng }
    }

    /// Environment configuration
    pub fn config(&self) -> &SocialLearningConfig {
        &self.config
    }

    /// Steps taken in the current episode
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn draw_signal(&mut self) -> StateId {
        let num_states = self.descriptor.num_states;
        if num_states < 2 || self.rng.gen_bool(self.config.signal_accuracy.clamp(0.0, 1.0)) {
            return self.true_state;
        }
        let offset = self.rng.gen_range(1..num_states);
        (self.true_state + offset) % num_states
    }

    fn observations(&mut self, previous: &BTreeMap<AgentId, usize>) -> BTreeMap<AgentId, Observation> {
        (0..self.descriptor.num_agents)
            .map(|agent_id| {
                let signal = self.draw_signal();
                let neighbor_actions =
                    previous.iter().filter(|(&id, _)| id != agent_id).map(|(&id, &a)| (id, a)).collect();
                (agent_id, Observation::Social { signal, neighbor_actions })
            })
            .collect()
    }
}

impl SocialEnvironment for SocialLearningEnv {
    fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    fn true_state(&self) -> StateId {
        self.true_state
    }

    fn initialize(&mut self) -> Result<BTreeMap<AgentId, Observation>> {
        self.steps = 0;
        self.true_state = self.rng.gen_range(0..self.descriptor.num_states);
        Ok(self.observations(&BTreeMap::new()))
    }

    fn step(&mut self, actions: &JointActions, _action_probs: &JointActionProbs) -> Result<StepOutcome> {
        let mut chosen = BTreeMap::new();
        let mut rewards = BTreeMap::new();
        for agent_id in 0..self.descriptor.num_agents {
            let action = actions
                .get(&agent_id)
                .ok_or(SimulationError::MissingAgentData { agent_id, what: "action" })?;
            let index = action.index().unwrap_or_else(|| action.value().round().max(0.0) as usize);
            let reward = if index == self.true_state { 1.0 } else { 0.0 };
            chosen.insert(agent_id, index);
            rewards.insert(agent_id, RawReward::from(reward));
        }

        let info = StepInfo { true_state: Some(self.true_state), ..StepInfo::default() };

        self.steps += 1;
        self.true_state = maybe_change_state(
            &mut self.rng,
            self.true_state,
            self.descriptor.num_states,
            self.config.state_change_probability,
        );
        let observations = self.observations(&chosen);

        Ok(StepOutcome { observations, rewards, done: self.steps >= self.config.horizon, info })
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn theoretical_bounds(&self) -> TheoreticalBounds {
        let q = self.config.signal_accuracy.clamp(ACCURACY_EPSILON, 1.0 - ACCURACY_EPSILON);
        let autarky_rate = (2.0 * q - 1.0) * (q / (1.0 - q)).ln();

        let mut bounds = TheoreticalBounds::new();
        bounds.insert("autarky_rate".to_string(), autarky_rate);
        bounds.insert("coordination_rate".to_string(), self.descriptor.num_agents as f64 * autarky_rate);
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Action;

    fn env(accuracy: f64) -> SocialLearningEnv {
        SocialLearningEnv::new(SocialLearningConfig {
            num_agents: 3,
            signal_accuracy: accuracy,
            horizon: 5,
            ..SocialLearningConfig::default()
        })
    }

    fn guess(state: StateId) -> JointActions {
        (0..3).map(|id| (id, Action::Discrete(state))).collect()
    }

    #[test]
    fn test_initial_observations_have_no_neighbors() {
        let mut env = env(0.75);
        let observations = env.initialize().unwrap();
        assert_eq!(observations.len(), 3);
        for observation in observations.values() {
            match observation {
                Observation::Social { neighbor_actions, .. } => assert!(neighbor_actions.is_empty()),
                _ => panic!("expected social observation"),
            }
        }
    }

    #[test]
    fn test_perfect_signals_and_rewards() {
        let mut env = env(1.0);
        let observations = env.initialize().unwrap();
        let state = env.true_state();
        for observation in observations.values() {
            assert!(matches!(observation, Observation::Social { signal, .. } if *signal == state));
        }

        let outcome = env.step(&guess(state), &JointActionProbs::new()).unwrap();
        assert_eq!(outcome.info.true_state, Some(state));
        for reward in outcome.rewards.values() {
            assert_eq!(reward, &RawReward::Scalar(1.0));
        }

        // Neighbors exclude the observing agent
        match &outcome.observations[&1] {
            Observation::Social { neighbor_actions, .. } => {
                assert_eq!(neighbor_actions.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
            }
            _ => panic!("expected social observation"),
        }
    }

    #[test]
    fn test_done_at_horizon() {
        let mut env = env(0.75);
        env.initialize().unwrap();
        let mut done = false;
        for _ in 0..5 {
            done = env.step(&guess(0), &JointActionProbs::new()).unwrap().done;
        }
        assert!(done);
        assert_eq!(env.steps(), 5);
    }

    #[test]
    fn test_missing_action_is_rejected() {
        let mut env = env(0.75);
        env.initialize().unwrap();
        let mut actions = guess(0);
        actions.remove(&2);

        let err = env.step(&actions, &JointActionProbs::new()).unwrap_err();
        let err = err.downcast_ref::<SimulationError>().unwrap();
        assert!(matches!(err, SimulationError::MissingAgentData { agent_id: 2, .. }));
    }

    #[test]
    fn test_theoretical_bounds() {
        let bounds = env(0.75).theoretical_bounds();
        let expected = 0.5 * 3.0f64.ln();
        assert!((bounds["autarky_rate"] - expected).abs() < 1e-12);
        assert!((bounds["coordination_rate"] - 3.0 * expected).abs() < 1e-12);
    }
}
