//! Strategic experimentation (Keller–Rady two-armed bandit)
//!
//! Each agent splits a unit resource between a safe arm with known flow
//! payoff and a risky arm whose payoff depends on the hidden state. Time is
//! discretized with step `dt`; per step the risky arm pays
//!
//! ```text
//! drift[s]·dt + σ·√dt·ε + jump_size[s]·Bernoulli(jump_rate[s]·dt)
//! ```
//!
//! A public background signal moves by
//! `background_informativeness · risky_payoff(s) · dt + √dt·ε` every step.
//! Agents see the signal, its increment, and their neighbors' previous
//! allocations. Rewards are structured as `{total, safe, risky}`.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use super::{
    AgentId, EnvironmentDescriptor, EnvironmentKind, JointActionProbs, JointActions, Observation,
    RawReward, SocialEnvironment, StateId, StepInfo, StepOutcome, StrategicParams,
    TheoreticalBounds, maybe_change_state,
};
use crate::error::SimulationError;

/// Parameters of a [`StrategicExperimentationEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicExperimentationConfig {
    /// Number of agents
    pub num_agents: usize,

    /// Payoff structure; the number of states is the length of `drift_rates`
    pub params: StrategicParams,

    /// Volatility of the risky arm's Brownian component
    pub diffusion_sigma: f64,

    /// Steps per episode
    pub horizon: usize,

    /// Per-step probability of a true-state change
    pub state_change_probability: f64,

    /// Initial random seed
    pub seed: u64,
}

impl Default for StrategicExperimentationConfig {
    fn default() -> Self {
        Self {
            num_agents: 2,
            params: StrategicParams {
                safe_payoff: 0.5,
                drift_rates: vec![0.0, 1.0],
                jump_rates: vec![0.0, 0.1],
                jump_sizes: vec![1.0, 1.0],
                background_informativeness: 0.001,
                time_step: 1.0,
            },
            diffusion_sigma: 0.1,
            horizon: 100,
            state_change_probability: 0.0,
            seed: 0,
        }
    }
}

/// Keller–Rady strategic experimentation environment
#[derive(Debug)]
pub struct StrategicExperimentationEnv {
    config: StrategicExperimentationConfig,
    descriptor: EnvironmentDescriptor,
    true_state: StateId,
    background_signal: f64,
    steps: usize,
    rng: StdRng,
}

impl StrategicExperimentationEnv {
    /// Create an environment from its configuration
    pub fn new(config: StrategicExperimentationConfig) -> Result<Self> {
        let params = &config.params;
        let num_states = params.drift_rates.len();
        if num_states == 0 {
            return Err(anyhow!("drift_rates must not be empty"));
        }
        if params.jump_rates.len() != num_states || params.jump_sizes.len() != num_states {
            return Err(anyhow!("drift_rates, jump_rates and jump_sizes must have equal length"));
        }
        if params.time_step <= 0.0 {
            return Err(anyhow!("time_step must be positive"));
        }

        let descriptor = EnvironmentDescriptor {
            num_agents: config.num_agents,
            num_states,
            kind: EnvironmentKind::StrategicExperimentation(params.clone()),
        };
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, descriptor, true_state: 0, background_signal: 0.0, steps: 0, rng })
    }

    /// Payoff structure
    pub fn params(&self) -> &StrategicParams {
        &self.config.params
    }

    /// Cumulative background signal
    pub fn background_signal(&self) -> f64 {
        self.background_signal
    }

    fn normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    fn risky_draw(&mut self) -> f64 {
        let params = &self.config.params;
        let state = self.true_state;
        let dt = params.time_step;
        let drift = params.drift_rates[state] * dt;
        let jump_probability = (params.jump_rates[state] * dt).clamp(0.0, 1.0);
        let jump_size = params.jump_sizes[state];
        let sigma = self.config.diffusion_sigma;

        let noise = sigma * dt.sqrt() * self.normal();
        let jump = if self.rng.gen_bool(jump_probability) { jump_size } else { 0.0 };
        drift + noise + jump
    }

    fn observations(
        &self,
        increment: f64,
        allocations: Option<&BTreeMap<AgentId, f64>>,
    ) -> BTreeMap<AgentId, Observation> {
        (0..self.descriptor.num_agents)
            .map(|agent_id| {
                let neighbor_allocations = allocations.map(|all| {
                    all.iter().filter(|(&id, _)| id != agent_id).map(|(&id, &a)| (id, a)).collect()
                });
                let observation = Observation::Strategic {
                    background_signal: self.background_signal,
                    background_increment: Some(increment),
                    neighbor_allocations,
                };
                (agent_id, observation)
            })
            .collect()
    }
}

impl SocialEnvironment for StrategicExperimentationEnv {
    fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    fn true_state(&self) -> StateId {
        self.true_state
    }

    fn initialize(&mut self) -> Result<BTreeMap<AgentId, Observation>> {
        self.steps = 0;
        self.background_signal = 0.0;
        self.true_state = self.rng.gen_range(0..self.descriptor.num_states);
        Ok(self.observations(0.0, None))
    }

    fn step(&mut self, actions: &JointActions, _action_probs: &JointActionProbs) -> Result<StepOutcome> {
        let dt = self.config.params.time_step;
        let safe_flow = self.config.params.safe_payoff * dt;

        let mut allocations = BTreeMap::new();
        let mut rewards = BTreeMap::new();
        for agent_id in 0..self.descriptor.num_agents {
            let action = actions
                .get(&agent_id)
                .ok_or(SimulationError::MissingAgentData { agent_id, what: "action" })?;
            let allocation = action.value().clamp(0.0, 1.0);
            let risky = self.risky_draw();

            let safe_part = (1.0 - allocation) * safe_flow;
            let risky_part = allocation * risky;
            let reward: BTreeMap<String, f64> = [
                ("total".to_string(), safe_part + risky_part),
                ("safe".to_string(), safe_part),
                ("risky".to_string(), risky_part),
            ]
            .into();

            allocations.insert(agent_id, allocation);
            rewards.insert(agent_id, RawReward::Structured(reward));
        }

        let info = StepInfo {
            true_state: Some(self.true_state),
            allocations: Some(allocations.clone()),
            ..StepInfo::default()
        };

        let params = &self.config.params;
        let mean = params.background_informativeness * params.risky_payoff(self.true_state) * dt;
        let increment = mean + dt.sqrt() * self.normal();
        self.background_signal += increment;

        self.steps += 1;
        self.true_state = maybe_change_state(
            &mut self.rng,
            self.true_state,
            self.descriptor.num_states,
            self.config.state_change_probability,
        );

        Ok(StepOutcome {
            observations: self.observations(increment, Some(&allocations)),
            rewards,
            done: self.steps >= self.config.horizon,
            info,
        })
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn theoretical_bounds(&self) -> TheoreticalBounds {
        let params = &self.config.params;
        let good = params.drift_rates.len() - 1;

        let mut bounds = TheoreticalBounds::new();
        bounds.insert("safe_payoff".to_string(), params.safe_payoff);
        bounds.insert("risky_payoff_good".to_string(), params.risky_payoff(good));
        bounds.insert("risky_payoff_bad".to_string(), params.risky_payoff(0));
        bounds.insert("background_informativeness".to_string(), params.background_informativeness);
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Action, normalize_rewards};

    fn env() -> StrategicExperimentationEnv {
        StrategicExperimentationEnv::new(StrategicExperimentationConfig {
            num_agents: 3,
            horizon: 4,
            ..StrategicExperimentationConfig::default()
        })
        .unwrap()
    }

    fn allocate(allocation: f64) -> JointActions {
        (0..3).map(|id| (id, Action::Continuous(allocation))).collect()
    }

    #[test]
    fn test_initial_observation_carries_increment() {
        let mut env = env();
        let observations = env.initialize().unwrap();
        for observation in observations.values() {
            match observation {
                Observation::Strategic { background_increment, neighbor_allocations, .. } => {
                    assert_eq!(*background_increment, Some(0.0));
                    assert!(neighbor_allocations.is_none());
                }
                _ => panic!("expected strategic observation"),
            }
        }
    }

    #[test]
    fn test_safe_allocation_pays_safe_flow() {
        let mut env = env();
        env.initialize().unwrap();
        let outcome = env.step(&allocate(0.0), &JointActionProbs::new()).unwrap();
        let rewards = normalize_rewards(&outcome.rewards).unwrap();

        for reward in rewards.values() {
            assert!((reward.total - 0.5).abs() < 1e-12);
            assert_eq!(reward.components["risky"], 0.0);
        }
        assert_eq!(outcome.info.allocations.unwrap()[&1], 0.0);

        match &outcome.observations[&0] {
            Observation::Strategic { neighbor_allocations: Some(neighbors), background_increment, .. } => {
                assert_eq!(neighbors.len(), 2);
                assert!(!neighbors.contains_key(&0));
                assert!(background_increment.is_some());
            }
            _ => panic!("expected neighbor allocations"),
        }
    }

    #[test]
    fn test_background_signal_accumulates_increments() {
        let mut env = env();
        env.initialize().unwrap();
        let mut sum = 0.0;
        let mut done = false;
        for _ in 0..4 {
            let outcome = env.step(&allocate(0.5), &JointActionProbs::new()).unwrap();
            if let Observation::Strategic { background_increment: Some(inc), .. } = outcome.observations[&0] {
                sum += inc;
            }
            done = outcome.done;
        }
        assert!(done);
        assert!((env.background_signal() - sum).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_mismatched_rates() {
        let mut config = StrategicExperimentationConfig::default();
        config.params.jump_rates = vec![0.1];
        assert!(StrategicExperimentationEnv::new(config).is_err());
    }

    #[test]
    fn test_theoretical_bounds() {
        let bounds = env().theoretical_bounds();
        assert_eq!(bounds["safe_payoff"], 0.5);
        assert!((bounds["risky_payoff_good"] - 1.1).abs() < 1e-12);
        assert_eq!(bounds["risky_payoff_bad"], 0.0);
        assert_eq!(bounds["background_informativeness"], 0.001);
    }
}
