//! Closed-form reference agent
//!
//! [`BayesianAgent`] keeps an exact Bayesian posterior over world states and
//! learns a small set of parameters on top of it:
//!
//! - belief offsets `c`, added to the log-posterior before normalization and
//!   trained to predict the agent's own signals
//! - a linear policy over `[belief; latent; 1]`, softmax for discrete actions
//!   and sigmoid for a continuous allocation
//!
//! The latent state is an exponential moving average of the encoded
//! neighbor actions plus the realized reward. Both parameter groups carry a
//! Synaptic Intelligence tracker when continual learning is enabled.

use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use rand::{Rng, SeedableRng, distributions::WeightedIndex, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{
    ActionChoice, Agent, LossDiagnostics,
    continual::{ContinualLearning, SynapticIntelligence},
};
use crate::{
    buffer::{Transition, TransitionBatch},
    env::{Action, AgentId, EnvironmentDescriptor, StrategicParams},
    error::SimulationError,
    metrics::EpisodeMetrics,
    utils::{ObservationEncoder, RunningMeanStd},
};

/// Floor for densities before taking logs
const MIN_DENSITY: f64 = 1e-300;

/// Floor for latent variances before taking logs
const MIN_VARIANCE: f64 = 1e-8;

/// Hyperparameters of a [`BayesianAgent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianAgentConfig {
    /// Probability that a private signal equals the true state
    pub signal_accuracy: f64,

    /// Emit a continuous allocation instead of a discrete action
    pub continuous_actions: bool,

    /// Step size for both parameter groups
    pub learning_rate: f64,

    /// Discount for the TD reward baseline
    pub discount_factor: f64,

    /// Standard deviation of the allocation exploration noise
    pub exploration_std: f64,

    /// Decay of the latent moving average
    pub latent_decay: f64,

    /// Enable Synaptic Intelligence on both parameter groups
    pub use_si: bool,

    /// Synaptic Intelligence penalty strength
    pub si_importance: f64,

    /// Synaptic Intelligence damping
    pub si_damping: f64,
}

impl Default for BayesianAgentConfig {
    fn default() -> Self {
        Self {
            signal_accuracy: 0.75,
            continuous_actions: false,
            learning_rate: 1e-2,
            discount_factor: 0.9,
            exploration_std: 0.1,
            latent_decay: 0.9,
            use_si: false,
            si_importance: 100.0,
            si_damping: 0.1,
        }
    }
}

impl BayesianAgentConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.signal_accuracy) {
            return Err(anyhow!("signal_accuracy must be in [0, 1]"));
        }
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(anyhow!("discount_factor must be in [0, 1]"));
        }
        if self.exploration_std < 0.0 {
            return Err(anyhow!("exploration_std must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.latent_decay) {
            return Err(anyhow!("latent_decay must be in [0, 1)"));
        }
        if self.si_importance < 0.0 || self.si_damping < 0.0 {
            return Err(anyhow!("SI parameters must be non-negative"));
        }
        Ok(())
    }

    /// Set signal accuracy
    pub fn signal_accuracy(mut self, accuracy: f64) -> Self {
        self.signal_accuracy = accuracy;
        self
    }

    /// Set continuous action mode
    pub fn continuous_actions(mut self, continuous: bool) -> Self {
        self.continuous_actions = continuous;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set discount factor
    pub fn discount_factor(mut self, gamma: f64) -> Self {
        self.discount_factor = gamma;
        self
    }

    /// Set exploration noise
    pub fn exploration_std(mut self, std: f64) -> Self {
        self.exploration_std = std;
        self
    }

    /// Set latent moving-average decay
    pub fn latent_decay(mut self, decay: f64) -> Self {
        self.latent_decay = decay;
        self
    }

    /// Enable Synaptic Intelligence with the given strength and damping
    pub fn synaptic_intelligence(mut self, importance: f64, damping: f64) -> Self {
        self.use_si = true;
        self.si_importance = importance;
        self.si_damping = damping;
        self
    }
}

/// Learnable state persisted by `save`/`load`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentWeights {
    agent_id: AgentId,
    belief_offsets: Vec<f64>,
    policy_weights: Vec<f64>,
    value_estimate: f64,
    continual: Option<ContinualLearning>,
}

/// Reference agent with an exact posterior and a linear policy
#[derive(Debug, Clone)]
pub struct BayesianAgent {
    id: AgentId,
    config: BayesianAgentConfig,
    num_states: usize,
    num_actions: usize,
    latent_dim: usize,
    strategic: Option<StrategicParams>,

    log_posterior: Vec<f64>,
    belief_offsets: Vec<f64>,
    belief: Vec<f64>,

    latent: Vec<f64>,
    latent_stats: RunningMeanStd,

    /// Row-major `[outputs, input_dim]`
    policy_weights: Vec<f64>,
    value_estimate: f64,
    last_logits: Vec<f64>,

    continual: Option<ContinualLearning>,
    training: bool,
    rng: StdRng,
}

impl BayesianAgent {
    /// Build an agent for the environment described by `descriptor`
    pub fn new(id: AgentId, descriptor: &EnvironmentDescriptor, config: BayesianAgentConfig) -> Self {
        let num_states = descriptor.num_states.max(1);
        let strategic = descriptor.kind.strategic_params().cloned();
        let num_actions = if strategic.is_some() { 2 } else { num_states };
        let latent_dim = ObservationEncoder::new(descriptor).neighbor_dim() + 1;
        let outputs = if config.continuous_actions { 1 } else { num_actions };
        let input_dim = num_states + latent_dim + 1;

        // Start from following the belief
        let mut policy_weights = vec![0.0; outputs * input_dim];
        if config.continuous_actions {
            if num_states >= 2 {
                policy_weights[1] = 2.0;
                policy_weights[input_dim - 1] = -1.0;
            }
        } else {
            for k in 0..num_actions.min(num_states) {
                policy_weights[k * input_dim + k] = 2.0;
            }
        }

        let belief_offsets = vec![0.0; num_states];
        let continual = config.use_si.then(|| {
            ContinualLearning::new(
                SynapticIntelligence::new(&belief_offsets, config.si_importance, config.si_damping),
                SynapticIntelligence::new(&policy_weights, config.si_importance, config.si_damping),
            )
        });

        let mut agent = Self {
            id,
            config,
            num_states,
            num_actions,
            latent_dim,
            strategic,
            log_posterior: vec![0.0; num_states],
            belief_offsets,
            belief: vec![1.0 / num_states as f64; num_states],
            latent: vec![0.0; latent_dim],
            latent_stats: RunningMeanStd::new(latent_dim),
            policy_weights,
            value_estimate: 0.0,
            last_logits: Vec::new(),
            continual,
            training: true,
            rng: StdRng::seed_from_u64(id as u64),
        };
        agent.refresh_belief();
        agent
    }

    /// Agent configuration
    pub fn config(&self) -> &BayesianAgentConfig {
        &self.config
    }

    /// Learned belief offsets
    pub fn belief_offsets(&self) -> &[f64] {
        &self.belief_offsets
    }

    /// Flattened policy weights
    pub fn policy_weights(&self) -> &[f64] {
        &self.policy_weights
    }

    fn input_dim(&self) -> usize {
        self.num_states + self.latent_dim + 1
    }

    fn outputs(&self) -> usize {
        if self.config.continuous_actions { 1 } else { self.num_actions }
    }

    fn refresh_belief(&mut self) {
        let shifted: Vec<f64> =
            self.log_posterior.iter().zip(&self.belief_offsets).map(|(l, c)| l + c).collect();
        self.belief = softmax(&shifted);
    }

    /// Likelihood of an encoded signal given `state`
    ///
    /// `None` when the signal carries no information (no category set, or
    /// no payoff structure known for an increment).
    fn signal_likelihood(&self, signal: &[f64], state: usize) -> Option<f64> {
        match &self.strategic {
            Some(params) => {
                let increment = *signal.first()?;
                let dt = params.time_step.max(MIN_VARIANCE);
                let mean = params.background_informativeness * params.risky_payoff(state) * dt;
                Some(gaussian_density(increment, mean, dt))
            }
            None => {
                let observed = signal.iter().position(|&v| v > 0.5)?;
                let q = self.config.signal_accuracy;
                if observed == state {
                    Some(q)
                } else {
                    Some((1.0 - q) / (self.num_states - 1).max(1) as f64)
                }
            }
        }
    }

    fn policy_input(&self, belief: &[f64], latent: &[f64]) -> Vec<f64> {
        let mut input = Vec::with_capacity(self.input_dim());
        input.extend((0..self.num_states).map(|k| belief.get(k).copied().unwrap_or(0.0)));
        input.extend((0..self.latent_dim).map(|k| latent.get(k).copied().unwrap_or(0.0)));
        input.push(1.0);
        input
    }

    fn logits(&self, input: &[f64]) -> Vec<f64> {
        self.policy_weights
            .chunks(self.input_dim())
            .map(|row| row.iter().zip(input).map(|(w, x)| w * x).sum())
            .collect()
    }

    /// Allocation the current belief makes myopically optimal
    fn myopic_allocation(&self, params: &StrategicParams, belief: &[f64]) -> f64 {
        let expected: f64 =
            belief.iter().enumerate().map(|(state, b)| b * params.risky_payoff(state)).sum();
        if expected > params.safe_payoff { 1.0 } else { 0.0 }
    }

    fn belief_gradient(&self, transition: &Transition) -> Option<(f64, Vec<f64>)> {
        let belief = &transition.belief;
        let likelihoods: Vec<f64> = (0..self.num_states)
            .map(|k| self.signal_likelihood(&transition.signal, k))
            .collect::<Option<_>>()?;
        let predicted: f64 = belief.iter().zip(&likelihoods).map(|(b, l)| b * l).sum();
        if predicted <= 0.0 || belief.len() != self.num_states {
            return None;
        }

        let gradient = belief
            .iter()
            .zip(&likelihoods)
            .map(|(b, l)| -(b * (l - predicted)) / predicted)
            .collect();
        Some((-predicted.max(MIN_DENSITY).ln(), gradient))
    }

    fn check_belief(&self) -> Result<(), SimulationError> {
        if let Some(bad) = self.belief.iter().find(|b| !b.is_finite()) {
            return Err(SimulationError::InvalidBeliefDistribution {
                agent_id: self.id,
                detail: format!("non-finite entry {bad} in {:?}", self.belief),
            });
        }
        Ok(())
    }
}

impl Agent for BayesianAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn select_action(&mut self, metrics: &mut EpisodeMetrics) -> Result<ActionChoice> {
        let input = self.policy_input(&self.belief, &self.latent);
        let logits = self.logits(&input);
        self.last_logits.clone_from(&logits);

        if self.config.continuous_actions {
            let mean = sigmoid(logits[0]);
            let allocation = if self.training {
                let noise_dist = Normal::new(0.0, self.config.exploration_std)
                    .map_err(|e| anyhow!("invalid exploration noise: {e}"))?;
                let noise = noise_dist.sample(&mut self.rng);
                metrics.push_agent("exploration_noise", self.id, noise);
                (mean + noise).clamp(0.0, 1.0)
            } else {
                mean
            };
            return Ok(ActionChoice {
                action: Action::Continuous(allocation),
                probs: vec![1.0 - allocation, allocation],
            });
        }

        let probs = softmax(&logits);
        let dist = WeightedIndex::new(&probs).map_err(|e| anyhow!("invalid action distribution: {e}"))?;
        let index = self.rng.sample(dist);
        Ok(ActionChoice { action: Action::Discrete(index), probs })
    }

    fn observe(&mut self, signal: &[f64], _neighbor_actions: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        for state in 0..self.num_states {
            if let Some(likelihood) = self.signal_likelihood(signal, state) {
                self.log_posterior[state] += likelihood.max(MIN_DENSITY).ln();
            }
        }

        let max = self.log_posterior.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() {
            self.log_posterior.iter_mut().for_each(|l| *l -= max);
        }

        self.refresh_belief();
        self.check_belief()?;
        Ok((self.belief.clone(), self.belief.clone()))
    }

    fn infer_latent(
        &mut self,
        _signal: &[f64],
        neighbor_actions: &[f64],
        reward: f64,
        _next_signal: &[f64],
    ) -> Result<Vec<f64>> {
        let decay = self.config.latent_decay;
        let reward_slot = self.latent_dim - 1;
        for (latent, &x) in self.latent[..reward_slot].iter_mut().zip(neighbor_actions) {
            *latent = decay * *latent + (1.0 - decay) * x;
        }
        self.latent[reward_slot] = decay * self.latent[reward_slot] + (1.0 - decay) * reward;

        self.latent_stats.update(&self.latent);
        Ok(self.latent.clone())
    }

    fn update(&mut self, batch: &TransitionBatch) -> Result<LossDiagnostics> {
        if batch.is_empty() {
            return Ok(LossDiagnostics::default());
        }
        let n = batch.len() as f64;
        let input_dim = self.input_dim();
        let gamma = self.config.discount_factor;
        let lr = self.config.learning_rate;

        let mut belief_loss = 0.0;
        let mut belief_grad = vec![0.0; self.num_states];
        let mut policy_loss = 0.0;
        let mut policy_grad = vec![0.0; self.policy_weights.len()];
        let mut advantage_sum = 0.0;

        for transition in batch.iter() {
            if let Some((loss, grad)) = self.belief_gradient(transition) {
                belief_loss += loss;
                belief_grad.iter_mut().zip(grad).for_each(|(acc, g)| *acc += g);
            }

            let input = self.policy_input(&transition.belief, &transition.latent);
            let logits = self.logits(&input);
            let advantage = transition.reward + gamma * self.value_estimate - self.value_estimate;
            advantage_sum += advantage;

            if self.config.continuous_actions {
                let mean = sigmoid(logits[0]);
                let (target, weight) = match &self.strategic {
                    Some(params) => (self.myopic_allocation(params, &transition.belief), 1.0),
                    None => (transition.action, advantage.max(0.0)),
                };
                policy_loss += weight * (mean - target).powi(2);
                let scale = weight * 2.0 * (mean - target) * mean * (1.0 - mean);
                for (g, x) in policy_grad.iter_mut().zip(&input) {
                    *g += scale * x;
                }
            } else {
                let probs = softmax(&logits);
                let taken = (transition.action.round().max(0.0) as usize).min(self.num_actions - 1);
                policy_loss -= advantage * probs[taken].max(MIN_DENSITY).ln();
                for (j, p) in probs.iter().enumerate() {
                    let indicator = if j == taken { 1.0 } else { 0.0 };
                    let scale = -advantage * (indicator - p);
                    for (d, x) in input.iter().enumerate() {
                        policy_grad[j * input_dim + d] += scale * x;
                    }
                }
            }
        }

        belief_loss /= n;
        policy_loss /= n;
        belief_grad.iter_mut().for_each(|g| *g /= n);
        policy_grad.iter_mut().for_each(|g| *g /= n);
        self.value_estimate += lr * advantage_sum / n;

        let mut belief_si_penalty = 0.0;
        let mut policy_si_penalty = 0.0;
        if let Some(continual) = &self.continual {
            belief_si_penalty = continual.belief_si.penalty(&self.belief_offsets);
            policy_si_penalty = continual.policy_si.penalty(&self.policy_weights);
            let belief_pen = continual.belief_si.penalty_gradient(&self.belief_offsets);
            let policy_pen = continual.policy_si.penalty_gradient(&self.policy_weights);
            belief_grad.iter_mut().zip(belief_pen).for_each(|(g, p)| *g += p);
            policy_grad.iter_mut().zip(policy_pen).for_each(|(g, p)| *g += p);
        }

        for (w, g) in self.belief_offsets.iter_mut().zip(&belief_grad) {
            *w -= lr * g;
        }
        for (w, g) in self.policy_weights.iter_mut().zip(&policy_grad) {
            *w -= lr * g;
        }

        if let Some(continual) = &mut self.continual {
            continual.belief_si.record_step(&belief_grad, &self.belief_offsets);
            continual.policy_si.record_step(&policy_grad, &self.policy_weights);
        }
        self.refresh_belief();

        Ok(LossDiagnostics {
            belief_loss,
            policy_loss,
            belief_si_penalty,
            policy_si_penalty,
            total_loss: belief_loss + policy_loss + belief_si_penalty + policy_si_penalty,
        })
    }

    fn current_belief(&self) -> &[f64] {
        &self.belief
    }

    fn current_latent(&self) -> &[f64] {
        &self.latent
    }

    fn belief_distribution(&self) -> &[f64] {
        &self.belief
    }

    fn latent_distribution_params(&self) -> (Vec<f64>, Vec<f64>) {
        let logvar = self.latent_stats.variance().iter().map(|v| v.max(MIN_VARIANCE).ln()).collect();
        (self.latent_stats.mean().to_vec(), logvar)
    }

    fn deterministic_allocation(&self) -> Option<f64> {
        if !self.config.continuous_actions {
            return None;
        }
        let input = self.policy_input(&self.belief, &self.latent);
        self.logits(&input).first().map(|&z| sigmoid(z))
    }

    fn action_logits(&self) -> Option<&[f64]> {
        (!self.last_logits.is_empty()).then_some(self.last_logits.as_slice())
    }

    fn set_environment_parameters(&mut self, params: &StrategicParams) {
        self.strategic = Some(params.clone());
    }

    fn set_train_mode(&mut self) {
        self.training = true;
    }

    fn set_eval_mode(&mut self) {
        self.training = false;
    }

    fn reset_internal_state(&mut self) {
        self.log_posterior.iter_mut().for_each(|l| *l = 0.0);
        self.latent.iter_mut().for_each(|l| *l = 0.0);
        self.latent_stats.reset();
        self.last_logits.clear();
        self.refresh_belief();
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn continual(&self) -> Option<&ContinualLearning> {
        self.continual.as_ref()
    }

    fn continual_mut(&mut self) -> Option<&mut ContinualLearning> {
        self.continual.as_mut()
    }

    fn save(&self, path: &Path) -> Result<()> {
        let weights = AgentWeights {
            agent_id: self.id,
            belief_offsets: self.belief_offsets.clone(),
            policy_weights: self.policy_weights.clone(),
            value_estimate: self.value_estimate,
            continual: self.continual.clone(),
        };
        let json = serde_json::to_string_pretty(&weights)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let weights: AgentWeights = serde_json::from_str(&json)?;

        if weights.belief_offsets.len() != self.num_states {
            bail!(
                "agent {}: saved belief offsets have {} entries, expected {}",
                self.id,
                weights.belief_offsets.len(),
                self.num_states
            );
        }
        if weights.policy_weights.len() != self.outputs() * self.input_dim() {
            bail!(
                "agent {}: saved policy has {} weights, expected {}",
                self.id,
                weights.policy_weights.len(),
                self.outputs() * self.input_dim()
            );
        }

        self.belief_offsets = weights.belief_offsets;
        self.policy_weights = weights.policy_weights;
        self.value_estimate = weights.value_estimate;
        if weights.continual.is_some() {
            self.continual = weights.continual;
        }
        self.refresh_belief();
        tracing::info!("Agent {}: loaded weights from {}", self.id, path.display());
        Ok(())
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn gaussian_density(x: f64, mean: f64, variance: f64) -> f64 {
    let diff = x - mean;
    (-(diff * diff) / (2.0 * variance)).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::ReplayBuffer,
        env::EnvironmentKind,
        utils::encoding::one_hot,
    };

    fn social(num_agents: usize) -> EnvironmentDescriptor {
        EnvironmentDescriptor { num_agents, num_states: 2, kind: EnvironmentKind::SocialLearning }
    }

    fn strategic() -> EnvironmentDescriptor {
        let params = StrategicParams {
            safe_payoff: 0.5,
            drift_rates: vec![0.0, 1.0],
            jump_rates: vec![0.0, 0.1],
            jump_sizes: vec![1.0, 1.0],
            background_informativeness: 1.0,
            time_step: 1.0,
        };
        EnvironmentDescriptor {
            num_agents: 2,
            num_states: 2,
            kind: EnvironmentKind::StrategicExperimentation(params),
        }
    }

    #[test]
    fn test_belief_follows_repeated_signals() {
        let mut agent = BayesianAgent::new(0, &social(2), BayesianAgentConfig::default());
        let neighbors = vec![0.0; 4];

        for _ in 0..10 {
            agent.observe(&one_hot(1, 2), &neighbors).unwrap();
        }

        let belief = agent.belief_distribution();
        assert!(belief[1] > 0.99);
        assert!((belief.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        agent.reset_internal_state();
        assert_eq!(agent.belief_distribution(), &[0.5, 0.5]);
    }

    #[test]
    fn test_strategic_increments_move_belief() {
        let mut agent = BayesianAgent::new(0, &strategic(), BayesianAgentConfig::default());
        for _ in 0..20 {
            agent.observe(&[1.1], &[0.0, 0.0]).unwrap();
        }
        assert!(agent.belief_distribution()[1] > 0.9);
    }

    #[test]
    fn test_discrete_action_distribution() {
        let mut agent = BayesianAgent::new(1, &social(3), BayesianAgentConfig::default());
        let mut metrics = EpisodeMetrics::new();
        let choice = agent.select_action(&mut metrics).unwrap();

        assert_eq!(choice.probs.len(), 2);
        assert!((choice.probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(choice.action.index().is_some_and(|i| i < 2));
        assert!(agent.action_logits().is_some());
        assert!(agent.deterministic_allocation().is_none());
    }

    #[test]
    fn test_continuous_allocation_in_unit_interval() {
        let config = BayesianAgentConfig::default().continuous_actions(true).exploration_std(5.0);
        let mut agent = BayesianAgent::new(0, &strategic(), config);
        let mut metrics = EpisodeMetrics::new();

        for _ in 0..50 {
            let choice = agent.select_action(&mut metrics).unwrap();
            let allocation = choice.action.value();
            assert!((0.0..=1.0).contains(&allocation));
            assert!((choice.probs[1] - allocation).abs() < 1e-12);
        }
        assert_eq!(metrics.agent_series("exploration_noise", 0).unwrap().len(), 50);

        // Deterministic query leaves the agent untouched
        let before = agent.policy_weights().to_vec();
        let mean = agent.deterministic_allocation().unwrap();
        assert!((0.0..=1.0).contains(&mean));
        assert_eq!(agent.policy_weights(), before.as_slice());
    }

    #[test]
    fn test_latent_tracks_neighbors_and_reward() {
        let mut agent = BayesianAgent::new(0, &strategic(), BayesianAgentConfig::default());
        for _ in 0..100 {
            agent.infer_latent(&[0.0], &[0.0, 1.0], 2.0, &[0.0]).unwrap();
        }
        let latent = agent.current_latent();
        assert_eq!(latent.len(), 3);
        assert!((latent[1] - 1.0).abs() < 1e-3);
        assert!((latent[2] - 2.0).abs() < 1e-3);

        let (mean, logvar) = agent.latent_distribution_params();
        assert_eq!(mean.len(), 3);
        assert!(logvar.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_update_with_si_penalizes_drift() {
        let config = BayesianAgentConfig::default().learning_rate(0.1).synaptic_intelligence(10.0, 0.1);
        let mut agent = BayesianAgent::new(0, &social(2), config);
        let mut buffer = ReplayBuffer::with_seed(64, 1, 0);
        for t in 0..20 {
            let state = t % 2;
            buffer.store(Transition {
                signal: one_hot(state, 2),
                belief: vec![0.5, 0.5],
                latent: vec![0.0; 5],
                action: state as f64,
                reward: 1.0,
                ..Transition::default()
            });
        }

        agent.continual_mut().unwrap().begin_episode(0);
        let batch = buffer.sample(8).unwrap();
        let first = agent.update(&batch).unwrap();
        assert_eq!(first.belief_si_penalty, 0.0);
        assert_eq!(first.policy_si_penalty, 0.0);
        assert!(first.total_loss.is_finite());

        agent.continual_mut().unwrap().observe_state(1);
        let batch = buffer.sample(8).unwrap();
        agent.update(&batch).unwrap();
        let batch = buffer.sample(8).unwrap();
        let third = agent.update(&batch).unwrap();
        assert!(third.policy_si_penalty > 0.0);
    }

    #[test]
    fn test_save_and_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_0.json");
        let config = BayesianAgentConfig::default();

        let mut trained = BayesianAgent::new(0, &social(2), config.clone());
        trained.policy_weights[0] = 7.5;
        trained.save(&path).unwrap();

        let mut fresh = BayesianAgent::new(0, &social(2), config.clone());
        fresh.load(&path).unwrap();
        assert_eq!(fresh.policy_weights()[0], 7.5);

        // A model for a different population is rejected
        let mut other = BayesianAgent::new(0, &social(4), config);
        assert!(other.load(&path).is_err());
    }
}
