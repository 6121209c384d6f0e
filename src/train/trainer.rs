//! Simulation loop
//!
//! [`Trainer`] drives agents through episodes of a [`SocialEnvironment`]:
//! action selection, environment stepping, belief and latent updates,
//! replay storage, batched parameter updates, continual-learning task
//! bookkeeping and metrics recording. It also runs whole training and
//! evaluation runs and writes their results to disk.
//!
//! Execution is single-threaded. Agents are updated one after another in
//! id order every step, and parameter updates block the loop.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{
    aggregate::{EvaluationSummary, aggregate_episode_results, evaluation_summary, flatten_episodic_metrics},
    config::TrainerConfig,
    stats::AggregatedStats,
};
use crate::{
    agent::{Agent, AttentionMatrix, TaskSwitch},
    buffer::{ReplayBuffer, Transition},
    env::{
        AgentId, EnvironmentKind, JointActionProbs, JointActions, Observation, Reward,
        SocialEnvironment, StepInfo, TheoreticalBounds, normalize_rewards,
    },
    error::SimulationError,
    metrics::{EpisodeMetrics, MetricValue, MetricsTracker, write_json},
    utils::{ObservationEncoder, stats::mean},
};

/// Offset added to evaluation seeds so they never overlap training seeds
pub const EVALUATION_SEED_OFFSET: u64 = 1000;

/// Results of a training or evaluation run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Metrics of every episode, in order
    pub episodic: Vec<EpisodeMetrics>,

    /// Flattened (training) or aggregated (evaluation) metrics
    pub combined: EpisodeMetrics,

    /// JSON view of `combined` with bounds and learning rates
    pub serialized: Value,

    /// Empirical learning rate per agent
    pub learning_rates: BTreeMap<AgentId, f64>,

    /// Evaluation summary (evaluation runs only)
    pub summary: Option<EvaluationSummary>,

    /// Directory the results were written to
    pub output_dir: PathBuf,
}

/// Results of [`Trainer::evaluate`]
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Summary statistics
    pub summary: EvaluationSummary,

    /// Metrics of every episode
    pub episodic: Vec<EpisodeMetrics>,

    /// Aggregated metrics
    pub aggregated: EpisodeMetrics,

    /// Empirical learning rate per agent
    pub learning_rates: BTreeMap<AgentId, f64>,

    /// Episodes evaluated
    pub num_episodes: usize,

    /// Steps per episode
    pub steps_per_episode: usize,
}

/// Results of [`Trainer::quick_evaluate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickEvaluation {
    /// Mean of the agents' total rewards
    pub average_reward: f64,

    /// Total reward per agent
    pub total_rewards: BTreeMap<AgentId, f64>,

    /// Fraction of steps whose action equals the true state, per agent
    pub action_accuracy: BTreeMap<AgentId, f64>,

    /// Mean of `action_accuracy`
    pub average_accuracy: f64,

    /// Steps actually run
    pub steps: usize,
}

/// Per-step data handed to [`Trainer::update_agent_states`]
struct StepData<'a> {
    observations: &'a BTreeMap<AgentId, Observation>,
    next_observations: &'a BTreeMap<AgentId, Observation>,
    actions: &'a JointActions,
    rewards: &'a BTreeMap<AgentId, Reward>,
}

/// Orchestrates agents in a social environment
#[derive(Debug)]
pub struct Trainer<E, A> {
    env: E,
    agents: Vec<A>,
    config: TrainerConfig,
    encoder: ObservationEncoder,
    buffers: Vec<ReplayBuffer>,
    update_stats: Vec<AggregatedStats>,
    output_dir: Option<PathBuf>,
    pending_output_dir: Option<PathBuf>,
}

impl<E: SocialEnvironment, A: Agent> Trainer<E, A> {
    /// Create a trainer
    ///
    /// `agents[i]` must have id `i`, one per environment agent.
    pub fn new(env: E, mut agents: Vec<A>, config: TrainerConfig) -> Result<Self> {
        config.validate()?;

        let descriptor = env.descriptor().clone();
        if agents.len() != descriptor.num_agents {
            bail!("environment has {} agents but {} were provided", descriptor.num_agents, agents.len());
        }
        if let Some((index, agent)) = agents.iter().enumerate().find(|(i, a)| a.id() != *i) {
            bail!("agent at position {} has id {}", index, agent.id());
        }

        if let Some(params) = descriptor.kind.strategic_params() {
            for agent in agents.iter_mut() {
                agent.set_environment_parameters(params);
            }
        }
        info!(
            "Initialized {} agents for a {} environment with {} states",
            descriptor.num_agents,
            descriptor.kind.name(),
            descriptor.num_states
        );
        if config.continuous_actions {
            info!("Using continuous allocations");
        }
        if config.use_si {
            info!("Using Synaptic Intelligence with importance {}", config.si_importance);
        }

        let encoder = ObservationEncoder::new(&descriptor);
        let update_stats = vec![AggregatedStats::new(); descriptor.num_agents];
        Ok(Self {
            env,
            agents,
            config,
            encoder,
            buffers: Vec::new(),
            update_stats,
            output_dir: None,
            pending_output_dir: None,
        })
    }

    /// Environment
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Mutable environment
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Agents in id order
    pub fn agents(&self) -> &[A] {
        &self.agents
    }

    /// Mutable agents in id order
    pub fn agents_mut(&mut self) -> &mut [A] {
        &mut self.agents
    }

    /// Run configuration
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Replay buffers (empty until training starts)
    pub fn buffers(&self) -> &[ReplayBuffer] {
        &self.buffers
    }

    /// Per-agent update statistics
    pub fn update_stats(&self) -> &[AggregatedStats] {
        &self.update_stats
    }

    /// Results directory of the last run
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Train or evaluate the agents
    ///
    /// Optionally restores agent weights from `model_dir`, creates a results
    /// directory, then runs `num_episodes` episodes.
    pub fn run_agents(&mut self, training: bool, model_dir: Option<&Path>) -> Result<RunOutcome> {
        if let Some(dir) = model_dir {
            self.load_models(dir)?;
        }
        self.pending_output_dir = Some(self.create_output_directory(training)?);

        let bounds = self.env.theoretical_bounds();
        for (name, value) in &bounds {
            info!("Theoretical bound {}: {:.4}", name, value);
        }

        if training { self.run_training(bounds) } else { self.run_evaluation(bounds) }
    }

    /// Run `num_episodes` training episodes and save the results
    pub fn run_training(&mut self, bounds: TheoreticalBounds) -> Result<RunOutcome> {
        self.initialize_replay_buffers();
        let output_dir = self.results_dir(true)?;
        self.write_config_snapshot(&output_dir, &bounds)?;

        info!(
            "Running {} training episode(s) with {} steps per episode",
            self.config.num_episodes, self.config.horizon
        );
        self.set_agents_train_mode();

        let mut episodes = Vec::with_capacity(self.config.num_episodes);
        for episode in 0..self.config.num_episodes {
            let seed = self.config.seed.wrapping_add(episode as u64);
            self.reseed(seed);
            info!("Starting training episode {}/{} with seed {}", episode + 1, self.config.num_episodes, seed);
            episodes.push(self.run_simulation(true)?);
        }

        self.process_training_results(episodes, bounds, &output_dir)
    }

    /// Run `num_episodes` evaluation episodes and save the results
    pub fn run_evaluation(&mut self, bounds: TheoreticalBounds) -> Result<RunOutcome> {
        let output_dir = self.results_dir(false)?;
        info!(
            "Running evaluation for {} episode(s) with {} steps per episode",
            self.config.num_episodes, self.config.horizon
        );
        self.set_agents_eval_mode();

        let mut episodes = Vec::with_capacity(self.config.num_episodes);
        for episode in 0..self.config.num_episodes {
            let seed = self.config.seed.wrapping_add(episode as u64).wrapping_add(EVALUATION_SEED_OFFSET);
            self.reseed(seed);
            info!("Evaluating episode {}/{} with seed {}", episode + 1, self.config.num_episodes, seed);
            episodes.push(self.run_simulation(false)?);
        }

        self.process_evaluation_results(episodes, bounds, &output_dir)
    }

    /// Evaluate with temporary episode count and horizon
    ///
    /// The configured values are restored afterwards, also on error.
    pub fn evaluate(&mut self, num_episodes: Option<usize>, num_steps: Option<usize>) -> Result<EvaluationReport> {
        let saved = (self.config.num_episodes, self.config.horizon);
        self.config.num_episodes = num_episodes.unwrap_or(saved.0);
        self.config.horizon = num_steps.unwrap_or(saved.1);
        let (episodes, steps) = (self.config.num_episodes, self.config.horizon);

        let result = self.config.validate().and_then(|_| self.run_agents(false, None));
        self.config.num_episodes = saved.0;
        self.config.horizon = saved.1;

        let outcome = result?;
        let summary = outcome.summary.ok_or_else(|| anyhow!("evaluation run produced no summary"))?;
        Ok(EvaluationReport {
            summary,
            episodic: outcome.episodic,
            aggregated: outcome.combined,
            learning_rates: outcome.learning_rates,
            num_episodes: episodes,
            steps_per_episode: steps,
        })
    }

    /// Roll out in eval mode without recording metrics or learning
    pub fn quick_evaluate(&mut self, num_steps: usize) -> Result<QuickEvaluation> {
        self.set_agents_eval_mode();
        info!("Quick evaluation for {} steps", num_steps);

        let num_agents = self.agents.len();
        let mut observations = self.env.initialize()?;
        self.reset_agent_internal_states();

        let mut scratch = EpisodeMetrics::new();
        let mut totals: BTreeMap<AgentId, f64> = (0..num_agents).map(|id| (id, 0.0)).collect();
        let mut correct = vec![0usize; num_agents];
        let mut steps = 0;

        for _ in 0..num_steps {
            let (actions, probs) = self.select_actions(&mut scratch)?;
            let state = self.env.true_state();
            let outcome = self.env.step(&actions, &probs)?;
            steps += 1;

            for (&agent_id, reward) in &normalize_rewards(&outcome.rewards)? {
                *totals.entry(agent_id).or_insert(0.0) += reward.total;
            }
            for (&agent_id, action) in &actions {
                if action.index() == Some(state) {
                    correct[agent_id] += 1;
                }
            }

            for (agent_id, agent) in self.agents.iter_mut().enumerate() {
                let observation = lookup(&observations, agent_id, "observation")?;
                let encoded = self.encoder.encode(agent_id, observation)?;
                agent.observe(&encoded.signal, &encoded.neighbor_actions)?;
                validate_belief(agent_id, agent.belief_distribution())?;
            }

            observations = outcome.observations;
            if outcome.done {
                break;
            }
        }

        let steps_f = steps.max(1) as f64;
        let action_accuracy: BTreeMap<AgentId, f64> =
            correct.iter().enumerate().map(|(id, &c)| (id, c as f64 / steps_f)).collect();
        let totals_list: Vec<f64> = totals.values().copied().collect();
        let accuracy_list: Vec<f64> = action_accuracy.values().copied().collect();

        Ok(QuickEvaluation {
            average_reward: mean(&totals_list),
            total_rewards: totals,
            average_accuracy: mean(&accuracy_list),
            action_accuracy,
            steps,
        })
    }

    /// Run one episode and return its metrics
    ///
    /// Runs at most `horizon` steps and stops early when the environment
    /// reports `done`. Training episodes store transitions, update agents
    /// and track continual-learning tasks.
    pub fn run_simulation(&mut self, training: bool) -> Result<EpisodeMetrics> {
        let mode = if training { "training" } else { "evaluation" };
        info!("Starting {} for {} steps", mode, self.config.horizon);
        let start = Instant::now();

        if training && self.buffers.len() != self.agents.len() {
            self.initialize_replay_buffers();
        }

        let descriptor = self.env.descriptor().clone();
        let mut tracker = MetricsTracker::new(descriptor.clone(), self.env.theoretical_bounds());

        let mut observations = self.env.initialize()?;
        let mut total_rewards: BTreeMap<AgentId, f64> = (0..self.agents.len()).map(|id| (id, 0.0)).collect();

        self.log_environment_info();
        if training {
            self.begin_continual_tasks();
        }
        self.reset_agent_internal_states();

        let env_params = descriptor.kind.strategic_params().cloned();
        let mut attention_history: Vec<AttentionMatrix> = Vec::new();

        for step in 0..self.config.horizon {
            let (actions, action_probs) = self.select_actions(tracker.metrics_mut())?;
            let policy_info = self.collect_policy_information()?;

            let outcome = self.env.step(&actions, &action_probs)?;
            let rewards = normalize_rewards(&outcome.rewards)?;

            let mut info = outcome.info;
            info.agent_beliefs = policy_info.agent_beliefs;
            info.policy_means = policy_info.policy_means;
            info.policy_stds = policy_info.policy_stds;
            if training {
                info.env_params.clone_from(&env_params);
            }

            for (&agent_id, reward) in &rewards {
                *total_rewards.entry(agent_id).or_insert(0.0) += reward.total;
            }

            let data = StepData {
                observations: &observations,
                next_observations: &outcome.observations,
                actions: &actions,
                rewards: &rewards,
            };
            self.update_agent_states(data, step, training, &mut tracker)?;

            if let Some(attention) = self.capture_attention_weights() {
                attention_history.push(attention);
            }

            observations = outcome.observations;

            if descriptor.kind.is_strategic() {
                self.override_allocations(&mut info, &actions, &action_probs);
            }
            tracker.update(&info, &actions, &action_probs);

            if self.config.log_interval > 0 && (step + 1) % self.config.log_interval == 0 {
                self.log_progress(mode, step, &total_rewards, training);
            }

            if outcome.done {
                if training {
                    self.handle_task_switch(true);
                }
                break;
            }
            if training {
                self.handle_task_switch(false);
            }
        }

        if !attention_history.is_empty() {
            tracker
                .metrics_mut()
                .insert("attention_weights", MetricValue::Opaque(serde_json::to_value(&attention_history)?));
        }

        let elapsed = start.elapsed();
        tracker.record_episode_summary(elapsed, &total_rewards, &observations)?;
        info!("{} completed in {:.2} seconds", mode, elapsed.as_secs_f64());

        Ok(tracker.into_metrics())
    }

    /// Per-agent update for one step
    ///
    /// Encodes the observation pair, updates belief and latent state,
    /// records the belief distribution and, when training, stores the
    /// transition and runs a parameter update if one is due.
    fn update_agent_states(
        &mut self,
        data: StepData<'_>,
        step: usize,
        training: bool,
        tracker: &mut MetricsTracker,
    ) -> Result<()> {
        let continuous = self.config.continuous_actions;
        let batch_size = self.config.batch_size;
        let update_interval = self.config.update_interval;

        for (agent_id, agent) in self.agents.iter_mut().enumerate() {
            let current = self.encoder.encode(agent_id, lookup(data.observations, agent_id, "observation")?)?;
            let next = self.encoder.encode(agent_id, lookup(data.next_observations, agent_id, "observation")?)?;
            let reward = lookup(data.rewards, agent_id, "reward")?.total;
            let action = lookup(data.actions, agent_id, "action")?;

            let belief = agent.current_belief().to_vec();
            let latent = agent.current_latent().to_vec();

            let (next_belief, _) = agent.observe(&current.signal, &current.neighbor_actions)?;
            validate_belief(agent_id, agent.belief_distribution())?;

            // Evaluation conditions the latent on the current signal
            let latent_signal = if training { &next.signal } else { &current.signal };
            let next_latent =
                agent.infer_latent(&current.signal, &current.neighbor_actions, reward, latent_signal)?;

            tracker.record_belief_distribution(agent_id, agent.belief_distribution());

            if !training {
                continue;
            }
            let Some(buffer) = self.buffers.get_mut(agent_id) else {
                continue;
            };

            let (latent_mean, latent_logvar) = agent.latent_distribution_params();
            let stored_action = match (continuous, agent.deterministic_allocation()) {
                (true, Some(allocation)) => allocation,
                _ => action.value(),
            };
            buffer.store(Transition {
                signal: current.signal,
                neighbor_actions: current.neighbor_actions,
                belief,
                latent,
                action: stored_action,
                reward,
                next_signal: next.signal,
                next_neighbor_actions: next.neighbor_actions,
                next_belief,
                next_latent,
                latent_mean,
                latent_logvar,
            });

            if buffer.len() > batch_size && step % update_interval == 0 {
                let batch = buffer.sample(batch_size)?;
                let losses = agent.update(&batch)?;
                tracker.update_training_losses(agent_id, &losses);
                if let Some(stats) = self.update_stats.get_mut(agent_id) {
                    stats.update(&losses);
                }
                if let Some(logits) = agent.action_logits() {
                    tracker.update_action_logits(agent_id, logits);
                }
            }
        }

        Ok(())
    }

    fn select_actions(&mut self, metrics: &mut EpisodeMetrics) -> Result<(JointActions, JointActionProbs)> {
        let mut actions = JointActions::new();
        let mut probs = JointActionProbs::new();
        for agent in self.agents.iter_mut() {
            let choice = agent.select_action(metrics)?;
            actions.insert(agent.id(), choice.action);
            probs.insert(agent.id(), choice.probs);
        }
        Ok((actions, probs))
    }

    /// Beliefs and policy parameters reported alongside the step info
    fn collect_policy_information(&self) -> Result<StepInfo> {
        let mut info = StepInfo::default();

        if self.env.descriptor().kind.is_strategic() {
            let beliefs = self
                .agents
                .iter()
                .map(|agent| Ok((agent.id(), belief_scalar(agent.id(), agent.belief_distribution())?)))
                .collect::<Result<BTreeMap<_, _>, SimulationError>>()?;
            info.agent_beliefs = Some(beliefs);
        }

        if self.config.continuous_actions {
            let means: BTreeMap<AgentId, f64> = self
                .agents
                .iter()
                .filter_map(|agent| agent.deterministic_allocation().map(|mean| (agent.id(), mean)))
                .collect();
            info.policy_stds = Some(means.keys().map(|&id| (id, 0.0)).collect());
            info.policy_means = Some(means);
        }

        Ok(info)
    }

    /// Allocations reported for the strategic environment
    ///
    /// Continuous actions fall back to the actions themselves; discrete
    /// actions always report the probability of the risky action.
    fn override_allocations(&self, info: &mut StepInfo, actions: &JointActions, action_probs: &JointActionProbs) {
        if self.config.continuous_actions {
            if info.allocations.is_none() {
                info.allocations = Some(actions.iter().map(|(&id, a)| (id, a.value())).collect());
            }
        } else {
            let allocations = action_probs
                .iter()
                .map(|(&id, probs)| (id, if probs.len() >= 2 { probs[1] } else { 0.5 }))
                .collect();
            info.allocations = Some(allocations);
        }
    }

    /// First attention matrix any agent can provide this step
    fn capture_attention_weights(&self) -> Option<AttentionMatrix> {
        let attention = self.agents.iter().find_map(|agent| agent.try_get_attention());
        if attention.is_none() {
            debug!("No agent provided attention weights this step");
        }
        attention
    }

    /// Assign the realized true state as every agent's current task
    fn begin_continual_tasks(&mut self) {
        if !self.config.use_si {
            return;
        }
        let state = self.env.true_state();
        for agent in self.agents.iter_mut() {
            let id = agent.id();
            if let Some(continual) = agent.continual_mut() {
                continual.begin_episode(state);
                info!("Set current true state {} for agent {}", state, id);
            }
        }
    }

    /// Register a task when the true state reaches an unseen value
    fn handle_task_switch(&mut self, episode_end: bool) {
        if !self.config.use_si {
            return;
        }
        let state = self.env.true_state();
        for agent in self.agents.iter_mut() {
            let id = agent.id();
            let Some(continual) = agent.continual_mut() else {
                continue;
            };
            let switch =
                if episode_end { continual.finalize_episode(state) } else { continual.observe_state(state) };
            match switch {
                TaskSwitch::Registered { finished, new } => {
                    info!("Agent {}: registered task {:?} and set new true state {}", id, finished, new);
                }
                TaskSwitch::Revisited { from, to } => {
                    debug!("Agent {}: true state moved from {:?} back to seen state {}", id, from, to);
                }
                TaskSwitch::Unchanged => {}
            }
        }
    }

    fn log_environment_info(&self) {
        let state = self.env.true_state();
        match &self.env.descriptor().kind {
            EnvironmentKind::StrategicExperimentation(params) => {
                let label = if state == 0 { "bad" } else { "good" };
                info!(
                    "True state is {} ({}). Drift rate: {} Jump rate: {} Jump size: {}",
                    state,
                    label,
                    params.drift_rates.get(state).copied().unwrap_or_default(),
                    params.jump_rates.get(state).copied().unwrap_or_default(),
                    params.jump_sizes.get(state).copied().unwrap_or_default()
                );
            }
            EnvironmentKind::SocialLearning => info!("True state is {}", state),
        }
    }

    fn log_progress(&mut self, mode: &str, step: usize, totals: &BTreeMap<AgentId, f64>, training: bool) {
        let per_step: Vec<f64> = totals.values().map(|total| total / (step + 1) as f64).collect();
        info!(
            "{} step {}/{}: mean reward per step {:.4}",
            mode,
            step + 1,
            self.config.horizon,
            mean(&per_step)
        );
        if !training {
            return;
        }
        for (agent_id, stats) in self.update_stats.iter_mut().enumerate() {
            let window = stats.take_window();
            if window.num_updates > 0 {
                info!(
                    "Agent {}: belief loss {:.4}, policy loss {:.4}, SI penalty {:.4}",
                    agent_id,
                    window.belief_loss,
                    window.policy_loss,
                    window.belief_si_penalty + window.policy_si_penalty
                );
            }
        }
    }

    fn process_training_results(
        &mut self,
        episodes: Vec<EpisodeMetrics>,
        bounds: TheoreticalBounds,
        output_dir: &Path,
    ) -> Result<RunOutcome> {
        let combined = flatten_episodic_metrics(&episodes);
        let tracker = MetricsTracker::from_metrics(self.env.descriptor().clone(), bounds.clone(), combined);
        let learning_rates = tracker.learning_rates();
        let serialized = tracker.prepare_for_serialization()?;

        tracker.save_to_file(output_dir)?;
        let episodic = json!({
            "episodic_data": episodes,
            "learning_rates": learning_rates,
            "theoretical_bounds": bounds,
            "episode_length": self.config.horizon,
            "num_episodes": self.config.num_episodes,
        });
        write_json(output_dir, "episodic_metrics.json", &episodic)?;

        if self.config.save_model {
            self.save_models(&output_dir.join("models"))?;
        }
        for (agent_id, rate) in &learning_rates {
            info!("Agent {} learning rate: {:.4}", agent_id, rate);
        }

        Ok(RunOutcome {
            episodic: episodes,
            combined: tracker.into_metrics(),
            serialized,
            learning_rates,
            summary: None,
            output_dir: output_dir.to_path_buf(),
        })
    }

    fn process_evaluation_results(
        &mut self,
        episodes: Vec<EpisodeMetrics>,
        bounds: TheoreticalBounds,
        output_dir: &Path,
    ) -> Result<RunOutcome> {
        let combined = aggregate_episode_results(&episodes);
        let tracker = MetricsTracker::from_metrics(self.env.descriptor().clone(), bounds.clone(), combined);
        let learning_rates = tracker.learning_rates();
        let summary = evaluation_summary(&episodes, learning_rates.clone());
        let serialized = tracker.prepare_for_serialization()?;

        tracker.save_to_file(output_dir)?;
        let detailed = json!({
            "evaluation_summary": summary,
            "episodic_data": episodes,
            "aggregated_metrics": tracker.metrics(),
            "learning_rates": learning_rates,
            "theoretical_bounds": bounds,
            "episode_length": self.config.horizon,
            "num_episodes": self.config.num_episodes,
        });
        write_json(output_dir, "detailed_evaluation_results.json", &detailed)?;

        Ok(RunOutcome {
            episodic: episodes,
            combined: tracker.into_metrics(),
            serialized,
            learning_rates,
            summary: Some(summary),
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Create `<output_dir>/<exp_name>/<train|eval>_<timestamp>`
    fn create_output_directory(&self, training: bool) -> Result<PathBuf> {
        let mode = if training { "train" } else { "eval" };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dir = self.config.output_dir.join(&self.config.exp_name).join(format!("{mode}_{stamp}"));
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        info!("Writing results to {}", dir.display());
        Ok(dir)
    }

    /// Directory prepared by `run_agents`, or a fresh one for direct calls
    fn results_dir(&mut self, training: bool) -> Result<PathBuf> {
        let dir = match self.pending_output_dir.take() {
            Some(dir) => dir,
            None => self.create_output_directory(training)?,
        };
        self.output_dir = Some(dir.clone());
        Ok(dir)
    }

    fn write_config_snapshot(&self, dir: &Path, bounds: &TheoreticalBounds) -> Result<()> {
        let snapshot = json!({
            "trainer": self.config,
            "environment": self.env.descriptor(),
            "theoretical_bounds": bounds,
        });
        write_json(dir, "config.json", &snapshot)?;
        Ok(())
    }

    /// Save every agent to `dir/agent_<id>.json`
    pub fn save_models(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for agent in &self.agents {
            agent.save(&dir.join(format!("agent_{}.json", agent.id())))?;
        }
        info!("Saved {} agent models to {}", self.agents.len(), dir.display());
        Ok(())
    }

    /// Load every agent from `dir/agent_<id>.json`, skipping missing files
    pub fn load_models(&mut self, dir: &Path) -> Result<()> {
        for agent in self.agents.iter_mut() {
            let path = dir.join(format!("agent_{}.json", agent.id()));
            if !path.exists() {
                warn!("No model found for agent {} at {}", agent.id(), path.display());
                continue;
            }
            agent.load(&path)?;
        }
        Ok(())
    }

    /// Fresh replay buffer per agent
    pub fn initialize_replay_buffers(&mut self) {
        self.buffers = (0..self.agents.len())
            .map(|id| {
                ReplayBuffer::with_seed(
                    self.config.buffer_capacity,
                    self.config.sequence_length,
                    self.config.seed.wrapping_add(id as u64),
                )
            })
            .collect();
    }

    fn reseed(&mut self, seed: u64) {
        self.env.reseed(seed);
        for (id, agent) in self.agents.iter_mut().enumerate() {
            agent.reseed(seed.wrapping_add(id as u64));
        }
        for (id, buffer) in self.buffers.iter_mut().enumerate() {
            buffer.reseed(seed.wrapping_add(id as u64));
        }
    }

    fn set_agents_train_mode(&mut self) {
        self.agents.iter_mut().for_each(|agent| agent.set_train_mode());
        info!("Set {} agents to training mode", self.agents.len());
    }

    fn set_agents_eval_mode(&mut self) {
        self.agents.iter_mut().for_each(|agent| agent.set_eval_mode());
        info!("Set {} agents to evaluation mode", self.agents.len());
    }

    fn reset_agent_internal_states(&mut self) {
        self.agents.iter_mut().for_each(|agent| agent.reset_internal_state());
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<AgentId, T>, agent_id: AgentId, what: &'static str) -> Result<&'a T, SimulationError> {
    map.get(&agent_id).ok_or(SimulationError::MissingAgentData { agent_id, what })
}

/// Reject belief distributions with NaN or infinite entries
pub fn validate_belief(agent_id: AgentId, distribution: &[f64]) -> Result<(), SimulationError> {
    if distribution.is_empty() {
        return Err(SimulationError::InvalidBeliefDistribution { agent_id, detail: "empty".to_string() });
    }
    if let Some(bad) = distribution.iter().find(|b| !b.is_finite()) {
        return Err(SimulationError::InvalidBeliefDistribution {
            agent_id,
            detail: format!("contains {bad}"),
        });
    }
    Ok(())
}

/// Scalar belief that the state is good
///
/// One entry is clamped to [0, 1], two entries give the mass on state 1,
/// and wider distributions give the state-index weighted mean scaled to
/// [0, 1].
pub fn belief_scalar(agent_id: AgentId, distribution: &[f64]) -> Result<f64, SimulationError> {
    validate_belief(agent_id, distribution)?;
    let scalar = match distribution.len() {
        1 => distribution[0].clamp(0.0, 1.0),
        2 => distribution[1],
        n => {
            let scale = (n - 1) as f64;
            distribution.iter().enumerate().map(|(k, p)| p * k as f64 / scale).sum::<f64>()
        }
    };
    Ok(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belief_scalar_widths() {
        assert_eq!(belief_scalar(0, &[1.7]).unwrap(), 1.0);
        assert_eq!(belief_scalar(0, &[-0.2]).unwrap(), 0.0);
        assert_eq!(belief_scalar(0, &[0.3, 0.7]).unwrap(), 0.7);
        assert!((belief_scalar(0, &[0.2, 0.3, 0.5]).unwrap() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_belief_scalar_rejects_nan() {
        let err = belief_scalar(4, &[f64::NAN, 0.5]).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidBeliefDistribution { agent_id: 4, .. }));
        assert!(validate_belief(0, &[]).is_err());
        assert!(validate_belief(0, &[0.5, f64::INFINITY]).is_err());
    }
}
