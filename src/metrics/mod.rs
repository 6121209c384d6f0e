//! Metrics tracking
//!
//! A [`MetricsTracker`] owns the [`EpisodeMetrics`] of one episode. The
//! simulation loop creates a fresh tracker per episode, feeds it once per
//! step, lends its record to agents that log their own diagnostics, and
//! hands the finished record to the aggregator.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::{
    agent::LossDiagnostics,
    env::{
        AgentId, EnvironmentDescriptor, EnvironmentKind, JointActionProbs, JointActions,
        Observation, StepInfo, TheoreticalBounds,
    },
    utils::stats::log_linear_decay_rate,
};

mod record;

pub use record::{Datum, EpisodeMetrics, MetricValue, scalars};

/// Default metrics file name inside a results directory
pub const METRICS_FILE: &str = "metrics.json";

/// Accumulates one episode's per-step signals
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    descriptor: EnvironmentDescriptor,
    bounds: TheoreticalBounds,
    metrics: EpisodeMetrics,
}

impl MetricsTracker {
    /// Create a tracker with an empty record
    pub fn new(descriptor: EnvironmentDescriptor, bounds: TheoreticalBounds) -> Self {
        Self::from_metrics(descriptor, bounds, EpisodeMetrics::new())
    }

    /// Wrap an existing record, e.g. a flattened training run
    pub fn from_metrics(
        descriptor: EnvironmentDescriptor,
        bounds: TheoreticalBounds,
        metrics: EpisodeMetrics,
    ) -> Self {
        Self { descriptor, bounds, metrics }
    }

    /// Recorded metrics
    pub fn metrics(&self) -> &EpisodeMetrics {
        &self.metrics
    }

    /// Mutable handle on the recorded metrics
    pub fn metrics_mut(&mut self) -> &mut EpisodeMetrics {
        &mut self.metrics
    }

    /// Consume the tracker, returning its record
    pub fn into_metrics(self) -> EpisodeMetrics {
        self.metrics
    }

    /// Record one step's info together with the joint action
    pub fn update(&mut self, info: &StepInfo, actions: &JointActions, action_probs: &JointActionProbs) {
        let metrics = &mut self.metrics;

        if let Some(state) = info.true_state {
            metrics.push("true_states", state as f64);
        }

        for (&agent_id, action) in actions {
            metrics.push_agent("agent_actions", agent_id, action.value());
        }

        for (&agent_id, probs) in action_probs {
            metrics.push_agent("action_probs", agent_id, probs.clone());

            let discrete = actions.get(&agent_id).is_some_and(|a| a.index().is_some());
            if let (true, Some(state)) = (discrete, info.true_state) {
                let correct = probs.get(state).copied().unwrap_or(0.0);
                metrics.push_agent("incorrect_probs", agent_id, 1.0 - correct);
            }
        }

        let per_agent_maps = [
            ("allocations", &info.allocations),
            ("agent_beliefs", &info.agent_beliefs),
            ("mpe_allocations", &info.mpe_allocations),
            ("policy_means", &info.policy_means),
            ("policy_stds", &info.policy_stds),
        ];
        for (key, values) in per_agent_maps {
            for (&agent_id, &value) in values.iter().flatten() {
                metrics.push_agent(key, agent_id, value);
            }
        }
    }

    /// Record an agent's belief distribution after its update
    pub fn record_belief_distribution(&mut self, agent_id: AgentId, distribution: &[f64]) {
        self.metrics.push_agent("belief_distributions", agent_id, distribution.to_vec());
    }

    /// Record the loss diagnostics of one parameter update
    pub fn update_training_losses(&mut self, agent_id: AgentId, losses: &LossDiagnostics) {
        let record = losses.entries().iter().map(|&(name, value)| (name.to_string(), value)).collect();
        self.metrics.push_agent("training_losses", agent_id, Datum::Record(record));
    }

    /// Record the policy logits seen at an update
    pub fn update_action_logits(&mut self, agent_id: AgentId, logits: &[f64]) {
        self.metrics.push_agent("action_logits", agent_id, logits.to_vec());
    }

    /// Record the episode summary fields
    pub fn record_episode_summary(
        &mut self,
        elapsed: Duration,
        total_rewards: &BTreeMap<AgentId, f64>,
        final_observations: &BTreeMap<AgentId, Observation>,
    ) -> Result<()> {
        self.metrics.insert("episode_time", MetricValue::Scalar(elapsed.as_secs_f64()));
        self.metrics.insert("total_rewards", MetricValue::PerAgentScalar(total_rewards.clone()));
        self.metrics.insert(
            "final_observations",
            MetricValue::Opaque(serde_json::to_value(final_observations)?),
        );
        Ok(())
    }

    /// Reference convergence rates of the environment
    pub fn theoretical_bounds(&self) -> &TheoreticalBounds {
        &self.bounds
    }

    /// Empirical learning rate per agent over the recorded steps
    pub fn learning_rates(&self) -> BTreeMap<AgentId, f64> {
        learning_rates(&self.metrics, &self.descriptor)
    }

    /// JSON-safe view of the record, bounds and learning rates
    pub fn prepare_for_serialization(&self) -> Result<Value> {
        prepare_for_serialization(&self.metrics, &self.bounds, &self.learning_rates())
    }

    /// Write [`prepare_for_serialization`](Self::prepare_for_serialization)
    /// to `dir/metrics.json`
    pub fn save_to_file(&self, dir: &Path) -> Result<PathBuf> {
        self.save_to_file_as(dir, METRICS_FILE)
    }

    /// Write [`prepare_for_serialization`](Self::prepare_for_serialization)
    /// to `dir/filename`
    pub fn save_to_file_as(&self, dir: &Path, filename: &str) -> Result<PathBuf> {
        let value = self.prepare_for_serialization()?;
        write_json(dir, filename, &value)
    }
}

/// Empirical learning rate per agent
///
/// Social learning uses each agent's incorrect-action probability series;
/// strategic experimentation uses the distance between the agent's scalar
/// belief and the (normalized) true state.
pub fn learning_rates(
    metrics: &EpisodeMetrics,
    descriptor: &EnvironmentDescriptor,
) -> BTreeMap<AgentId, f64> {
    let errors: BTreeMap<AgentId, Vec<f64>> = match descriptor.kind {
        EnvironmentKind::SocialLearning => metrics
            .per_agent("incorrect_probs")
            .map(|per_agent| per_agent.iter().map(|(&id, values)| (id, scalars(values))).collect())
            .unwrap_or_default(),
        EnvironmentKind::StrategicExperimentation(_) => {
            let states = metrics.series("true_states").map(scalars).unwrap_or_default();
            let scale = descriptor.num_states.saturating_sub(1).max(1) as f64;
            metrics
                .per_agent("agent_beliefs")
                .map(|per_agent| {
                    per_agent
                        .iter()
                        .map(|(&id, beliefs)| {
                            let errors = scalars(beliefs)
                                .iter()
                                .zip(&states)
                                .map(|(belief, state)| (belief - state / scale).abs())
                                .collect();
                            (id, errors)
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
    };

    errors.into_iter().map(|(id, series)| (id, log_linear_decay_rate(&series))).collect()
}

/// JSON-safe nested mapping of a metrics record
///
/// Non-finite numbers serialize as `null`.
pub fn prepare_for_serialization(
    metrics: &EpisodeMetrics,
    bounds: &TheoreticalBounds,
    learning_rates: &BTreeMap<AgentId, f64>,
) -> Result<Value> {
    let mut value = serde_json::to_value(metrics)?;
    if let Value::Object(map) = &mut value {
        map.insert("theoretical_bounds".to_string(), json!(bounds));
        map.insert("learning_rates".to_string(), json!(learning_rates));
    }
    Ok(value)
}

/// Pretty-print `value` into `dir/filename`, creating `dir` if needed
pub fn write_json(dir: &Path, filename: &str, value: &impl serde::Serialize) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(filename);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Action, StrategicParams};

    fn social() -> EnvironmentDescriptor {
        EnvironmentDescriptor { num_agents: 2, num_states: 2, kind: EnvironmentKind::SocialLearning }
    }

    fn strategic() -> EnvironmentDescriptor {
        let params = StrategicParams {
            safe_payoff: 0.5,
            drift_rates: vec![0.0, 1.0],
            jump_rates: vec![0.0, 0.1],
            jump_sizes: vec![1.0, 1.0],
            background_informativeness: 0.5,
            time_step: 1.0,
        };
        EnvironmentDescriptor {
            num_agents: 2,
            num_states: 2,
            kind: EnvironmentKind::StrategicExperimentation(params),
        }
    }

    #[test]
    fn test_update_records_actions_and_incorrect_probs() {
        let mut tracker = MetricsTracker::new(social(), TheoreticalBounds::new());
        let info = StepInfo { true_state: Some(1), ..StepInfo::default() };
        let actions: JointActions = [(0, Action::Discrete(1)), (1, Action::Discrete(0))].into();
        let probs: JointActionProbs = [(0, vec![0.2, 0.8]), (1, vec![0.6, 0.4])].into();

        tracker.update(&info, &actions, &probs);

        let metrics = tracker.metrics();
        assert_eq!(scalars(metrics.series("true_states").unwrap()), vec![1.0]);
        assert_eq!(scalars(metrics.agent_series("agent_actions", 1).unwrap()), vec![0.0]);
        let incorrect = scalars(metrics.agent_series("incorrect_probs", 0).unwrap());
        assert!((incorrect[0] - 0.2).abs() < 1e-12);
        assert!(metrics.get("allocations").is_none());
    }

    #[test]
    fn test_continuous_actions_have_no_incorrect_probs() {
        let mut tracker = MetricsTracker::new(strategic(), TheoreticalBounds::new());
        let info = StepInfo {
            true_state: Some(0),
            allocations: Some([(0, 0.3), (1, 0.9)].into()),
            policy_means: Some([(1, 0.75)].into()),
            ..StepInfo::default()
        };
        let actions: JointActions = [(0, Action::Continuous(0.3)), (1, Action::Continuous(0.9))].into();
        let probs: JointActionProbs = [(0, vec![0.7, 0.3]), (1, vec![0.1, 0.9])].into();

        tracker.update(&info, &actions, &probs);

        let metrics = tracker.metrics();
        assert!(metrics.get("incorrect_probs").is_none());
        assert_eq!(scalars(metrics.agent_series("allocations", 1).unwrap()), vec![0.9]);
        // Means stay with their agent when another agent reports none
        assert_eq!(scalars(metrics.agent_series("policy_means", 1).unwrap()), vec![0.75]);
        assert!(metrics.agent_series("policy_means", 0).is_none());
    }

    #[test]
    fn test_social_learning_rate_from_incorrect_probs() {
        let mut metrics = EpisodeMetrics::new();
        for t in 0..30 {
            metrics.push_agent("incorrect_probs", 0, 0.5 * (-0.2 * t as f64).exp());
        }
        let rates = learning_rates(&metrics, &social());
        assert!((rates[&0] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_strategic_learning_rate_from_belief_error() {
        let mut metrics = EpisodeMetrics::new();
        for t in 0..30 {
            metrics.push("true_states", 1.0);
            metrics.push_agent("agent_beliefs", 0, 1.0 - 0.5 * (-0.1 * t as f64).exp());
        }
        let rates = learning_rates(&metrics, &strategic());
        assert!((rates[&0] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_save_to_file_includes_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut bounds = TheoreticalBounds::new();
        bounds.insert("autarky_rate".to_string(), 0.5);
        let mut tracker = MetricsTracker::new(social(), bounds);
        tracker.record_belief_distribution(0, &[0.3, 0.7]);

        let path = tracker.save_to_file(dir.path()).unwrap();
        assert!(path.ends_with(METRICS_FILE));

        let saved: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["theoretical_bounds"]["autarky_rate"], 0.5);
        assert_eq!(saved["belief_distributions"]["0"][0][1], 0.7);
    }
}
