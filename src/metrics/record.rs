//! Per-episode metric record
//!
//! An [`EpisodeMetrics`] maps a metric name to one of a few value shapes.
//! The shape decides how the record is merged across episodes, so it is
//! kept explicit instead of being inferred from the key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::AgentId;

/// One recorded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    /// Single number
    Scalar(f64),

    /// Vector such as a probability distribution
    Vector(Vec<f64>),

    /// Named entries such as loss components
    Record(BTreeMap<String, f64>),
}

impl Datum {
    /// Value as a number, if this is a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Datum::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// Value as a slice, if this is a vector
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Datum::Vector(values) => Some(values),
            _ => None,
        }
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Scalar(value)
    }
}

impl From<Vec<f64>> for Datum {
    fn from(values: Vec<f64>) -> Self {
        Datum::Vector(values)
    }
}

/// Shape of one metric entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Per-step sequence shared by all agents
    Series(Vec<Datum>),

    /// Per-step sequence per agent
    PerAgent(BTreeMap<AgentId, Vec<Datum>>),

    /// Episode summary number
    Scalar(f64),

    /// Episode summary number per agent
    PerAgentScalar(BTreeMap<AgentId, f64>),

    /// Anything else; never merged across episodes
    Opaque(serde_json::Value),
}

/// Metrics of one episode keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeMetrics(BTreeMap<String, MetricValue>);

impl EpisodeMetrics {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to a shared per-step series, creating it on first use
    pub fn push(&mut self, key: &str, datum: impl Into<Datum>) {
        let entry = self.0.entry(key.to_string()).or_insert_with(|| MetricValue::Series(Vec::new()));
        match entry {
            MetricValue::Series(values) => values.push(datum.into()),
            _ => tracing::warn!("metric `{}` is not a series; dropping value", key),
        }
    }

    /// Append to one agent's per-step series, creating it on first use
    pub fn push_agent(&mut self, key: &str, agent_id: AgentId, datum: impl Into<Datum>) {
        let entry =
            self.0.entry(key.to_string()).or_insert_with(|| MetricValue::PerAgent(BTreeMap::new()));
        match entry {
            MetricValue::PerAgent(per_agent) => {
                per_agent.entry(agent_id).or_default().push(datum.into());
            }
            _ => tracing::warn!("metric `{}` is not per-agent; dropping value for agent {}", key, agent_id),
        }
    }

    /// Insert or replace a whole entry
    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        self.0.insert(key.into(), value);
    }

    /// Entry by name
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Shared series by name
    pub fn series(&self, key: &str) -> Option<&[Datum]> {
        match self.0.get(key)? {
            MetricValue::Series(values) => Some(values),
            _ => None,
        }
    }

    /// Per-agent series map by name
    pub fn per_agent(&self, key: &str) -> Option<&BTreeMap<AgentId, Vec<Datum>>> {
        match self.0.get(key)? {
            MetricValue::PerAgent(per_agent) => Some(per_agent),
            _ => None,
        }
    }

    /// One agent's series by name
    pub fn agent_series(&self, key: &str, agent_id: AgentId) -> Option<&[Datum]> {
        self.per_agent(key)?.get(&agent_id).map(Vec::as_slice)
    }

    /// Scalar summary by name
    pub fn scalar(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            MetricValue::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// Per-agent scalar summary by name
    pub fn per_agent_scalar(&self, key: &str) -> Option<&BTreeMap<AgentId, f64>> {
        match self.0.get(key)? {
            MetricValue::PerAgentScalar(values) => Some(values),
            _ => None,
        }
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.0.iter()
    }

    /// Metric names in key order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no metric was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Scalars of a series, skipping non-scalar entries
pub fn scalars(values: &[Datum]) -> Vec<f64> {
    values.iter().filter_map(Datum::as_scalar).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_creates_series() {
        let mut metrics = EpisodeMetrics::new();
        metrics.push("true_states", 1.0);
        metrics.push("true_states", 0.0);

        assert_eq!(scalars(metrics.series("true_states").unwrap()), vec![1.0, 0.0]);
        assert!(metrics.per_agent("true_states").is_none());
    }

    #[test]
    fn test_push_agent_keeps_agents_apart() {
        let mut metrics = EpisodeMetrics::new();
        metrics.push_agent("agent_actions", 0, 1.0);
        metrics.push_agent("agent_actions", 1, 0.0);
        metrics.push_agent("agent_actions", 0, 0.0);

        assert_eq!(metrics.agent_series("agent_actions", 0).unwrap().len(), 2);
        assert_eq!(metrics.agent_series("agent_actions", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_shape_mismatch_is_dropped() {
        let mut metrics = EpisodeMetrics::new();
        metrics.insert("episode_time", MetricValue::Scalar(2.0));
        metrics.push("episode_time", 1.0);

        assert_eq!(metrics.scalar("episode_time"), Some(2.0));
    }

    #[test]
    fn test_json_shapes() {
        let mut metrics = EpisodeMetrics::new();
        metrics.push_agent("action_probs", 0, vec![0.25, 0.75]);
        let mut totals = BTreeMap::new();
        totals.insert(0, 3.0);
        metrics.insert("total_rewards", MetricValue::PerAgentScalar(totals));

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["action_probs"]["0"][0][1], 0.75);
        assert_eq!(json["total_rewards"]["0"], 3.0);
    }
}
