//! Cross-episode aggregation
//!
//! Training and evaluation merge episode records differently and the two
//! must stay separate:
//!
//! - [`flatten_episodic_metrics`] (training) concatenates every key into one
//!   continuous timeline.
//! - [`aggregate_episode_results`] (evaluation) averages episode summaries,
//!   concatenates per-step sequences and drops anything else, so summary
//!   statistics can still be computed per episode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    env::AgentId,
    metrics::{Datum, EpisodeMetrics, MetricValue, scalars},
    utils::stats::{SummaryStats, mean},
};

/// Merge evaluation episodes with per-key policies
///
/// Keys are taken from the first episode. `episode_time` is averaged,
/// `total_rewards` is averaged per agent, per-agent and shared sequences
/// are concatenated in episode order, and every other entry is omitted.
pub fn aggregate_episode_results(episodes: &[EpisodeMetrics]) -> EpisodeMetrics {
    let mut aggregated = EpisodeMetrics::new();
    let Some(first) = episodes.first() else {
        return aggregated;
    };

    for (key, value) in first.iter() {
        let merged = match value {
            MetricValue::Scalar(_) if key == "episode_time" => {
                let times: Vec<f64> = episodes.iter().filter_map(|e| e.scalar(key)).collect();
                Some(MetricValue::Scalar(mean(&times)))
            }
            MetricValue::PerAgentScalar(_) if key == "total_rewards" => {
                let mut per_agent: BTreeMap<AgentId, Vec<f64>> = BTreeMap::new();
                for totals in episodes.iter().filter_map(|e| e.per_agent_scalar(key)) {
                    for (&agent_id, &total) in totals {
                        per_agent.entry(agent_id).or_default().push(total);
                    }
                }
                Some(MetricValue::PerAgentScalar(
                    per_agent.into_iter().map(|(id, totals)| (id, mean(&totals))).collect(),
                ))
            }
            MetricValue::PerAgent(_) => {
                let mut per_agent: BTreeMap<AgentId, Vec<Datum>> = BTreeMap::new();
                for series in episodes.iter().filter_map(|e| e.per_agent(key)) {
                    for (&agent_id, values) in series {
                        per_agent.entry(agent_id).or_default().extend(values.iter().cloned());
                    }
                }
                Some(MetricValue::PerAgent(per_agent))
            }
            MetricValue::Series(_) => {
                let values =
                    episodes.iter().filter_map(|e| e.series(key)).flatten().cloned().collect();
                Some(MetricValue::Series(values))
            }
            _ => None,
        };

        if let Some(merged) = merged {
            aggregated.insert(key.clone(), merged);
        }
    }

    aggregated
}

/// Concatenate training episodes into one timeline
///
/// Every key of every episode is kept: sequences are concatenated, episode
/// scalars become a series with one entry per episode, per-agent scalars
/// become per-agent series, and opaque values are collected into an array.
pub fn flatten_episodic_metrics(episodes: &[EpisodeMetrics]) -> EpisodeMetrics {
    let mut flat = EpisodeMetrics::new();

    for episode in episodes {
        for (key, value) in episode.iter() {
            match value {
                MetricValue::Series(values) => {
                    extend_series(&mut flat, key, values.iter().cloned());
                }
                MetricValue::Scalar(value) => {
                    extend_series(&mut flat, key, std::iter::once(Datum::Scalar(*value)));
                }
                MetricValue::PerAgent(per_agent) => {
                    for (&agent_id, values) in per_agent {
                        for datum in values {
                            flat.push_agent(key, agent_id, datum.clone());
                        }
                    }
                }
                MetricValue::PerAgentScalar(per_agent) => {
                    for (&agent_id, &value) in per_agent {
                        flat.push_agent(key, agent_id, value);
                    }
                }
                MetricValue::Opaque(value) => match flat.get(key) {
                    Some(MetricValue::Opaque(serde_json::Value::Array(existing))) => {
                        let mut items = existing.clone();
                        items.push(value.clone());
                        flat.insert(key.clone(), MetricValue::Opaque(serde_json::Value::Array(items)));
                    }
                    None => {
                        let items = vec![value.clone()];
                        flat.insert(key.clone(), MetricValue::Opaque(serde_json::Value::Array(items)));
                    }
                    Some(_) => tracing::warn!("metric `{}` changes shape across episodes; skipping", key),
                },
            }
        }
    }

    flat
}

fn extend_series(flat: &mut EpisodeMetrics, key: &str, values: impl Iterator<Item = Datum>) {
    for datum in values {
        flat.push(key, datum);
    }
}

/// Summary of an evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Episodes evaluated
    pub num_episodes: usize,

    /// Empirical learning rate per agent
    pub learning_rates: BTreeMap<AgentId, f64>,

    /// Statistics of episode total rewards per agent
    pub reward_statistics: BTreeMap<AgentId, SummaryStats>,

    /// Fraction of steps whose action equals the true state, per agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_accuracy: Option<BTreeMap<AgentId, f64>>,
}

/// Summarize evaluation episodes
pub fn evaluation_summary(
    episodes: &[EpisodeMetrics],
    learning_rates: BTreeMap<AgentId, f64>,
) -> EvaluationSummary {
    let mut totals: BTreeMap<AgentId, Vec<f64>> = BTreeMap::new();
    for episode in episodes {
        for (&agent_id, &total) in episode.per_agent_scalar("total_rewards").into_iter().flatten() {
            totals.entry(agent_id).or_default().push(total);
        }
    }
    let reward_statistics = totals
        .into_iter()
        .filter_map(|(id, values)| SummaryStats::from_values(&values).map(|stats| (id, stats)))
        .collect();

    EvaluationSummary {
        num_episodes: episodes.len(),
        learning_rates,
        reward_statistics,
        action_accuracy: action_accuracy(episodes),
    }
}

/// Pooled fraction of steps where an agent's action equals the true state
///
/// `None` unless at least one episode records both `true_states` and
/// `agent_actions`.
pub fn action_accuracy(episodes: &[EpisodeMetrics]) -> Option<BTreeMap<AgentId, f64>> {
    let mut counts: BTreeMap<AgentId, (usize, usize)> = BTreeMap::new();
    let mut found = false;

    for episode in episodes {
        let (Some(states), Some(actions)) = (episode.series("true_states"), episode.per_agent("agent_actions"))
        else {
            continue;
        };
        found = true;
        let states = scalars(states);
        for (&agent_id, agent_actions) in actions {
            let entry = counts.entry(agent_id).or_default();
            for (action, state) in scalars(agent_actions).iter().zip(&states) {
                entry.1 += 1;
                if (action - state).abs() < 1e-9 {
                    entry.0 += 1;
                }
            }
        }
    }

    found.then(|| {
        counts
            .into_iter()
            .map(|(id, (correct, total))| {
                let accuracy = if total == 0 { 0.0 } else { correct as f64 / total as f64 };
                (id, accuracy)
            })
            .collect()
    })
}
