//! Training statistics
//!
//! Accumulates the loss diagnostics returned by agent updates so the
//! trainer can log per-agent progress.

use std::ops::AddAssign;

use crate::agent::LossDiagnostics;

/// Summed loss diagnostics over one or more updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    /// Belief network loss
    pub belief_loss: f64,

    /// Policy loss
    pub policy_loss: f64,

    /// Continual-learning penalty on the belief network
    pub belief_si_penalty: f64,

    /// Continual-learning penalty on the policy network
    pub policy_si_penalty: f64,

    /// Total loss
    pub total_loss: f64,

    /// Number of updates folded in
    pub num_updates: usize,
}

impl TrainingStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Add another statistics instance to this one
    pub fn add(&mut self, other: &TrainingStats) {
        self.belief_loss += other.belief_loss;
        self.policy_loss += other.policy_loss;
        self.belief_si_penalty += other.belief_si_penalty;
        self.policy_si_penalty += other.policy_si_penalty;
        self.total_loss += other.total_loss;
        self.num_updates += other.num_updates;
    }

    /// Compute average statistics across the folded updates
    pub fn average(&self) -> Self {
        let scale = self.num_updates as f64;
        if scale == 0.0 {
            return Self::zeros();
        }

        Self {
            belief_loss: self.belief_loss / scale,
            policy_loss: self.policy_loss / scale,
            belief_si_penalty: self.belief_si_penalty / scale,
            policy_si_penalty: self.policy_si_penalty / scale,
            total_loss: self.total_loss / scale,
            num_updates: 1,
        }
    }
}

impl From<&LossDiagnostics> for TrainingStats {
    fn from(losses: &LossDiagnostics) -> Self {
        Self {
            belief_loss: losses.belief_loss,
            policy_loss: losses.policy_loss,
            belief_si_penalty: losses.belief_si_penalty,
            policy_si_penalty: losses.policy_si_penalty,
            total_loss: losses.total_loss,
            num_updates: 1,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}

/// Per-agent training progress across a run
#[derive(Debug, Clone)]
pub struct AggregatedStats {
    /// Most recent update
    pub current: TrainingStats,

    /// Exponential moving average of recent updates
    pub running_avg: TrainingStats,

    /// Updates since the last progress log
    pub window: TrainingStats,

    /// Lowest total loss seen so far
    pub best_total_loss: f64,

    /// Total number of updates
    pub total_updates: usize,
}

impl Default for AggregatedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedStats {
    /// Create empty aggregated statistics
    pub fn new() -> Self {
        Self {
            current: TrainingStats::zeros(),
            running_avg: TrainingStats::zeros(),
            window: TrainingStats::zeros(),
            best_total_loss: f64::INFINITY,
            total_updates: 0,
        }
    }

    /// Fold in the diagnostics of one update
    pub fn update(&mut self, losses: &LossDiagnostics) {
        let stats = TrainingStats::from(losses);
        self.window += &stats;
        self.total_updates += 1;

        // Exponential moving average with alpha=0.1
        let alpha = 0.1;
        let avg = &mut self.running_avg;
        avg.belief_loss = alpha * stats.belief_loss + (1.0 - alpha) * avg.belief_loss;
        avg.policy_loss = alpha * stats.policy_loss + (1.0 - alpha) * avg.policy_loss;
        avg.belief_si_penalty = alpha * stats.belief_si_penalty + (1.0 - alpha) * avg.belief_si_penalty;
        avg.policy_si_penalty = alpha * stats.policy_si_penalty + (1.0 - alpha) * avg.policy_si_penalty;
        avg.total_loss = alpha * stats.total_loss + (1.0 - alpha) * avg.total_loss;
        avg.num_updates = self.total_updates;

        if stats.total_loss < self.best_total_loss {
            self.best_total_loss = stats.total_loss;
        }
        self.current = stats;
    }

    /// Average over the current window, then start a new window
    pub fn take_window(&mut self) -> TrainingStats {
        std::mem::take(&mut self.window).average()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(total: f64) -> LossDiagnostics {
        LossDiagnostics { belief_loss: total / 2.0, policy_loss: total / 2.0, total_loss: total, ..Default::default() }
    }

    #[test]
    fn test_average() {
        let mut stats = TrainingStats::zeros();
        stats += &TrainingStats::from(&losses(1.0));
        stats += &TrainingStats::from(&losses(3.0));

        let avg = stats.average();
        assert_eq!(avg.total_loss, 2.0);
        assert_eq!(avg.belief_loss, 1.0);
        assert_eq!(avg.num_updates, 1);
        assert_eq!(TrainingStats::zeros().average(), TrainingStats::zeros());
    }

    #[test]
    fn test_aggregated_window_and_best() {
        let mut agg = AggregatedStats::new();
        agg.update(&losses(4.0));
        agg.update(&losses(2.0));

        assert_eq!(agg.best_total_loss, 2.0);
        assert_eq!(agg.current.total_loss, 2.0);
        assert_eq!(agg.total_updates, 2);

        let window = agg.take_window();
        assert_eq!(window.total_loss, 3.0);
        assert_eq!(agg.window.num_updates, 0);
    }
}
