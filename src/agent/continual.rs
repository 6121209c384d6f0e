//! Continual learning with Synaptic Intelligence
//!
//! Each regularized sub-network carries a [`SynapticIntelligence`] tracker
//! that accumulates a per-parameter path integral while the network trains
//! on one task, consolidates it into an importance weight when the task is
//! registered, and penalizes later drift of important parameters:
//!
//! ```text
//! ω_i  += -g_i · Δθ_i                      (every update step)
//! Ω_i  += max(0, ω_i / ((θ_i - θ̃_i)² + ξ))  (on task registration)
//! L_SI  = c · Σ_i Ω_i (θ_i - θ*_i)²
//! ```
//!
//! A task is one realized true-state value. [`ContinualLearning`] owns both
//! trackers of an agent and decides when a task boundary has been crossed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::env::StateId;

/// Importance tracker for one sub-network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapticIntelligence {
    /// Task currently being tracked
    task: Option<StateId>,

    /// Penalty strength `c`
    importance_weight: f64,

    /// Damping `ξ` in the consolidation denominator
    damping: f64,

    /// Running path integral for the current task
    omega: Vec<f64>,

    /// Consolidated importance
    importance: Vec<f64>,

    /// Parameters when the current task started
    anchor: Vec<f64>,

    /// Parameters at the last registration
    consolidated: Vec<f64>,

    /// Latest parameters seen by `record_step`
    current: Vec<f64>,

    /// Tasks registered so far, in order
    registered: Vec<StateId>,
}

impl SynapticIntelligence {
    /// Create a tracker for a network whose parameters are `params`
    pub fn new(params: &[f64], importance_weight: f64, damping: f64) -> Self {
        Self {
            task: None,
            importance_weight,
            damping,
            omega: vec![0.0; params.len()],
            importance: vec![0.0; params.len()],
            anchor: params.to_vec(),
            consolidated: params.to_vec(),
            current: params.to_vec(),
            registered: Vec::new(),
        }
    }

    /// Start tracking `task` from the current parameters
    pub fn set_task(&mut self, task: StateId) {
        self.task = Some(task);
        self.anchor.clone_from(&self.current);
        self.omega.iter_mut().for_each(|w| *w = 0.0);
    }

    /// Accumulate the path integral for one update step
    ///
    /// `gradient` is the loss gradient used for the step and `new_params`
    /// the parameters after it.
    pub fn record_step(&mut self, gradient: &[f64], new_params: &[f64]) {
        for ((omega, current), (&g, &new)) in self
            .omega
            .iter_mut()
            .zip(self.current.iter_mut())
            .zip(gradient.iter().zip(new_params))
        {
            *omega += -g * (new - *current);
            *current = new;
        }
    }

    /// Consolidate the current task's path integral into the importance
    pub fn register_task(&mut self) {
        for i in 0..self.importance.len() {
            let drift = self.current[i] - self.anchor[i];
            let contribution = self.omega[i] / (drift * drift + self.damping);
            self.importance[i] += contribution.max(0.0);
        }
        self.consolidated.clone_from(&self.current);
        self.anchor.clone_from(&self.current);
        self.omega.iter_mut().for_each(|w| *w = 0.0);
        if let Some(task) = self.task {
            self.registered.push(task);
        }
    }

    /// Quadratic penalty on drift away from the consolidated parameters
    pub fn penalty(&self, params: &[f64]) -> f64 {
        let sum: f64 = params
            .iter()
            .zip(&self.consolidated)
            .zip(&self.importance)
            .map(|((p, star), imp)| imp * (p - star).powi(2))
            .sum();
        self.importance_weight * sum
    }

    /// Gradient of [`penalty`](Self::penalty) with respect to `params`
    pub fn penalty_gradient(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(&self.consolidated)
            .zip(&self.importance)
            .map(|((p, star), imp)| 2.0 * self.importance_weight * imp * (p - star))
            .collect()
    }

    /// Task currently being tracked
    pub fn task(&self) -> Option<StateId> {
        self.task
    }

    /// Consolidated importance per parameter
    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    /// Running path integral per parameter
    pub fn omega(&self) -> &[f64] {
        &self.omega
    }

    /// Tasks registered so far
    pub fn registered_tasks(&self) -> &[StateId] {
        &self.registered
    }
}

/// Outcome of a task-boundary check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSwitch {
    /// No boundary crossed
    Unchanged,

    /// Returned to an already-seen state; nothing consolidated
    Revisited {
        /// Task that was active
        from: Option<StateId>,
        /// Seen state now active
        to: StateId,
    },

    /// Consolidated the finished task and started tracking a new state
    Registered {
        /// Task that was consolidated
        finished: Option<StateId>,
        /// Newly seen state
        new: StateId,
    },
}

/// Per-agent continual-learning task state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinualLearning {
    current_task: Option<StateId>,
    seen_tasks: BTreeSet<StateId>,

    /// Tracker for the belief network
    pub belief_si: SynapticIntelligence,

    /// Tracker for the policy network
    pub policy_si: SynapticIntelligence,

    belief_snapshots: BTreeMap<StateId, SynapticIntelligence>,
    policy_snapshots: BTreeMap<StateId, SynapticIntelligence>,

    /// Registration count keyed by the state that triggered it
    registrations: BTreeMap<StateId, usize>,
}

impl ContinualLearning {
    /// Wrap the two sub-network trackers
    pub fn new(belief_si: SynapticIntelligence, policy_si: SynapticIntelligence) -> Self {
        Self {
            current_task: None,
            seen_tasks: BTreeSet::new(),
            belief_si,
            policy_si,
            belief_snapshots: BTreeMap::new(),
            policy_snapshots: BTreeMap::new(),
            registrations: BTreeMap::new(),
        }
    }

    /// Assign the episode's realized state as the current task
    ///
    /// No registration happens here: nothing has been learned yet in this
    /// episode.
    pub fn begin_episode(&mut self, state: StateId) {
        self.current_task = Some(state);
        self.belief_si.set_task(state);
        self.policy_si.set_task(state);
    }

    /// Check for a mid-episode true-state change
    pub fn observe_state(&mut self, state: StateId) -> TaskSwitch {
        if self.current_task == Some(state) {
            return TaskSwitch::Unchanged;
        }
        if self.seen_tasks.contains(&state) {
            let from = self.current_task.replace(state);
            return TaskSwitch::Revisited { from, to: state };
        }
        self.register_and_switch(state)
    }

    /// Episode-end bookkeeping: consolidate if `state` has never been seen
    pub fn finalize_episode(&mut self, state: StateId) -> TaskSwitch {
        if self.seen_tasks.contains(&state) {
            return match self.current_task.replace(state) {
                Some(previous) if previous == state => TaskSwitch::Unchanged,
                from => TaskSwitch::Revisited { from, to: state },
            };
        }
        self.register_and_switch(state)
    }

    fn register_and_switch(&mut self, state: StateId) -> TaskSwitch {
        let finished = self.current_task;

        self.belief_si.register_task();
        self.policy_si.register_task();

        self.belief_si.set_task(state);
        self.policy_si.set_task(state);

        self.belief_snapshots.insert(state, self.belief_si.clone());
        self.policy_snapshots.insert(state, self.policy_si.clone());

        if let Some(task) = finished {
            self.seen_tasks.insert(task);
        }
        self.seen_tasks.insert(state);
        *self.registrations.entry(state).or_insert(0) += 1;
        self.current_task = Some(state);

        TaskSwitch::Registered { finished, new: state }
    }

    /// Task currently being learned
    pub fn current_task(&self) -> Option<StateId> {
        self.current_task
    }

    /// States observed so far
    pub fn seen_tasks(&self) -> &BTreeSet<StateId> {
        &self.seen_tasks
    }

    /// Archived belief-tracker snapshots keyed by state
    pub fn belief_snapshots(&self) -> &BTreeMap<StateId, SynapticIntelligence> {
        &self.belief_snapshots
    }

    /// Archived policy-tracker snapshots keyed by state
    pub fn policy_snapshots(&self) -> &BTreeMap<StateId, SynapticIntelligence> {
        &self.policy_snapshots
    }

    /// Registration count keyed by triggering state
    pub fn registrations(&self) -> &BTreeMap<StateId, usize> {
        &self.registrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SynapticIntelligence {
        SynapticIntelligence::new(&[0.0, 0.0], 1.0, 0.1)
    }

    #[test]
    fn test_path_integral_accumulates() {
        let mut si = tracker();
        si.set_task(0);

        // Moving against the gradient accrues positive path integral
        si.record_step(&[1.0, -2.0], &[-0.5, 1.0]);
        assert_eq!(si.omega(), &[0.5, 2.0]);
    }

    #[test]
    fn test_register_consolidates_importance() {
        let mut si = tracker();
        si.set_task(0);
        si.record_step(&[1.0, 0.0], &[-1.0, 0.0]);
        si.register_task();

        // ω = 1, drift = -1, ξ = 0.1 → Ω = 1 / 1.1
        assert!((si.importance()[0] - 1.0 / 1.1).abs() < 1e-12);
        assert_eq!(si.importance()[1], 0.0);
        assert_eq!(si.omega(), &[0.0, 0.0]);
        assert_eq!(si.registered_tasks(), &[0]);

        // Penalty is zero at the consolidated point and grows with drift
        assert_eq!(si.penalty(&[-1.0, 0.0]), 0.0);
        assert!(si.penalty(&[0.0, 0.0]) > 0.0);
        let grad = si.penalty_gradient(&[0.0, 5.0]);
        assert!(grad[0] > 0.0);
        assert_eq!(grad[1], 0.0);
    }

    #[test]
    fn test_negative_path_integral_is_not_importance() {
        let mut si = tracker();
        si.set_task(0);
        si.record_step(&[-1.0, 0.0], &[1.0, 0.0]);
        si.register_task();
        assert_eq!(si.importance()[0], 0.0);
    }

    #[test]
    fn test_begin_episode_does_not_register() {
        let mut cl = ContinualLearning::new(tracker(), tracker());
        cl.begin_episode(1);

        assert_eq!(cl.current_task(), Some(1));
        assert!(cl.seen_tasks().is_empty());
        assert!(cl.belief_si.registered_tasks().is_empty());
        assert_eq!(cl.observe_state(1), TaskSwitch::Unchanged);
    }

    #[test]
    fn test_mid_episode_switch_registers_once() {
        let mut cl = ContinualLearning::new(tracker(), tracker());
        cl.begin_episode(0);

        let switch = cl.observe_state(1);
        assert_eq!(switch, TaskSwitch::Registered { finished: Some(0), new: 1 });
        assert_eq!(cl.policy_si.registered_tasks(), &[0]);
        assert!(cl.belief_snapshots().contains_key(&1));
        assert!(cl.policy_snapshots().contains_key(&1));

        // Returning to a seen state does not register again
        let switch = cl.observe_state(0);
        assert_eq!(switch, TaskSwitch::Revisited { from: Some(1), to: 0 });
        assert_eq!(cl.finalize_episode(0), TaskSwitch::Unchanged);
        assert_eq!(cl.registrations()[&1], 1);
        assert_eq!(cl.belief_si.registered_tasks().len(), 1);
    }

    #[test]
    fn test_seen_set_grows_monotonically() {
        let mut cl = ContinualLearning::new(tracker(), tracker());
        let episodes = [0, 1, 0, 1, 2, 0];
        let mut previous = 0;

        for &state in &episodes {
            cl.begin_episode(state);
            cl.finalize_episode(state);
            assert!(cl.seen_tasks().len() >= previous);
            previous = cl.seen_tasks().len();
        }

        assert_eq!(cl.seen_tasks().len(), 3);
        assert!(cl.registrations().values().all(|&count| count == 1));
        assert_eq!(cl.belief_si.registered_tasks(), &[0, 1, 2]);
    }
}
