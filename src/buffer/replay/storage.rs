//! Replay buffer storage
//!
//! Holds transitions in insertion order with ring-buffer eviction.

use std::collections::VecDeque;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// One recorded agent transition
///
/// Snapshots are immutable once stored; sampling hands out clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Encoded signal at the pre-state
    pub signal: Vec<f64>,

    /// Encoded neighbor actions at the pre-state
    pub neighbor_actions: Vec<f64>,

    /// Belief before the update
    pub belief: Vec<f64>,

    /// Latent state before the update
    pub latent: Vec<f64>,

    /// Action taken (discrete index or stored allocation)
    pub action: f64,

    /// Realized total reward
    pub reward: f64,

    /// Encoded signal at the post-state
    pub next_signal: Vec<f64>,

    /// Encoded neighbor actions at the post-state
    pub next_neighbor_actions: Vec<f64>,

    /// Belief after the update
    pub next_belief: Vec<f64>,

    /// Latent state after the update
    pub next_latent: Vec<f64>,

    /// Mean of the latent distribution
    pub latent_mean: Vec<f64>,

    /// Log-variance of the latent distribution
    pub latent_logvar: Vec<f64>,
}

/// Fixed-capacity replay buffer
///
/// Storing into a full buffer evicts the oldest transition; it never fails.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Stored transitions, oldest first
    pub(super) transitions: VecDeque<Transition>,

    /// Maximum number of transitions
    capacity: usize,

    /// Length of the trailing window attached to each sampled entry
    pub(super) sequence_length: usize,

    /// Random source for sampling
    pub(super) rng: StdRng,
}

impl ReplayBuffer {
    /// Create a buffer seeded from entropy
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of stored transitions
    /// * `sequence_length` - Window length per sampled entry (at least 1)
    pub fn new(capacity: usize, sequence_length: usize) -> Self {
        Self::from_rng(capacity, sequence_length, StdRng::from_entropy())
    }

    /// Create a buffer with a deterministic sampling seed
    pub fn with_seed(capacity: usize, sequence_length: usize, seed: u64) -> Self {
        Self::from_rng(capacity, sequence_length, StdRng::seed_from_u64(seed))
    }

    fn from_rng(capacity: usize, sequence_length: usize, rng: StdRng) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            sequence_length: sequence_length.max(1),
            rng,
        }
    }

    /// Reseed the sampling random source
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Append a transition, evicting the oldest one when full
    pub fn store(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.transitions.len() >= self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Number of stored transitions
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Maximum number of stored transitions
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window length attached to sampled entries
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Transition at `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.transitions.get(index)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Drop every stored transition
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}
