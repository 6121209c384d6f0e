//! Batch sampling from the replay buffer

use rand::seq::index;

use super::storage::{ReplayBuffer, Transition};
use crate::error::SimulationError;

/// Batch of sampled transitions handed to an agent update
///
/// `sequences[i]` is the trailing window (oldest first) ending at
/// `transitions[i]`; windows are shorter near the start of the buffer.
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    /// Independently sampled transitions
    pub transitions: Vec<Transition>,

    /// Trailing window per sampled transition
    pub sequences: Vec<Vec<Transition>>,
}

impl TransitionBatch {
    /// Get batch size
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Iterate over the sampled transitions
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }
}

impl ReplayBuffer {
    /// Sample `batch_size` distinct transitions uniformly at random
    ///
    /// The buffer must hold strictly more than `batch_size` transitions;
    /// callers are expected to check this first. Sampling never removes
    /// anything and the output order is unspecified.
    pub fn sample(&mut self, batch_size: usize) -> Result<TransitionBatch, SimulationError> {
        let available = self.len();
        if available <= batch_size {
            return Err(SimulationError::InsufficientData { requested: batch_size, available });
        }

        let picks = index::sample(&mut self.rng, available, batch_size).into_vec();

        let mut transitions = Vec::with_capacity(batch_size);
        let mut sequences = Vec::with_capacity(batch_size);
        for idx in picks {
            transitions.push(self.transitions[idx].clone());
            sequences.push(self.window_ending_at(idx));
        }

        Ok(TransitionBatch { transitions, sequences })
    }

    /// Trailing window of up to `sequence_length` transitions ending at `end`
    fn window_ending_at(&self, end: usize) -> Vec<Transition> {
        let start = end.saturating_sub(self.sequence_length - 1);
        self.transitions.range(start..=end).cloned().collect()
    }
}
