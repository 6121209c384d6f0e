//! Replay buffer for storing and sampling agent transitions
//!
//! This module implements the per-agent experience store used by the
//! simulation loop:
//! - Fixed-capacity FIFO storage (oldest transition evicted first)
//! - Uniform random batch sampling without replacement within a batch
//! - Short trailing sequence windows per sampled entry for recurrent updates
//!
//! # Example
//!
//! ```rust
//! use social_rl::buffer::replay::{ReplayBuffer, Transition};
//!
//! // 50 transitions, 8-step windows, fixed seed
//! let mut buffer = ReplayBuffer::with_seed(50, 8, 7);
//!
//! for step in 0..20 {
//!     buffer.store(Transition { reward: step as f64, ..Transition::default() });
//! }
//!
//! // Sampling requires strictly more stored transitions than the batch size
//! let batch = buffer.sample(8).unwrap();
//! assert_eq!(batch.len(), 8);
//! ```

mod sampling;
mod storage;


pub use sampling::TransitionBatch;
pub use storage::{ReplayBuffer, Transition};
