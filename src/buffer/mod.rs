//! Experience buffers for batched agent updates

pub mod replay;

pub use replay::{ReplayBuffer, Transition, TransitionBatch};
