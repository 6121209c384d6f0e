//! Utility functions and helpers

pub mod encoding;
pub mod stats;

pub use encoding::{EncodedObservation, ObservationEncoder, observation_dimension};
pub use stats::{RunningMeanStd, SummaryStats, log_linear_decay_rate};
