//! Statistical helpers
//!
//! Running moments for online estimates, summary statistics over episode
//! totals, and the log-linear fit used to estimate learning rates.

use serde::{Deserialize, Serialize};

/// Floor applied before taking logs of error probabilities
pub const MIN_ERROR_PROBABILITY: f64 = 1e-10;

/// Running mean and variance per dimension
///
/// Tracks mean and variance using Welford's online algorithm
/// for numerical stability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    m2: Vec<f64>,
    count: u64,
}

impl RunningMeanStd {
    /// Create a tracker for `size`-dimensional samples
    pub fn new(size: usize) -> Self {
        Self { mean: vec![0.0; size], m2: vec![0.0; size], count: 0 }
    }

    /// Fold one sample into the running statistics
    pub fn update(&mut self, sample: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(sample) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    /// Current mean
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Current population variance (1.0 before two samples are seen)
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![1.0; self.mean.len()];
        }
        self.m2.iter().map(|m2| m2 / self.count as f64).collect()
    }

    /// Number of samples seen
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        self.mean.iter_mut().for_each(|m| *m = 0.0);
        self.m2.iter_mut().for_each(|m| *m = 0.0);
        self.count = 0;
    }
}

/// Mean, population standard deviation, min and max of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl SummaryStats {
    /// Summarize `values`; `None` for an empty sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean = mean(values);
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { mean, std: var.sqrt(), min, max })
    }
}

/// Arithmetic mean (0.0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Least-squares slope of `values` against their index
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }
    Some(cov / var)
}

/// Exponential decay rate of an error-probability series
///
/// Fits `ln p_t ≈ a - r t` and returns `r`. Probabilities are clamped to
/// `[MIN_ERROR_PROBABILITY, 1]` first. Series shorter than two points have
/// rate 0.0.
pub fn log_linear_decay_rate(error_probabilities: &[f64]) -> f64 {
    let logs: Vec<f64> = error_probabilities
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(MIN_ERROR_PROBABILITY, 1.0).ln())
        .collect();
    linear_slope(&logs).map(|slope| -slope).unwrap_or(0.0)
}
