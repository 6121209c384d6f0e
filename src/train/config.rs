//! Trainer configuration
//!
//! This module defines the run parameters for training and evaluation
//! and provides validation, builder methods and JSON loading.

use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::agent::BayesianAgentConfig;

/// Trainer configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Episodes per run
    pub num_episodes: usize,

    /// Maximum steps per episode
    pub horizon: usize,

    /// Base random seed; episode `e` uses `seed + e`
    pub seed: u64,

    /// Transitions per update batch
    pub batch_size: usize,

    /// Replay buffer capacity per agent
    pub buffer_capacity: usize,

    /// Window length attached to each sampled transition
    pub sequence_length: usize,

    /// Steps between parameter updates
    pub update_interval: usize,

    /// Agents emit continuous allocations
    pub continuous_actions: bool,

    /// Enable Synaptic Intelligence
    pub use_si: bool,

    /// Synaptic Intelligence penalty strength
    pub si_importance: f64,

    /// Synaptic Intelligence damping
    pub si_damping: f64,

    /// Agent learning rate
    pub learning_rate: f64,

    /// Agent discount factor
    pub discount_factor: f64,

    /// Exploration noise of continuous allocations
    pub exploration_std: f64,

    /// Root of all results directories
    pub output_dir: PathBuf,

    /// Experiment name (subdirectory of `output_dir`)
    pub exp_name: String,

    /// Save agent weights at the end of training
    pub save_model: bool,

    /// Steps between progress logs
    pub log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_episodes: 1,
            horizon: 1000,
            seed: 42,
            batch_size: 32,
            buffer_capacity: 1000,
            sequence_length: 8,
            update_interval: 10,
            continuous_actions: false,
            use_si: false,
            si_importance: 100.0,
            si_damping: 0.1,
            learning_rate: 1e-3,
            discount_factor: 0.9,
            exploration_std: 0.1,
            output_dir: PathBuf::from("results"),
            exp_name: "experiment".to_string(),
            save_model: false,
            log_interval: 100,
        }
    }
}

impl TrainerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.num_episodes == 0 {
            return Err(anyhow!("num_episodes must be positive"));
        }
        if self.horizon == 0 {
            return Err(anyhow!("horizon must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.buffer_capacity <= self.batch_size {
            return Err(anyhow!("buffer_capacity must exceed batch_size"));
        }
        if self.update_interval == 0 {
            return Err(anyhow!("update_interval must be positive"));
        }
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(anyhow!("discount_factor must be in [0, 1]"));
        }
        if self.si_importance < 0.0 {
            return Err(anyhow!("si_importance must be non-negative"));
        }
        if self.si_damping < 0.0 {
            return Err(anyhow!("si_damping must be non-negative"));
        }
        Ok(())
    }

    /// Reference-agent configuration matching this run
    pub fn agent_config(&self) -> BayesianAgentConfig {
        let config = BayesianAgentConfig::new()
            .continuous_actions(self.continuous_actions)
            .learning_rate(self.learning_rate)
            .discount_factor(self.discount_factor)
            .exploration_std(self.exploration_std);
        if self.use_si {
            config.synaptic_intelligence(self.si_importance, self.si_damping)
        } else {
            config
        }
    }

    /// Set number of episodes
    pub fn num_episodes(mut self, episodes: usize) -> Self {
        self.num_episodes = episodes;
        self
    }

    /// Set episode horizon
    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set base seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set update batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set replay buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set sampled window length
    pub fn sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Set steps between updates
    pub fn update_interval(mut self, interval: usize) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set continuous action mode
    pub fn continuous_actions(mut self, continuous: bool) -> Self {
        self.continuous_actions = continuous;
        self
    }

    /// Enable Synaptic Intelligence with the given strength and damping
    pub fn synaptic_intelligence(mut self, importance: f64, damping: f64) -> Self {
        self.use_si = true;
        self.si_importance = importance;
        self.si_damping = damping;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set discount factor
    pub fn discount_factor(mut self, gamma: f64) -> Self {
        self.discount_factor = gamma;
        self
    }

    /// Set exploration noise
    pub fn exploration_std(mut self, std: f64) -> Self {
        self.exploration_std = std;
        self
    }

    /// Set results root directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set experiment name
    pub fn exp_name(mut self, name: impl Into<String>) -> Self {
        self.exp_name = name.into();
        self
    }

    /// Save agent weights after training
    pub fn save_model(mut self, save: bool) -> Self {
        self.save_model = save;
        self
    }

    /// Set steps between progress logs
    pub fn log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sequence_length, 8);
        assert!(!config.use_si);
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainerConfig::new().horizon(0).validate().is_err());
        assert!(TrainerConfig::new().num_episodes(0).validate().is_err());
        assert!(TrainerConfig::new().batch_size(0).validate().is_err());
        assert!(TrainerConfig::new().update_interval(0).validate().is_err());
        assert!(TrainerConfig::new().learning_rate(0.0).validate().is_err());
        assert!(TrainerConfig::new().discount_factor(1.5).validate().is_err());
        assert!(TrainerConfig::new().synaptic_intelligence(-1.0, 0.1).validate().is_err());

        // Capacity must be strictly larger than the batch
        assert!(TrainerConfig::new().batch_size(8).buffer_capacity(8).validate().is_err());
        assert!(TrainerConfig::new().batch_size(8).buffer_capacity(9).validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TrainerConfig::new()
            .num_episodes(3)
            .horizon(50)
            .continuous_actions(true)
            .synaptic_intelligence(10.0, 0.01)
            .exp_name("keller_rady");

        assert_eq!(config.num_episodes, 3);
        assert_eq!(config.horizon, 50);
        assert!(config.use_si);
        assert_eq!(config.exp_name, "keller_rady");

        // Other values should remain default
        assert_eq!(config.batch_size, 32);

        let agent = config.agent_config();
        assert!(agent.continuous_actions);
        assert!(agent.use_si);
        assert_eq!(agent.si_importance, 10.0);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"horizon": 25, "use_si": true}"#).unwrap();

        let config = TrainerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.horizon, 25);
        assert!(config.use_si);
        assert_eq!(config.batch_size, 32);

        fs::write(&path, r#"{"horizon": 0}"#).unwrap();
        assert!(TrainerConfig::from_json_file(&path).is_err());
    }
}
