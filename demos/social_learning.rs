//! Social learning with private signals
//!
//! Agents receive noisy private signals about a hidden state and see their
//! neighbors' previous actions. After training, a short evaluation reports
//! each agent's empirical learning rate next to the autarky and
//! coordination reference rates.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example social_learning --release
//! RUST_LOG=debug cargo run --example social_learning
//! ```

use anyhow::Result;
use social_rl::{
    agent::BayesianAgent,
    env::{SocialEnvironment, SocialLearningConfig, SocialLearningEnv},
    train::{Trainer, TrainerConfig},
};
use tracing_subscriber::EnvFilter;

const NUM_AGENTS: usize = 8;
const NUM_STATES: usize = 2;
const SIGNAL_ACCURACY: f64 = 0.75;
const HORIZON: usize = 1000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting social learning");
    tracing::info!("  Agents: {}", NUM_AGENTS);
    tracing::info!("  States: {}", NUM_STATES);
    tracing::info!("  Signal accuracy: {}", SIGNAL_ACCURACY);

    let config = TrainerConfig::new()
        .horizon(HORIZON)
        .num_episodes(2)
        .batch_size(16)
        .update_interval(5)
        .exp_name("social_learning");

    let env = SocialLearningEnv::new(SocialLearningConfig {
        num_agents: NUM_AGENTS,
        num_states: NUM_STATES,
        signal_accuracy: SIGNAL_ACCURACY,
        horizon: HORIZON,
        seed: config.seed,
        ..SocialLearningConfig::default()
    });

    let agent_config = config.agent_config().signal_accuracy(SIGNAL_ACCURACY);
    let agents: Vec<BayesianAgent> = (0..NUM_AGENTS)
        .map(|id| BayesianAgent::new(id, env.descriptor(), agent_config.clone()))
        .collect();

    let mut trainer = Trainer::new(env, agents, config)?;
    let bounds = trainer.env().theoretical_bounds();
    trainer.run_agents(true, None)?;

    let report = trainer.evaluate(Some(1), Some(HORIZON / 2))?;
    for (agent_id, rate) in &report.learning_rates {
        tracing::info!("Agent {} learning rate: {:.4}", agent_id, rate);
    }
    for (name, value) in &bounds {
        tracing::info!("Reference {}: {:.4}", name, value);
    }
    if let Some(accuracy) = &report.summary.action_accuracy {
        tracing::info!("Action accuracy: {:?}", accuracy);
    }

    let quick = trainer.quick_evaluate(100)?;
    tracing::info!(
        "Quick evaluation: average reward {:.2}, average accuracy {:.3}",
        quick.average_reward,
        quick.average_accuracy
    );

    Ok(())
}
