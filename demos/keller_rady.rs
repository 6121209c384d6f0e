//! Keller–Rady strategic experimentation
//!
//! Trains continuous-allocation agents on the two-armed bandit with a
//! public background signal, then evaluates them. Synaptic Intelligence is
//! enabled so that the agents keep what they learned about a state when
//! the world moves to another one.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example keller_rady --release
//! # Optionally load trainer settings from JSON
//! cargo run --example keller_rady --release -- config.json
//! ```

use anyhow::Result;
use social_rl::{
    agent::{Agent, BayesianAgent},
    env::{SocialEnvironment, StrategicExperimentationConfig, StrategicExperimentationEnv},
    train::{Trainer, TrainerConfig},
};
use tracing_subscriber::EnvFilter;

const NUM_AGENTS: usize = 4;
const HORIZON: usize = 500;
const NUM_EPISODES: usize = 3;
const STATE_CHANGE_PROBABILITY: f64 = 0.005;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::new()
            .num_episodes(NUM_EPISODES)
            .horizon(HORIZON)
            .continuous_actions(true)
            .synaptic_intelligence(100.0, 0.1)
            .learning_rate(5e-3)
            .exp_name("keller_rady")
            .save_model(true),
    };

    tracing::info!("Starting Keller-Rady strategic experimentation");
    tracing::info!("  Agents: {}", NUM_AGENTS);
    tracing::info!("  Episodes: {}", config.num_episodes);
    tracing::info!("  Horizon: {}", config.horizon);

    let env = StrategicExperimentationEnv::new(StrategicExperimentationConfig {
        num_agents: NUM_AGENTS,
        horizon: config.horizon,
        state_change_probability: STATE_CHANGE_PROBABILITY,
        seed: config.seed,
        ..StrategicExperimentationConfig::default()
    })?;

    let agents: Vec<BayesianAgent> = (0..NUM_AGENTS)
        .map(|id| BayesianAgent::new(id, env.descriptor(), config.agent_config()))
        .collect();

    let mut trainer = Trainer::new(env, agents, config)?;
    let training = trainer.run_agents(true, None)?;
    tracing::info!("Training results written to {}", training.output_dir.display());

    for agent in trainer.agents() {
        if let Some(continual) = agent.continual() {
            tracing::info!("Agent {} saw states {:?}", agent.id(), continual.seen_tasks());
        }
    }

    let report = trainer.evaluate(Some(2), None)?;
    for (agent_id, stats) in &report.summary.reward_statistics {
        tracing::info!(
            "Agent {}: mean total reward {:.3} (std {:.3})",
            agent_id,
            stats.mean,
            stats.std
        );
    }

    Ok(())
}
