//! Error taxonomy for the simulation core
//!
//! Every variant here is fatal for the run that raised it. Degraded
//! conditions (an agent without attention weights, a missing model file)
//! are not errors; they are logged and skipped by the caller.

use thiserror::Error;

use crate::env::AgentId;

/// Fatal conditions raised by the simulation loop and its collaborators
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Belief distribution contains NaN or infinite values
    #[error(
        "agent {agent_id} has an invalid belief distribution ({detail}); \
         check learning rates, initialization or input preprocessing"
    )]
    InvalidBeliefDistribution {
        /// Offending agent
        agent_id: AgentId,
        /// What was wrong with the distribution
        detail: String,
    },

    /// A field required by the active environment variant is absent
    #[error("agent {agent_id}: observation is missing required field `{field}`")]
    MissingObservationField {
        /// Agent whose observation was incomplete
        agent_id: AgentId,
        /// Name of the missing field
        field: &'static str,
    },

    /// Observation variant does not match the environment kind
    #[error("agent {agent_id}: observation does not match a {expected} environment")]
    ObservationMismatch {
        /// Agent whose observation was malformed
        agent_id: AgentId,
        /// Environment kind the observation should have matched
        expected: &'static str,
    },

    /// Structured reward lacks its `total` entry
    #[error("agent {agent_id}: structured reward has no `total` field")]
    MissingRewardTotal {
        /// Agent whose reward was malformed
        agent_id: AgentId,
    },

    /// The environment omitted per-agent data for a declared agent
    #[error("no {what} reported for agent {agent_id}")]
    MissingAgentData {
        /// Agent with missing data
        agent_id: AgentId,
        /// Which piece of data was missing
        what: &'static str,
    },

    /// Sampling was attempted without enough stored transitions
    #[error("cannot sample {requested} transitions from a buffer holding {available}")]
    InsufficientData {
        /// Requested batch size
        requested: usize,
        /// Transitions currently stored
        available: usize,
    },
}
