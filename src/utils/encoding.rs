//! Observation encoding
//!
//! Maps raw per-agent observations onto the fixed-shape numeric vectors the
//! agent networks consume. Encoding is keyed by agent identity, so the order
//! in which neighbors report never changes the output.
//!
//! # Layout
//!
//! | Variant | Signal | Neighbor actions |
//! |---|---|---|
//! | Social learning | one-hot over `num_states` | `num_agents` slots of `num_states` one-hot entries |
//! | Strategic experimentation | `[background_increment]` | `num_agents` allocation scalars |
//!
//! The acting agent's own slot is always zero, as is the slot of any
//! neighbor that did not report.

use crate::{
    env::{AgentId, EnvironmentDescriptor, EnvironmentKind, Observation, StateId},
    error::SimulationError,
};

/// Encoded observation pair fed to an agent
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedObservation {
    /// Encoded private/background signal
    pub signal: Vec<f64>,

    /// Encoded neighbor actions or allocations
    pub neighbor_actions: Vec<f64>,
}

/// Encoder bound to one environment's dimensions
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    num_agents: usize,
    num_states: usize,
    kind: EnvironmentKind,
}

impl ObservationEncoder {
    /// Create an encoder for the described environment
    pub fn new(descriptor: &EnvironmentDescriptor) -> Self {
        Self {
            num_agents: descriptor.num_agents,
            num_states: descriptor.num_states,
            kind: descriptor.kind.clone(),
        }
    }

    /// Length of the encoded signal
    pub fn signal_dim(&self) -> usize {
        match self.kind {
            EnvironmentKind::SocialLearning => self.num_states,
            EnvironmentKind::StrategicExperimentation(_) => 1,
        }
    }

    /// Length of the encoded neighbor-action vector
    pub fn neighbor_dim(&self) -> usize {
        match self.kind {
            EnvironmentKind::SocialLearning => self.num_agents * self.num_states,
            EnvironmentKind::StrategicExperimentation(_) => self.num_agents,
        }
    }

    /// Encode one agent's observation
    ///
    /// Fails if the observation variant does not match the environment, or
    /// if a strategic observation lacks its background increment. The
    /// absolute background signal is never substituted for the increment:
    /// the two live on different scales.
    pub fn encode(
        &self,
        agent_id: AgentId,
        observation: &Observation,
    ) -> Result<EncodedObservation, SimulationError> {
        match (&self.kind, observation) {
            (EnvironmentKind::SocialLearning, Observation::Social { signal, neighbor_actions }) => {
                Ok(EncodedObservation {
                    signal: one_hot(*signal, self.num_states),
                    neighbor_actions: encode_discrete_actions(
                        neighbor_actions.iter().map(|(&id, &action)| (id, action)),
                        agent_id,
                        self.num_agents,
                        self.num_states,
                    ),
                })
            }
            (
                EnvironmentKind::StrategicExperimentation(_),
                Observation::Strategic { background_increment, neighbor_allocations, .. },
            ) => {
                let increment = background_increment.ok_or(
                    SimulationError::MissingObservationField {
                        agent_id,
                        field: "background_increment",
                    },
                )?;
                let neighbor_actions = match neighbor_allocations {
                    Some(allocations) => encode_allocations(
                        allocations.iter().map(|(&id, &allocation)| (id, allocation)),
                        agent_id,
                        self.num_agents,
                    ),
                    None => vec![0.0; self.num_agents],
                };
                Ok(EncodedObservation { signal: vec![increment], neighbor_actions })
            }
            (kind, _) => Err(SimulationError::ObservationMismatch { agent_id, expected: kind.name() }),
        }
    }
}

/// Total observation dimension (signal plus neighbor actions)
pub fn observation_dimension(descriptor: &EnvironmentDescriptor) -> usize {
    let encoder = ObservationEncoder::new(descriptor);
    encoder.signal_dim() + encoder.neighbor_dim()
}

/// One-hot encode a categorical value; out-of-range values encode as no
/// signal (all zeros)
pub fn one_hot(value: StateId, num_categories: usize) -> Vec<f64> {
    let mut encoded = vec![0.0; num_categories];
    if let Some(slot) = encoded.get_mut(value) {
        *slot = 1.0;
    }
    encoded
}

/// Encode neighbors' discrete actions as `num_agents` one-hot slots
pub fn encode_discrete_actions<I>(
    reports: I,
    own_id: AgentId,
    num_agents: usize,
    num_states: usize,
) -> Vec<f64>
where
    I: IntoIterator<Item = (AgentId, usize)>,
{
    let mut encoded = vec![0.0; num_agents * num_states];
    for (neighbor, action) in reports {
        if neighbor == own_id || neighbor >= num_agents || action >= num_states {
            continue;
        }
        encoded[neighbor * num_states + action] = 1.0;
    }
    encoded
}

/// Encode neighbors' continuous allocations as `num_agents` scalars
pub fn encode_allocations<I>(reports: I, own_id: AgentId, num_agents: usize) -> Vec<f64>
where
    I: IntoIterator<Item = (AgentId, f64)>,
{
    let mut encoded = vec![0.0; num_agents];
    for (neighbor, allocation) in reports {
        if neighbor == own_id || neighbor >= num_agents {
            continue;
        }
        encoded[neighbor] = allocation;
    }
    encoded
}
