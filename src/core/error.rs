use thiserror::Error;

use crate::core::domain::{ParticleId, SimState, SwarmId};

/// Errors surfaced by the simulation context.
///
/// Per-tick numerical edge cases (zero distance, empty neighbourhoods) are
/// never errors; they contribute zero force.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("particle type {kind} out of range (num_types = {num_types})")]
    InvalidKind { kind: usize, num_types: usize },

    #[error("unknown swarm {0:?}")]
    UnknownSwarm(SwarmId),

    #[error("unknown particle {0:?}")]
    UnknownParticle(ParticleId),

    #[error("simulation not ready (state: {0:?})")]
    NotReady(SimState),

    /// A particle's position or velocity left the finite range. The tick loop halts.
    #[error("particle {id:?} produced a non-finite state")]
    NonFinite { id: ParticleId },
}

pub type SimResult<T> = Result<T, SimError>;
