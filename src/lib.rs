pub mod analysis;
pub mod core;
pub mod engine;
pub mod sim;

pub use crate::analysis::stats::TickStats;
pub use crate::core::domain::{
    BoundaryPolicy, ExecutionModel, NeighborMode, Params, Particle, ParticleId, SimState, SwarmId,
};
pub use crate::core::error::{SimError, SimResult};
pub use crate::core::matrix::{InteractionMatrix, PairParams};
pub use crate::sim::world::{SharedMatrix, Simulation};
