use nalgebra::Point2;

use crate::analysis::stats::TickStats;
use crate::core::domain::{ParticleId, SwarmId};
use crate::core::matrix::PairParams;

/// Events emitted by the runner to the main thread.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// The population is spawned and ticking can begin.
    Ready { particles: usize, swarms: usize },

    /// Diagnostic log message.
    Log(String),

    /// A completed tick with its statistics.
    TickUpdate(TickStats),

    /// Ticks per second, measured on the worker.
    Heartbeat(f64),

    /// A step failed; the loop has stopped.
    Halted(String),

    /// The runner has exited its loop.
    Finished,
}

/// Mutations queued for the runner. They are applied between ticks, so
/// they never race a step.
#[derive(Debug, Clone)]
pub enum SimCommand {
    Spawn { position: Point2<f64>, kind: usize },
    Remove(ParticleId),
    SetKind { id: ParticleId, kind: usize },
    /// Edit one cell of the global matrix.
    SetPair { i: usize, j: usize, pair: PairParams },
    SwapForces,
    SpawnSwarm { center: Point2<f64>, count: usize, parent: Option<SwarmId> },
    Restart,
    Stop,
}

pub mod runner;
pub mod swarm;
pub mod world;
