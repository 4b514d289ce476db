use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::core::error::{SimError, SimResult};

// --- Constants ---
pub const DEFAULT_BATCH_SIZE: usize = 256;

// --- Handles ---

/// Stable particle identity. Assigned at spawn, never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(pub u64);

/// Non-owning handle from a particle to the swarm that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub usize);

// --- Particle State ---

/// A single typed point particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    pub position: Point2<f64>,
    pub velocity: Vector2<f64>,
    /// Type index into the interaction matrices, `< num_types`.
    pub kind: usize,
    pub swarm: Option<SwarmId>,
}

impl Particle {
    pub fn new(id: ParticleId, position: Point2<f64>, kind: usize) -> Self {
        Self {
            id,
            position,
            velocity: Vector2::zeros(),
            kind,
            swarm: None,
        }
    }

    pub fn in_swarm(mut self, swarm: SwarmId) -> Self {
        self.swarm = Some(swarm);
        self
    }

    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|c| c.is_finite())
            && self.velocity.iter().all(|c| c.is_finite())
    }
}

// --- Policies ---

/// What happens to a particle that leaves the world rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Stop at the edge and lose the outward velocity component.
    Clamp,
    /// Re-enter from the opposite edge (torus topology).
    Wrap,
}

/// Neighbour source for the sequential engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborMode {
    BruteForce,
    /// Quadtree rebuilt every `rebuild_interval` ticks (and after any removal or spawn).
    QuadTree { rebuild_interval: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionModel {
    /// In-place, single-threaded, order-dependent update.
    Sequential { neighbors: NeighborMode },
    /// Double-buffered batch-parallel update over a consistent snapshot.
    Parallel { batch_size: usize },
}

impl Default for ExecutionModel {
    fn default() -> Self {
        ExecutionModel::Parallel { batch_size: DEFAULT_BATCH_SIZE }
    }
}

/// Two-phase initialisation: configure, then spawn, then ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Configured,
    Spawned,
    Ready,
}

// --- Configuration Types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub boundary: BoundaryPolicy,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            boundary: BoundaryPolicy::Wrap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    /// Velocity multiplier applied every tick, in [0, 1].
    pub friction: f64,
    /// Global force scale.
    pub dampening: f64,
    /// Extra weight on the short-range repulsion term.
    pub repulsion_effector: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            friction: 0.9,
            dampening: 1.0,
            repulsion_effector: 2.0,
        }
    }
}

/// Sampling ranges (inclusive) for freshly generated interaction matrices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixRanges {
    /// Magnitude range; the sign is drawn separately.
    pub force: (f64, f64),
    pub min_distance: (f64, f64),
    pub radius: (f64, f64),
}

impl Default for MatrixRanges {
    fn default() -> Self {
        Self {
            force: (0.3, 1.0),
            min_distance: (2.0, 5.0),
            radius: (8.0, 16.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmParams {
    /// Swarms spawned by `populate`, in addition to the free particles.
    pub count: usize,
    pub members: usize,
    pub spawn_radius: f64,
    /// Per-cell perturbation applied when deriving a child swarm.
    pub mutation: f64,
}

impl Default for SwarmParams {
    fn default() -> Self {
        Self {
            count: 0,
            members: 150,
            spawn_radius: 10.0,
            mutation: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub seed: u64,
    /// Worker threads for the parallel model; 0 uses the global rayon pool.
    pub threads: usize,
    pub num_types: usize,
    /// Free (swarm-less) particles spawned by `populate`.
    pub particle_count: usize,
    pub world: WorldConfig,
    pub physics: PhysicsParams,
    pub ranges: MatrixRanges,
    pub swarm: SwarmParams,
    pub execution: ExecutionModel,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            seed: 0,
            threads: 0,
            num_types: 6,
            particle_count: 1200,
            world: WorldConfig::default(),
            physics: PhysicsParams::default(),
            ranges: MatrixRanges::default(),
            swarm: SwarmParams::default(),
            execution: ExecutionModel::default(),
        }
    }
}

impl Params {
    /// Rejects configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> SimResult<()> {
        if self.num_types == 0 {
            return Err(SimError::Config("num_types must be at least 1".into()));
        }

        let w = &self.world;
        if !(w.width.is_finite() && w.width > 0.0 && w.height.is_finite() && w.height > 0.0) {
            return Err(SimError::Config(format!(
                "world extents must be positive and finite, got {}x{}",
                w.width, w.height
            )));
        }

        let p = &self.physics;
        if !(0.0..=1.0).contains(&p.friction) {
            return Err(SimError::Config(format!("friction {} outside [0, 1]", p.friction)));
        }
        if p.dampening < 0.0 || p.repulsion_effector < 0.0 {
            return Err(SimError::Config(
                "dampening and repulsion_effector must be non-negative".into(),
            ));
        }

        check_range("force", self.ranges.force)?;
        check_range("min_distance", self.ranges.min_distance)?;
        check_range("radius", self.ranges.radius)?;

        if self.ranges.min_distance.1 > self.ranges.radius.0 {
            log::warn!(
                "min_distance range {:?} overlaps radius range {:?}; some pairs will repel past their attraction zone",
                self.ranges.min_distance,
                self.ranges.radius
            );
        }

        if self.swarm.spawn_radius < 0.0 || self.swarm.mutation < 0.0 {
            return Err(SimError::Config(
                "swarm spawn_radius and mutation must be non-negative".into(),
            ));
        }

        match self.execution {
            ExecutionModel::Parallel { batch_size: 0 } => {
                Err(SimError::Config("batch_size must be at least 1".into()))
            }
            ExecutionModel::Sequential {
                neighbors: NeighborMode::QuadTree { rebuild_interval: 0 },
            } => Err(SimError::Config("rebuild_interval must be at least 1".into())),
            _ => Ok(()),
        }
    }
}

fn check_range(name: &str, (lo, hi): (f64, f64)) -> SimResult<()> {
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(SimError::Config(format!("{} range ({}, {}) is not a valid interval", name, lo, hi)));
    }
    if lo < 0.0 {
        return Err(SimError::Config(format!("{} range must be non-negative", name)));
    }
    Ok(())
}
