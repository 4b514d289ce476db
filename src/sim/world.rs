use std::sync::Arc;

use nalgebra::Point2;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::analysis::stats::TickStats;
use crate::core::domain::{ExecutionModel, Params, Particle, ParticleId, SimState, SwarmId};
use crate::core::error::{SimError, SimResult};
use crate::core::matrix::InteractionMatrix;
use crate::core::quadtree::QuadTree;
use crate::core::spatial::WorldBounds;
use crate::engine::forces::ForceModel;
use crate::engine::parallel::ParallelStepScheduler;
use crate::engine::sequential::ForceEngine;
use crate::sim::swarm::{spawn_offset, ScopedMatrices, Swarm};

/// The live global matrix, shared with editors. Each tick holds a read
/// lock for its whole duration, so edits land between ticks.
pub type SharedMatrix = Arc<RwLock<InteractionMatrix>>;

type ReadyCallback = Box<dyn FnMut(&Simulation) + Send>;

enum Stepper {
    Sequential(ForceEngine),
    Parallel(ParallelStepScheduler),
}

impl Stepper {
    fn build(params: &Params, world: &WorldBounds) -> SimResult<Self> {
        Ok(match params.execution {
            ExecutionModel::Sequential { neighbors } => Stepper::Sequential(ForceEngine::new(neighbors, world)),
            ExecutionModel::Parallel { batch_size } => {
                Stepper::Parallel(ParallelStepScheduler::new(batch_size, params.threads)?)
            }
        })
    }

    fn removed(&mut self, index: usize) {
        match self {
            Stepper::Sequential(engine) => engine.invalidate(),
            Stepper::Parallel(scheduler) => scheduler.remove_at(index),
        }
    }

    fn inserted(&mut self) {
        if let Stepper::Sequential(engine) = self {
            engine.invalidate();
        }
    }

    fn reset(&mut self) {
        match self {
            Stepper::Sequential(engine) => engine.invalidate(),
            Stepper::Parallel(scheduler) => scheduler.clear(),
        }
    }
}

/// One simulation: matrix, particles, swarms, stepper and RNG.
///
/// Construction only configures (`SimState::Configured`); [`Simulation::populate`]
/// spawns the initial population and marks the simulation ready. Mutation
/// entry points take `&mut self` and therefore never overlap a `step`.
///
/// Particles are stored in ascending id order: new ids are always larger
/// than existing ones and removal preserves order.
pub struct Simulation {
    params: Params,
    world: WorldBounds,
    state: SimState,
    matrix: SharedMatrix,
    particles: Vec<Particle>,
    swarms: Vec<Swarm>,
    stepper: Stepper,
    query_index: QuadTree,
    query_stale: bool,
    /// Per-swarm member positions, refilled at the start of every tick.
    member_positions: Vec<Vec<Point2<f64>>>,
    rng: ChaCha8Rng,
    next_id: u64,
    tick: u64,
    on_ready: Option<ReadyCallback>,
}

impl Simulation {
    /// Validates `params` and draws the global matrix from the configured ranges.
    pub fn new(params: Params) -> SimResult<Self> {
        params.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let matrix = InteractionMatrix::generate(params.num_types, &params.ranges, &mut rng);
        Self::assemble(params, matrix, rng)
    }

    /// Like [`Simulation::new`] but with a caller-supplied global matrix.
    pub fn with_matrix(params: Params, matrix: InteractionMatrix) -> SimResult<Self> {
        params.validate()?;
        if matrix.num_types() != params.num_types {
            return Err(SimError::Config(format!(
                "matrix has {} types, params expect {}",
                matrix.num_types(),
                params.num_types
            )));
        }
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Self::assemble(params, matrix, rng)
    }

    fn assemble(params: Params, matrix: InteractionMatrix, rng: ChaCha8Rng) -> SimResult<Self> {
        let world = WorldBounds::from_config(&params.world);
        let stepper = Stepper::build(&params, &world)?;

        log::info!(
            "configured: {} types, {}x{} world ({:?}), {:?}",
            params.num_types,
            params.world.width,
            params.world.height,
            params.world.boundary,
            params.execution
        );

        Ok(Self {
            query_index: QuadTree::new(world.rect()),
            params,
            world,
            state: SimState::Configured,
            matrix: Arc::new(RwLock::new(matrix)),
            particles: Vec::new(),
            swarms: Vec::new(),
            stepper,
            query_stale: true,
            member_positions: Vec::new(),
            rng,
            next_id: 0,
            tick: 0,
            on_ready: None,
        })
    }

    /// Registers a callback fired each time the simulation becomes ready
    /// (after `populate` and after every `restart`).
    pub fn on_ready(&mut self, callback: impl FnMut(&Simulation) + Send + 'static) {
        self.on_ready = Some(Box::new(callback));
    }

    // --- Lifecycle ---

    /// Spawns the configured free particles and swarms, then marks the
    /// simulation ready.
    pub fn populate(&mut self) -> SimResult<()> {
        if self.state != SimState::Configured {
            return Err(SimError::NotReady(self.state));
        }

        let (hx, hy) = (self.world.half_extents().x, self.world.half_extents().y);
        for _ in 0..self.params.particle_count {
            let position = Point2::new(self.rng.gen_range(-hx..hx), self.rng.gen_range(-hy..hy));
            let kind = self.rng.gen_range(0..self.params.num_types);
            let id = self.allocate_id();
            self.push_particle(Particle::new(id, position, kind));
        }

        for _ in 0..self.params.swarm.count {
            let center = Point2::new(self.rng.gen_range(-hx..hx), self.rng.gen_range(-hy..hy));
            self.spawn_swarm(center, self.params.swarm.members)?;
        }
        self.state = SimState::Spawned;

        self.mark_ready();
        Ok(())
    }

    /// Clears particles and swarms, redraws the global matrix in place (so
    /// existing [`SharedMatrix`] handles stay valid) and populates again.
    pub fn restart(&mut self) -> SimResult<()> {
        self.particles.clear();
        self.swarms.clear();
        self.stepper.reset();
        self.query_stale = true;
        self.tick = 0;
        *self.matrix.write() = InteractionMatrix::generate(self.params.num_types, &self.params.ranges, &mut self.rng);
        self.state = SimState::Configured;
        log::info!("restarting simulation");
        self.populate()
    }

    fn mark_ready(&mut self) {
        self.state = SimState::Ready;
        log::info!(
            "ready: {} particles, {} swarms",
            self.particles.len(),
            self.swarms.len()
        );
        if let Some(mut callback) = self.on_ready.take() {
            callback(self);
            self.on_ready = Some(callback);
        }
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Ticks completed since the last (re)start.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // --- Configuration ---

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn num_types(&self) -> usize {
        self.params.num_types
    }

    /// `(width, height)`.
    pub fn world_extents(&self) -> (f64, f64) {
        self.world.extents()
    }

    pub fn world(&self) -> &WorldBounds {
        &self.world
    }

    // --- Interaction matrix ---

    pub fn matrix_handle(&self) -> SharedMatrix {
        Arc::clone(&self.matrix)
    }

    pub fn matrix(&self) -> RwLockReadGuard<'_, InteractionMatrix> {
        self.matrix.read()
    }

    pub fn matrix_mut(&self) -> RwLockWriteGuard<'_, InteractionMatrix> {
        self.matrix.write()
    }

    /// Transposes the global force table.
    pub fn swap_forces(&self) {
        self.matrix.write().transpose_forces();
    }

    // --- Stepping ---

    /// Advances the simulation by `dt`.
    ///
    /// Swarm centers are refreshed first, then the stepper runs under a
    /// read lock on the global matrix. A particle that ends the tick with a
    /// non-finite position or velocity fails the step.
    pub fn step(&mut self, dt: f64) -> SimResult<TickStats> {
        if self.state != SimState::Ready {
            return Err(SimError::NotReady(self.state));
        }
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::Config(format!("dt must be finite and non-negative, got {}", dt)));
        }

        // 1. Swarm centers from the pre-step positions
        self.refresh_swarm_centers();

        // 2. Step under one read guard; matrix edits wait for the next tick
        {
            let matrix = self.matrix.read();
            let scope = ScopedMatrices {
                global: &matrix,
                swarms: &self.swarms,
            };
            let model = ForceModel::new(&scope, &self.params.physics, &self.world);
            match &mut self.stepper {
                Stepper::Sequential(engine) => engine.step(&mut self.particles, &model, dt),
                Stepper::Parallel(scheduler) => scheduler.step(&mut self.particles, &model, dt),
            }
        }

        self.tick += 1;
        self.query_stale = true;

        // 3. Any non-finite particle fails the tick
        if let Some(p) = self.particles.iter().find(|p| !p.is_finite()) {
            return Err(SimError::NonFinite { id: p.id });
        }

        Ok(TickStats::collect(
            self.tick,
            &self.particles,
            self.params.num_types,
            self.swarms.len(),
        ))
    }

    /// One pass over the particles buckets swarm members, then each swarm
    /// takes the centroid of its own bucket.
    fn refresh_swarm_centers(&mut self) {
        if self.swarms.is_empty() {
            return;
        }
        self.member_positions.resize_with(self.swarms.len(), Vec::new);
        for bucket in &mut self.member_positions {
            bucket.clear();
        }
        for p in &self.particles {
            if let Some(bucket) = p.swarm.and_then(|s| self.member_positions.get_mut(s.0)) {
                bucket.push(p.position);
            }
        }
        for (swarm, positions) in self.swarms.iter_mut().zip(&self.member_positions) {
            swarm.recompute_center(positions, &self.world);
        }
    }

    // --- Particles ---

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.index_of(id).map(|i| &self.particles[i])
    }

    fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.particles.binary_search_by_key(&id, |p| p.id).ok()
    }

    fn allocate_id(&mut self) -> ParticleId {
        let id = ParticleId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
        self.stepper.inserted();
        self.query_stale = true;
    }

    fn check_kind(&self, kind: usize) -> SimResult<()> {
        if kind >= self.params.num_types {
            return Err(SimError::InvalidKind {
                kind,
                num_types: self.params.num_types,
            });
        }
        Ok(())
    }

    /// Adds a free particle at rest. The position is mapped into the world first.
    pub fn spawn_particle(&mut self, position: Point2<f64>, kind: usize) -> SimResult<ParticleId> {
        self.check_kind(kind)?;
        let id = self.allocate_id();
        let position = self.world.confine_point(position);
        self.push_particle(Particle::new(id, position, kind));
        Ok(id)
    }

    /// Removes a particle from every buffer, index and swarm. `None` if it
    /// was already gone.
    pub fn remove_particle(&mut self, id: ParticleId) -> Option<Particle> {
        let index = self.index_of(id)?;
        let removed = self.particles.remove(index);
        self.stepper.removed(index);
        self.query_stale = true;

        if let Some(swarm) = removed.swarm.and_then(|s| self.swarms.get_mut(s.0)) {
            swarm.remove_member(id);
        }
        Some(removed)
    }

    pub fn set_particle_kind(&mut self, id: ParticleId, kind: usize) -> SimResult<()> {
        self.check_kind(kind)?;
        let index = self.index_of(id).ok_or(SimError::UnknownParticle(id))?;
        self.particles[index].kind = kind;
        Ok(())
    }

    /// Ids of all particles within `radius` of `position`, measured across
    /// the torus seams when the world wraps.
    pub fn query_nearby(&mut self, position: Point2<f64>, radius: f64) -> Vec<ParticleId> {
        if self.query_stale {
            self.query_index.reset(self.world.rect());
            for (i, p) in self.particles.iter().enumerate() {
                self.query_index.insert(i, p.position);
            }
            self.query_stale = false;
        }

        let mut candidates = Vec::new();
        self.world.query_tree(&self.query_index, position, radius, &mut candidates);

        let r2 = radius * radius;
        candidates
            .into_iter()
            .map(|i| &self.particles[i])
            .filter(|p| self.world.distance_sq(&position, &p.position) <= r2)
            .map(|p| p.id)
            .collect()
    }

    // --- Swarms ---

    pub fn swarms(&self) -> &[Swarm] {
        &self.swarms
    }

    pub fn swarm(&self, id: SwarmId) -> Option<&Swarm> {
        self.swarms.get(id.0)
    }

    /// Center of a swarm as of the last tick (or its spawn point).
    pub fn swarm_centroid(&self, id: SwarmId) -> Option<Point2<f64>> {
        self.swarm(id).map(|s| s.center)
    }

    /// Spawns a swarm with freshly drawn internal and external matrices and
    /// `count` members scattered around `center`.
    pub fn spawn_swarm(&mut self, center: Point2<f64>, count: usize) -> SimResult<SwarmId> {
        let id = SwarmId(self.swarms.len());
        let internal = InteractionMatrix::generate(self.params.num_types, &self.params.ranges, &mut self.rng);
        let external = InteractionMatrix::generate(self.params.num_types, &self.params.ranges, &mut self.rng);
        let swarm = Swarm::new(id, self.world.confine_point(center), internal, external);
        self.insert_swarm(swarm, count)
    }

    /// Spawns a child of `parent` whose matrices are the parent's, mutated
    /// by the configured swarm mutation.
    pub fn spawn_derived_swarm(&mut self, parent: SwarmId, center: Point2<f64>, count: usize) -> SimResult<SwarmId> {
        let id = SwarmId(self.swarms.len());
        let center = self.world.confine_point(center);
        let mutation = self.params.swarm.mutation;
        let child = self
            .swarms
            .get(parent.0)
            .ok_or(SimError::UnknownSwarm(parent))?
            .derive(id, center, mutation, &mut self.rng);
        self.insert_swarm(child, count)
    }

    fn insert_swarm(&mut self, mut swarm: Swarm, count: usize) -> SimResult<SwarmId> {
        if swarm.internal.num_types() != self.params.num_types {
            return Err(SimError::Config(format!(
                "swarm matrices have {} types, simulation has {}",
                swarm.internal.num_types(),
                self.params.num_types
            )));
        }

        let id = swarm.id;
        let radius = self.params.swarm.spawn_radius;
        for _ in 0..count {
            let position = self.world.confine_point(spawn_offset(swarm.center, radius, &mut self.rng));
            let kind = self.rng.gen_range(0..self.params.num_types);
            let pid = self.allocate_id();
            swarm.members.push(pid);
            self.push_particle(Particle::new(pid, position, kind).in_swarm(id));
        }

        log::info!(
            "swarm {:?} spawned: {} members, generation {}",
            id,
            count,
            swarm.generation
        );
        self.swarms.push(swarm);
        Ok(id)
    }
}
