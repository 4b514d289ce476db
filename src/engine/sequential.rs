use crate::core::domain::{NeighborMode, Particle};
use crate::core::quadtree::QuadTree;
use crate::core::spatial::WorldBounds;
use crate::engine::forces::{ForceModel, MatrixScope};

/// Single-threaded reference stepper.
///
/// Particles are updated in place in index order, so particle `i` sees the
/// already-advanced state of every `j < i` and the previous state of every
/// `j > i`. The result therefore depends on storage order.
pub struct ForceEngine {
    mode: NeighborMode,
    tree: QuadTree,
    scratch: Vec<usize>,
    ticks_since_rebuild: u32,
    indexed: usize,
    dirty: bool,
}

impl ForceEngine {
    pub fn new(mode: NeighborMode, world: &WorldBounds) -> Self {
        Self {
            mode,
            tree: QuadTree::new(world.rect()),
            scratch: Vec::new(),
            ticks_since_rebuild: 0,
            indexed: 0,
            dirty: true,
        }
    }

    pub fn mode(&self) -> NeighborMode {
        self.mode
    }

    /// The spatial index as of the last rebuild.
    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Forces a rebuild before the next neighbour query. Called whenever
    /// particles are added, removed or reordered.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn step<S: MatrixScope + ?Sized>(&mut self, particles: &mut [Particle], model: &ForceModel<'_, S>, dt: f64) {
        match self.mode {
            NeighborMode::BruteForce => {
                for i in 0..particles.len() {
                    // Copy out so the neighbour scan can borrow the slice
                    let p = particles[i];
                    let force = model.net_force(&p, particles.iter());
                    particles[i] = model.advance(&p, force, dt);
                }
            }
            NeighborMode::QuadTree { rebuild_interval } => {
                if self.dirty || self.indexed != particles.len() || self.ticks_since_rebuild >= rebuild_interval {
                    self.rebuild(particles, model.world);
                }
                self.ticks_since_rebuild += 1;

                // Tree keys are slice indices; stored positions lag by up to
                // `rebuild_interval` ticks.

                let reach = model.max_range();
                for i in 0..particles.len() {
                    let p = particles[i];
                    self.scratch.clear();
                    model.world.query_tree(&self.tree, p.position, reach, &mut self.scratch);
                    let view: &[Particle] = particles;
                    let force = model.net_force(&p, self.scratch.iter().map(|&j| &view[j]));
                    particles[i] = model.advance(&p, force, dt);
                }
            }
        }
    }

    fn rebuild(&mut self, particles: &[Particle], world: &WorldBounds) {
        self.tree.reset(world.rect());
        for (i, p) in particles.iter().enumerate() {
            let inserted = self.tree.insert(i, p.position);
            debug_assert!(inserted, "particle {:?} outside world at {}", p.id, p.position);
        }
        self.indexed = particles.len();
        self.ticks_since_rebuild = 0;
        self.dirty = false;
        log::debug!(
            "quadtree rebuilt: {} entries, {} nodes",
            self.tree.len(),
            self.tree.node_count()
        );
    }
}
