use nalgebra::{Point2, Vector2};
use rand::Rng;

use crate::core::domain::{Particle, ParticleId, SwarmId};
use crate::core::matrix::InteractionMatrix;
use crate::core::spatial::WorldBounds;
use crate::engine::forces::MatrixScope;

/// A group of particles with its own interaction rules.
///
/// Members interact with each other through `internal` and with every
/// other particle through `external`. Particles refer back to their swarm
/// only by [`SwarmId`]; the swarm owns the membership list.
#[derive(Debug, Clone)]
pub struct Swarm {
    pub id: SwarmId,
    pub members: Vec<ParticleId>,
    pub center: Point2<f64>,
    pub internal: InteractionMatrix,
    pub external: InteractionMatrix,
    /// 0 for a fresh draw, parent's generation + 1 for a derived swarm.
    pub generation: u32,
    pub parent: Option<SwarmId>,
}

impl Swarm {
    pub fn new(id: SwarmId, center: Point2<f64>, internal: InteractionMatrix, external: InteractionMatrix) -> Self {
        assert_eq!(
            internal.num_types(),
            external.num_types(),
            "swarm matrices must agree on the type count"
        );
        Self {
            id,
            members: Vec::new(),
            center,
            internal,
            external,
            generation: 0,
            parent: None,
        }
    }

    /// A child swarm whose matrices are this swarm's, perturbed by `mutation`.
    pub fn derive<R: Rng + ?Sized>(&self, id: SwarmId, center: Point2<f64>, mutation: f64, rng: &mut R) -> Self {
        Self {
            id,
            members: Vec::new(),
            center,
            internal: self.internal.mutate(mutation, rng),
            external: self.external.mutate(mutation, rng),
            generation: self.generation + 1,
            parent: Some(self.id),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn remove_member(&mut self, id: ParticleId) -> bool {
        match self.members.iter().position(|&m| m == id) {
            Some(i) => {
                self.members.remove(i);
                true
            }
            None => false,
        }
    }

    /// Recomputes `center` from the member positions gathered this tick. A
    /// swarm with no surviving members keeps its last center.
    pub fn recompute_center(&mut self, positions: &[Point2<f64>], world: &WorldBounds) {
        if let Some(c) = world.centroid(positions.iter().copied()) {
            self.center = c;
        }
    }
}

/// Uniform random point in the disc of `radius` around `center`.
pub fn spawn_offset<R: Rng + ?Sized>(center: Point2<f64>, radius: f64, rng: &mut R) -> Point2<f64> {
    if radius <= 0.0 {
        return center;
    }
    let r = radius * rng.gen_range(0.0..=1.0f64).sqrt();
    let theta = rng.gen_range(0.0..std::f64::consts::TAU);
    center + Vector2::new(r * theta.cos(), r * theta.sin())
}

/// Resolves the matrix for a pair: same swarm uses the swarm's internal
/// rules, a swarm member facing anyone else uses the swarm's external
/// rules, and free particles use the global matrix.
pub struct ScopedMatrices<'a> {
    pub global: &'a InteractionMatrix,
    pub swarms: &'a [Swarm],
}

impl MatrixScope for ScopedMatrices<'_> {
    #[inline]
    fn matrix_for(&self, p: &Particle, q: &Particle) -> &InteractionMatrix {
        match p.swarm.and_then(|id| self.swarms.get(id.0)) {
            Some(s) if q.swarm == Some(s.id) => &s.internal,
            Some(s) => &s.external,
            None => self.global,
        }
    }

    fn max_range(&self) -> f64 {
        self.swarms
            .iter()
            .map(|s| s.internal.max_range().max(s.external.max_range()))
            .fold(self.global.max_range(), f64::max)
    }
}
