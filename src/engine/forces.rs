use nalgebra::Vector2;

use crate::core::domain::{Particle, PhysicsParams};
use crate::core::matrix::{InteractionMatrix, PairParams};
use crate::core::spatial::WorldBounds;

/// Separations below this are treated as coincident and contribute no force.
pub const DISTANCE_EPSILON: f64 = 1e-9;

/// Chooses the interaction matrix that governs a particle pair.
/// Implementations must be Thread-Safe (Sync): the parallel scheduler
/// reads them from every worker.
pub trait MatrixScope: Sync {
    /// Matrix used for the force `q` exerts on `p`.
    fn matrix_for(&self, p: &Particle, q: &Particle) -> &InteractionMatrix;

    /// Largest reach of any pair this scope can return.
    fn max_range(&self) -> f64;
}

impl MatrixScope for InteractionMatrix {
    #[inline]
    fn matrix_for(&self, _p: &Particle, _q: &Particle) -> &InteractionMatrix {
        self
    }

    fn max_range(&self) -> f64 {
        InteractionMatrix::max_range(self)
    }
}

/// Force on a particle from one neighbour displaced by `delta`.
///
/// Below `min_distance` a push away from the neighbour applies with weight
/// `|force| * repulsion_effector`; below `radius` the signed `force` pulls
/// (or pushes, when negative) along `delta`. Both ramps fall linearly from
/// 1 at contact to 0 at their threshold, and both may apply at once.
#[inline]
pub fn pair_force(pair: &PairParams, delta: Vector2<f64>, physics: &PhysicsParams) -> Vector2<f64> {
    // 1. Cull on squared distance before paying for the sqrt
    let reach = pair.reach();
    let dist_sq = delta.norm_squared();
    if dist_sq >= reach * reach {
        return Vector2::zeros();
    }

    // 2. Coincident particles have no direction
    let distance = dist_sq.sqrt();
    if distance < DISTANCE_EPSILON {
        return Vector2::zeros();
    }
    let dir = delta / distance;

    let mut total = Vector2::zeros();
    // 3. Repulsion: always away from q, strongest at contact
    if distance < pair.min_distance {
        let scale = 1.0 - distance / pair.min_distance;
        total -= dir * (pair.force.abs() * physics.repulsion_effector * physics.dampening * scale);
    }
    // 4. Attraction (or repulsion for negative force), fading to 0 at radius
    if distance < pair.radius {
        let scale = 1.0 - distance / pair.radius;
        total += dir * (pair.force * physics.dampening * scale);
    }
    total
}

/// Everything needed to move one particle forward by one tick.
pub struct ForceModel<'a, S: MatrixScope + ?Sized> {
    pub scope: &'a S,
    pub physics: &'a PhysicsParams,
    pub world: &'a WorldBounds,
}

impl<'a, S: MatrixScope + ?Sized> ForceModel<'a, S> {
    pub fn new(scope: &'a S, physics: &'a PhysicsParams, world: &'a WorldBounds) -> Self {
        Self { scope, physics, world }
    }

    pub fn max_range(&self) -> f64 {
        self.scope.max_range()
    }

    /// Net force on `p` from `neighbors`. `p` itself may appear in the
    /// iterator and is skipped.
    #[inline]
    pub fn net_force<'p, I>(&self, p: &Particle, neighbors: I) -> Vector2<f64>
    where
        I: IntoIterator<Item = &'p Particle>,
    {
        let mut total = Vector2::zeros();
        for q in neighbors {
            if q.id == p.id {
                continue;
            }
            let pair = self.scope.matrix_for(p, q).lookup(p.kind, q.kind);
            let delta = self.world.delta(&p.position, &q.position);
            total += pair_force(pair, delta, self.physics);
        }
        total
    }

    /// Integrates `force` over `dt` and applies the boundary policy.
    #[inline]
    pub fn advance(&self, p: &Particle, force: Vector2<f64>, dt: f64) -> Particle {
        let mut next = *p;
        // Semi-implicit Euler: friction acts on the updated velocity
        next.velocity += force * dt;
        next.velocity *= self.physics.friction;
        next.position += next.velocity * dt;
        self.world.confine(&mut next.position, &mut next.velocity);
        next
    }
}
