#![allow(dead_code)]

use nalgebra::Point2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use swarmlife::core::domain::{BoundaryPolicy, ExecutionModel, Params, WorldConfig};
use swarmlife::core::matrix::{InteractionMatrix, PairParams};
use swarmlife::sim::world::Simulation;

/// Params with no automatic population, so tests place every particle.
pub fn empty_params(num_types: usize, boundary: BoundaryPolicy, execution: ExecutionModel) -> Params {
    Params {
        num_types,
        particle_count: 0,
        world: WorldConfig {
            width: 100.0,
            height: 100.0,
            boundary,
        },
        execution,
        ..Default::default()
    }
}

pub fn uniform_matrix(num_types: usize, force: f64, min_distance: f64, radius: f64) -> InteractionMatrix {
    InteractionMatrix::uniform(num_types, PairParams::new(force, min_distance, radius))
}

/// A populated (empty) simulation ready to step.
pub fn ready_sim(params: Params, matrix: InteractionMatrix) -> Simulation {
    let mut sim = Simulation::with_matrix(params, matrix).expect("valid test params");
    sim.populate().expect("populate");
    sim
}

/// Spawns `n` particles uniformly inside the middle `spread x spread` square.
pub fn scatter(sim: &mut Simulation, n: usize, spread: f64, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let half = spread / 2.0;
    for _ in 0..n {
        let p = Point2::new(rng.gen_range(-half..half), rng.gen_range(-half..half));
        let kind = rng.gen_range(0..sim.num_types());
        sim.spawn_particle(p, kind).expect("valid kind");
    }
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "expected {} ~= {} (tol {})", a, b, tol);
}
