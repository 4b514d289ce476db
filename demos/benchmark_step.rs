use std::time::Instant;

use swarmlife::core::domain::{ExecutionModel, NeighborMode, Params};
use swarmlife::sim::world::Simulation;

fn time_model(label: &str, execution: ExecutionModel, ticks: u64) {
    let params = Params {
        seed: 7,
        particle_count: 2000,
        execution,
        ..Default::default()
    };

    let mut sim = Simulation::new(params).expect("valid benchmark params");
    sim.populate().expect("populate");

    let start = Instant::now();
    for _ in 0..ticks {
        sim.step(0.02).expect("step");
    }
    let duration = start.elapsed();

    println!(
        "{:<24} {} ticks took: {:?} ({:.1} ticks/s)",
        label,
        ticks,
        duration,
        ticks as f64 / duration.as_secs_f64()
    );
}

fn main() {
    let ticks = 50;
    time_model("parallel (batch 256)", ExecutionModel::Parallel { batch_size: 256 }, ticks);
    time_model(
        "sequential brute force",
        ExecutionModel::Sequential { neighbors: NeighborMode::BruteForce },
        ticks,
    );
    time_model(
        "sequential quadtree",
        ExecutionModel::Sequential { neighbors: NeighborMode::QuadTree { rebuild_interval: 1 } },
        ticks,
    );
}
