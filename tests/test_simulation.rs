use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use nalgebra::{Point2, Vector2};

use swarmlife::analysis::stats::TickStats;
use swarmlife::core::domain::{BoundaryPolicy, ExecutionModel, Params, Particle, ParticleId, SimState, SwarmId};
use swarmlife::core::error::SimError;
use swarmlife::core::matrix::PairParams;
use swarmlife::sim::runner::SimulationRunner;
use swarmlife::sim::world::Simulation;
use swarmlife::sim::{SimCommand, SimEvent};

mod common;
use common::{empty_params, ready_sim, scatter, uniform_matrix};

const PARALLEL: ExecutionModel = ExecutionModel::Parallel { batch_size: 256 };

fn swarm_params() -> Params {
    let mut params = Params {
        seed: 4,
        num_types: 3,
        particle_count: 10,
        ..Default::default()
    };
    params.swarm.count = 2;
    params.swarm.members = 20;
    params
}

// --- Lifecycle ---

#[test]
fn test_two_phase_initialisation() {
    let mut sim = Simulation::with_matrix(empty_params(2, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(2, 0.5, 1.0, 5.0))
        .unwrap();
    assert_eq!(sim.state(), SimState::Configured);
    assert!(matches!(sim.step(0.1), Err(SimError::NotReady(SimState::Configured))));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    sim.on_ready(move |s| {
        assert_eq!(s.state(), SimState::Ready);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    sim.populate().unwrap();
    assert_eq!(sim.state(), SimState::Ready);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(sim.populate().is_err(), "populate only runs once");

    let stats = sim.step(0.1).unwrap();
    assert_eq!(stats.tick, 1);

    sim.restart().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_rejects_bad_configuration() {
    let params = Params { num_types: 0, ..Default::default() };
    assert!(matches!(Simulation::new(params), Err(SimError::Config(_))));

    let params = empty_params(3, BoundaryPolicy::Wrap, PARALLEL);
    assert!(Simulation::with_matrix(params, uniform_matrix(2, 1.0, 1.0, 2.0)).is_err());

    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 1.0, 1.0, 2.0));
    assert!(sim.step(f64::NAN).is_err());
    assert!(sim.step(-0.1).is_err());
}

#[test]
fn test_populate_spawns_configured_counts() {
    let sim = {
        let mut sim = Simulation::new(swarm_params()).unwrap();
        sim.populate().unwrap();
        sim
    };

    assert_eq!(sim.len(), 10 + 2 * 20);
    assert_eq!(sim.swarms().len(), 2);
    assert_eq!(sim.particles().iter().filter(|p| p.swarm.is_none()).count(), 10);
    for swarm in sim.swarms() {
        assert_eq!(swarm.len(), 20);
        assert_eq!(swarm.generation, 0);
        for id in &swarm.members {
            assert_eq!(sim.particle(*id).unwrap().swarm, Some(swarm.id));
        }
    }
    assert!(sim.particles().windows(2).all(|w| w[0].id < w[1].id));
}

// --- Particle management ---

#[test]
fn test_spawn_validates_kind() {
    let mut sim = ready_sim(empty_params(2, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(2, 1.0, 1.0, 4.0));
    let err = sim.spawn_particle(Point2::origin(), 2).unwrap_err();
    assert!(matches!(err, SimError::InvalidKind { kind: 2, num_types: 2 }));

    let id = sim.spawn_particle(Point2::new(70.0, 0.0), 1).unwrap();
    let p = sim.particle(id).unwrap();
    assert!(p.position.x.abs() <= 50.0, "spawn position is mapped into the world");

    assert!(sim.set_particle_kind(id, 5).is_err());
    sim.set_particle_kind(id, 0).unwrap();
    assert_eq!(sim.particle(id).unwrap().kind, 0);
    assert!(matches!(
        sim.set_particle_kind(ParticleId(999), 0),
        Err(SimError::UnknownParticle(ParticleId(999)))
    ));
}

#[test]
fn test_remove_particle() {
    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 0.5, 1.0, 4.0));
    let a = sim.spawn_particle(Point2::new(0.0, 0.0), 0).unwrap();
    let b = sim.spawn_particle(Point2::new(1.0, 0.0), 0).unwrap();
    let c = sim.spawn_particle(Point2::new(2.0, 0.0), 0).unwrap();
    sim.step(0.05).unwrap();

    let removed = sim.remove_particle(b).unwrap();
    assert_eq!(removed.id, b);
    assert!(sim.remove_particle(b).is_none());
    assert!(sim.particle(b).is_none());
    assert_eq!(sim.len(), 2);

    // Both buffers stay aligned after the removal.
    sim.step(0.05).unwrap();
    assert_eq!(sim.particles().iter().map(|p| p.id).collect::<Vec<_>>(), vec![a, c]);

    let near = sim.query_nearby(Point2::new(1.0, 0.0), 5.0);
    assert!(!near.contains(&b));
    assert_eq!(near.len(), 2);
}

#[test]
fn test_query_nearby_respects_boundary() {
    for (policy, expect) in [(BoundaryPolicy::Wrap, true), (BoundaryPolicy::Clamp, false)] {
        let mut sim = ready_sim(empty_params(1, policy, PARALLEL), uniform_matrix(1, 0.0, 1.0, 2.0));
        let edge = sim.spawn_particle(Point2::new(49.0, 0.0), 0).unwrap();
        let middle = sim.spawn_particle(Point2::new(0.0, 0.0), 0).unwrap();

        let near = sim.query_nearby(Point2::new(-49.0, 0.0), 3.0);
        assert_eq!(near.contains(&edge), expect, "{:?}", policy);
        assert!(!near.contains(&middle));
    }
}

#[test]
fn test_query_nearby_sees_moved_particles() {
    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 0.0, 0.0, 0.0));
    scatter(&mut sim, 200, 80.0, 3);
    let all = sim.query_nearby(Point2::origin(), 100.0);
    assert_eq!(all.len(), 200);

    let fresh = sim.spawn_particle(Point2::new(10.0, 10.0), 0).unwrap();
    assert!(sim.query_nearby(Point2::new(10.0, 10.0), 0.5).contains(&fresh));
}

// --- Swarms ---

#[test]
fn test_swarm_membership_and_removal() {
    let mut sim = Simulation::new(swarm_params()).unwrap();
    sim.populate().unwrap();

    let swarm = SwarmId(1);
    let victim = sim.swarm(swarm).unwrap().members[3];
    sim.remove_particle(victim).unwrap();

    let s = sim.swarm(swarm).unwrap();
    assert_eq!(s.len(), 19);
    assert!(!s.members.contains(&victim));
    sim.step(0.02).unwrap();
}

#[test]
fn test_derived_swarm() {
    let mut sim = Simulation::new(swarm_params()).unwrap();
    sim.populate().unwrap();

    let child = sim.spawn_derived_swarm(SwarmId(0), Point2::new(10.0, 10.0), 5).unwrap();
    let c = sim.swarm(child).unwrap();
    let parent = sim.swarm(SwarmId(0)).unwrap();
    assert_eq!(c.generation, 1);
    assert_eq!(c.parent, Some(SwarmId(0)));
    assert_eq!(c.len(), 5);
    assert_eq!(c.internal.num_types(), parent.internal.num_types());
    assert_ne!(c.internal, parent.internal);

    let missing = sim.spawn_derived_swarm(SwarmId(42), Point2::origin(), 5);
    assert!(matches!(missing, Err(SimError::UnknownSwarm(SwarmId(42)))));
}

#[test]
fn test_swarm_centroid_across_seam() {
    let mut params = empty_params(2, BoundaryPolicy::Wrap, PARALLEL);
    params.swarm.spawn_radius = 1.0;
    let mut sim = ready_sim(params, uniform_matrix(2, 0.0, 0.0, 0.0));

    let id = sim.spawn_swarm(Point2::new(49.5, 0.0), 30).unwrap();
    sim.step(0.0).unwrap();

    let c = sim.swarm_centroid(id).unwrap();
    assert!(c.x.abs() > 48.0, "centroid {} should sit on the seam", c);
    assert!(c.y.abs() < 1.0);
}

#[test]
fn test_each_swarm_centers_on_its_own_members() {
    let mut params = empty_params(2, BoundaryPolicy::Clamp, PARALLEL);
    params.swarm.spawn_radius = 2.0;
    let mut sim = ready_sim(params, uniform_matrix(2, 0.0, 0.0, 0.0));
    scatter(&mut sim, 50, 90.0, 11);

    let left = sim.spawn_swarm(Point2::new(-30.0, 10.0), 12).unwrap();
    let right = sim.spawn_swarm(Point2::new(30.0, -10.0), 8).unwrap();
    let gone = sim.spawn_swarm(Point2::new(0.0, 40.0), 3).unwrap();
    for id in sim.swarm(gone).unwrap().members.clone() {
        sim.remove_particle(id).unwrap();
    }
    sim.step(0.0).unwrap();

    for id in [left, right] {
        let swarm = sim.swarm(id).unwrap();
        let n = swarm.len() as f64;
        let mean = swarm
            .members
            .iter()
            .map(|m| sim.particle(*m).unwrap().position.coords)
            .sum::<Vector2<f64>>()
            / n;
        let c = sim.swarm_centroid(id).unwrap();
        assert!((c.coords - mean).norm() < 1e-9, "{:?}: {} vs {}", id, c, mean);
    }
    // An emptied swarm keeps its spawn center.
    assert_eq!(sim.swarm_centroid(gone).unwrap(), Point2::new(0.0, 40.0));
}

// --- Shared matrix ---

#[test]
fn test_matrix_edits_apply_next_tick() {
    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Clamp, PARALLEL), uniform_matrix(1, 0.0, 0.5, 10.0));
    let a = sim.spawn_particle(Point2::new(0.0, 0.0), 0).unwrap();
    sim.spawn_particle(Point2::new(3.0, 0.0), 0).unwrap();

    sim.step(0.1).unwrap();
    assert_eq!(sim.particle(a).unwrap().velocity, Vector2::zeros());

    let handle = sim.matrix_handle();
    std::thread::spawn(move || handle.write().set_force(0, 0, 1.0))
        .join()
        .unwrap();

    sim.step(0.1).unwrap();
    assert!(sim.particle(a).unwrap().velocity.x > 0.0, "attraction toward the neighbour");
}

#[test]
fn test_swap_forces_and_restart_keep_handle() {
    let mut m = uniform_matrix(2, 0.0, 1.0, 5.0);
    m.set_force(0, 1, 1.0);
    m.set_force(1, 0, -1.0);
    let mut params = empty_params(2, BoundaryPolicy::Wrap, PARALLEL);
    params.particle_count = 25;
    let mut sim = ready_sim(params, m);
    let handle = sim.matrix_handle();

    sim.swap_forces();
    assert_eq!(sim.matrix().force(0, 1), -1.0);
    assert_eq!(handle.read().force(1, 0), 1.0);

    sim.step(0.02).unwrap();
    sim.restart().unwrap();
    assert!(Arc::ptr_eq(&handle, &sim.matrix_handle()));
    assert_eq!(sim.len(), 25);
    assert_eq!(sim.state(), SimState::Ready);
}

#[test]
fn test_non_finite_state_fails_the_tick() {
    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 1e308, 1.0, 2.0));
    sim.spawn_particle(Point2::new(0.0, 0.0), 0).unwrap();
    sim.spawn_particle(Point2::new(0.5, 0.5), 0).unwrap();

    assert!(matches!(sim.step(1.0), Err(SimError::NonFinite { .. })));
}

// --- Statistics ---

#[test]
fn test_tick_stats() {
    let mut particles = vec![
        Particle::new(ParticleId(0), Point2::origin(), 0),
        Particle::new(ParticleId(1), Point2::origin(), 2),
        Particle::new(ParticleId(2), Point2::origin(), 2),
    ];
    particles[0].velocity = Vector2::new(3.0, 4.0);
    particles[1].velocity = Vector2::new(0.0, 1.0);

    let stats = TickStats::collect(7, &particles, 3, 1);
    assert_eq!(stats.tick, 7);
    assert_eq!(stats.particle_count, 3);
    assert_eq!(stats.type_counts, vec![1, 0, 2]);
    assert!((stats.mean_speed - 2.0).abs() < 1e-12);
    assert_eq!(stats.max_speed, 5.0);
    assert!((stats.kinetic_energy - 13.0).abs() < 1e-12);
    assert_eq!(stats.swarm_count, 1);

    assert_eq!(TickStats::collect(0, &[], 2, 0).mean_speed, 0.0);
}

// --- Runner ---

fn drain(rx: crossbeam_channel::Receiver<SimEvent>) -> Vec<SimEvent> {
    rx.try_iter().collect()
}

#[test]
fn test_runner_event_sequence() {
    let params = Params {
        seed: 2,
        particle_count: 40,
        ..Default::default()
    };
    let sim = Simulation::new(params).unwrap();
    let (tx, rx) = unbounded();

    let sim = SimulationRunner::new(sim, 0.02).max_ticks(5).run(tx);
    assert_eq!(sim.tick(), 5);

    let events = drain(rx);
    let ready = events.iter().position(|e| matches!(e, SimEvent::Ready { particles: 40, .. }));
    assert!(ready.is_some());
    let ticks: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SimEvent::TickUpdate(s) => Some(s.tick),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    assert!(matches!(events.last(), Some(SimEvent::Finished)));
}

#[test]
fn test_runner_applies_commands_between_ticks() {
    let sim = ready_sim(empty_params(2, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(2, 0.5, 1.0, 5.0));
    let (tx, rx) = unbounded();
    let (cmd_tx, cmd_rx) = unbounded();

    cmd_tx
        .send(SimCommand::Spawn {
            position: Point2::new(1.0, 1.0),
            kind: 1,
        })
        .unwrap();
    cmd_tx
        .send(SimCommand::SetPair {
            i: 0,
            j: 9,
            pair: PairParams::new(1.0, 1.0, 1.0),
        })
        .unwrap();
    cmd_tx
        .send(SimCommand::SetPair {
            i: 1,
            j: 0,
            pair: PairParams::new(-0.75, 2.0, 6.0),
        })
        .unwrap();
    cmd_tx
        .send(SimCommand::SpawnSwarm {
            center: Point2::origin(),
            count: 4,
            parent: None,
        })
        .unwrap();
    cmd_tx.send(SimCommand::Remove(ParticleId(77))).unwrap();

    let sim = SimulationRunner::new(sim, 0.02)
        .max_ticks(2)
        .commands(cmd_rx)
        .run(tx);

    assert_eq!(sim.tick(), 2);
    assert_eq!(sim.len(), 5);
    assert_eq!(sim.swarms().len(), 1);
    assert_eq!(*sim.matrix().pair(1, 0), PairParams::new(-0.75, 2.0, 6.0));

    let rejected = drain(rx)
        .into_iter()
        .filter(|e| matches!(e, SimEvent::Log(msg) if msg.starts_with("Command rejected")))
        .count();
    assert_eq!(rejected, 2, "bad SetPair and unknown Remove");
}

#[test]
fn test_runner_stops_on_command_and_flag() {
    let sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 0.5, 1.0, 5.0));
    let (tx, _rx) = unbounded();
    let (cmd_tx, cmd_rx) = unbounded();
    cmd_tx.send(SimCommand::Stop).unwrap();
    let sim = SimulationRunner::new(sim, 0.02).commands(cmd_rx).run(tx);
    assert_eq!(sim.tick(), 0);

    let (tx, _rx) = unbounded();
    let runner = SimulationRunner::new(sim, 0.02);
    runner.stop_handle().store(true, Ordering::Relaxed);
    let sim = runner.run(tx);
    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_runner_halts_on_non_finite() {
    let mut sim = ready_sim(empty_params(1, BoundaryPolicy::Wrap, PARALLEL), uniform_matrix(1, 1e308, 1.0, 2.0));
    sim.spawn_particle(Point2::new(0.0, 0.0), 0).unwrap();
    sim.spawn_particle(Point2::new(0.5, 0.5), 0).unwrap();

    let (tx, rx) = unbounded();
    let sim = SimulationRunner::new(sim, 1.0).max_ticks(100).run(tx);
    assert_eq!(sim.tick(), 1);

    let events = drain(rx);
    assert!(events.iter().any(|e| matches!(e, SimEvent::Halted(_))));
    assert!(!events.iter().any(|e| matches!(e, SimEvent::TickUpdate(_))));
    assert!(matches!(events.last(), Some(SimEvent::Finished)));
}
