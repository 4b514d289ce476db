use serde::Serialize;

use crate::core::domain::Particle;

/// Summary of the population after a tick.
/// Used for telemetry and for the runner's progress events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickStats {
    pub tick: u64,
    pub particle_count: usize,
    /// Index `k` holds the number of particles of type `k`.
    pub type_counts: Vec<usize>,
    pub mean_speed: f64,
    pub max_speed: f64,
    /// Sum of `|v|^2 / 2`, unit mass.
    pub kinetic_energy: f64,
    pub swarm_count: usize,
}

impl TickStats {
    pub fn collect(tick: u64, particles: &[Particle], num_types: usize, swarm_count: usize) -> Self {
        let mut type_counts = vec![0; num_types];
        let mut speed_sum = 0.0;
        let mut max_speed: f64 = 0.0;
        let mut kinetic_energy = 0.0;

        for p in particles {
            if let Some(c) = type_counts.get_mut(p.kind) {
                *c += 1;
            }
            let v2 = p.velocity.norm_squared();
            let speed = v2.sqrt();
            speed_sum += speed;
            max_speed = max_speed.max(speed);
            kinetic_energy += 0.5 * v2;
        }

        let n = particles.len();
        Self {
            tick,
            particle_count: n,
            type_counts,
            mean_speed: if n > 0 { speed_sum / n as f64 } else { 0.0 },
            max_speed,
            kinetic_energy,
            swarm_count,
        }
    }
}
