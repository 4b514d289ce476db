use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::core::domain::SimState;
use crate::core::error::{SimError, SimResult};
use crate::sim::world::Simulation;
use crate::sim::{SimCommand, SimEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Drives a [`Simulation`] tick by tick, usually on a worker thread.
///
/// Queued [`SimCommand`]s are drained before every tick. The loop ends
/// after `max_ticks`, on [`SimCommand::Stop`], when the stop flag is raised,
/// or on the first failed step.
pub struct SimulationRunner {
    sim: Simulation,
    dt: f64,
    max_ticks: Option<u64>,
    commands: Option<Receiver<SimCommand>>,
    stop: Arc<AtomicBool>,
}

impl SimulationRunner {
    pub fn new(sim: Simulation, dt: f64) -> Self {
        Self {
            sim,
            dt,
            max_ticks: None,
            commands: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    pub fn commands(mut self, rx: Receiver<SimCommand>) -> Self {
        self.commands = Some(rx);
        self
    }

    /// Setting the returned flag stops the loop before its next tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs the loop to completion and hands the simulation back.
    pub fn run(mut self, tx: Sender<SimEvent>) -> Simulation {
        if self.sim.state() == SimState::Configured {
            let _ = tx.send(SimEvent::Log("Spawning population...".to_string()));
            if let Err(e) = self.sim.populate() {
                log::error!("populate failed: {}", e);
                let _ = tx.send(SimEvent::Halted(e.to_string()));
                let _ = tx.send(SimEvent::Finished);
                return self.sim;
            }
        }
        let _ = tx.send(SimEvent::Ready {
            particles: self.sim.len(),
            swarms: self.sim.swarms().len(),
        });

        let start = Instant::now();
        let mut last_beat = Instant::now();
        let mut ticks_since_beat = 0u64;
        let mut ticks_run = 0u64;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if self.max_ticks.is_some_and(|max| ticks_run >= max) {
                break;
            }
            if !self.drain_commands(&tx) {
                break;
            }

            match self.sim.step(self.dt) {
                Ok(stats) => {
                    let _ = tx.send(SimEvent::TickUpdate(stats));
                }
                Err(e) => {
                    log::error!("tick {} failed: {}", self.sim.tick() + 1, e);
                    let _ = tx.send(SimEvent::Halted(e.to_string()));
                    break;
                }
            }
            ticks_run += 1;
            ticks_since_beat += 1;

            let since = last_beat.elapsed();
            if since >= HEARTBEAT_INTERVAL {
                let _ = tx.send(SimEvent::Heartbeat(ticks_since_beat as f64 / since.as_secs_f64()));
                ticks_since_beat = 0;
                last_beat = Instant::now();
            }
        }

        let _ = tx.send(SimEvent::Log(format!(
            "Runner finished: {} ticks in {:.2?}",
            ticks_run,
            start.elapsed()
        )));
        let _ = tx.send(SimEvent::Finished);
        self.sim
    }

    /// Applies every queued command. Returns `false` once `Stop` is seen.
    /// Rejected commands are reported and skipped; they do not halt the run.
    fn drain_commands(&mut self, tx: &Sender<SimEvent>) -> bool {
        let Some(rx) = self.commands.clone() else {
            return true;
        };
        loop {
            match rx.try_recv() {
                Ok(SimCommand::Stop) => return false,
                Ok(cmd) => {
                    if let Err(e) = self.apply(cmd) {
                        log::warn!("command rejected: {}", e);
                        let _ = tx.send(SimEvent::Log(format!("Command rejected: {}", e)));
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    self.commands = None;
                    return true;
                }
            }
        }
    }

    fn apply(&mut self, cmd: SimCommand) -> SimResult<()> {
        match cmd {
            SimCommand::Spawn { position, kind } => {
                self.sim.spawn_particle(position, kind)?;
            }
            SimCommand::Remove(id) => {
                self.sim.remove_particle(id).ok_or(SimError::UnknownParticle(id))?;
            }
            SimCommand::SetKind { id, kind } => self.sim.set_particle_kind(id, kind)?,
            SimCommand::SetPair { i, j, pair } => {
                let n = self.sim.num_types();
                if let Some(kind) = [i, j].into_iter().find(|&k| k >= n) {
                    return Err(SimError::InvalidKind { kind, num_types: n });
                }
                self.sim.matrix_mut().set_pair(i, j, pair);
            }
            SimCommand::SwapForces => self.sim.swap_forces(),
            SimCommand::SpawnSwarm { center, count, parent } => {
                match parent {
                    Some(parent) => self.sim.spawn_derived_swarm(parent, center, count)?,
                    None => self.sim.spawn_swarm(center, count)?,
                };
            }
            SimCommand::Restart => self.sim.restart()?,
            SimCommand::Stop => {}
        }
        Ok(())
    }
}
