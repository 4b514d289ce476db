use rayon::prelude::*;

use crate::core::domain::Particle;
use crate::core::error::{SimError, SimResult};
use crate::engine::forces::{ForceModel, MatrixScope};

/// Double-buffered, batch-parallel stepper.
///
/// The caller owns the read buffer; the scheduler owns the write buffer.
/// During a tick every batch reads only the read buffer and writes only its
/// own slice of the write buffer. The buffers are then exchanged, so the
/// caller ends up holding the new state and the old one is kept for reuse.
pub struct ParallelStepScheduler {
    batch_size: usize,
    back: Vec<Particle>,
    pool: Option<rayon::ThreadPool>,
}

impl ParallelStepScheduler {
    /// `threads == 0` runs on the global rayon pool.
    pub fn new(batch_size: usize, threads: usize) -> SimResult<Self> {
        if batch_size == 0 {
            return Err(SimError::Config("batch_size must be at least 1".into()));
        }

        let pool = if threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("sim-batch-{}", i))
                .build()
                .map_err(|e| SimError::Config(format!("failed to build worker pool: {}", e)))?;
            log::debug!("parallel scheduler: {} threads, batch size {}", threads, batch_size);
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            batch_size,
            back: Vec::new(),
            pool,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Advances `front` by one tick. On return `front` holds the new state.
    pub fn step<S: MatrixScope + ?Sized>(&mut self, front: &mut Vec<Particle>, model: &ForceModel<'_, S>, dt: f64) {
        let Self { batch_size, back, pool } = self;
        let batch = *batch_size;

        // Every slot is overwritten below; only the length has to match.
        if back.len() != front.len() {
            back.clear();
            back.extend_from_slice(front.as_slice());
        }

        let read: &[Particle] = front.as_slice();
        let run = |out: &mut [Particle]| {
            out.par_chunks_mut(batch).enumerate().for_each(|(b, chunk)| {
                // Chunk b covers read[b * batch..], same indices as the write slots
                let start = b * batch;
                for (k, slot) in chunk.iter_mut().enumerate() {
                    let p = &read[start + k];
                    let force = model.net_force(p, read.iter());
                    *slot = model.advance(p, force, dt);
                }
            });
        };

        // Dedicated pool when `threads > 0`, else the global one
        match pool {
            Some(pool) => pool.install(|| run(back.as_mut_slice())),
            None => run(back.as_mut_slice()),
        }

        // front now holds the new state; the old one is kept as next tick's write buffer
        std::mem::swap(front, back);
    }

    /// Drops slot `index` from the write buffer so it stays aligned with a
    /// read buffer that just had the same slot removed. Only valid between ticks.
    pub fn remove_at(&mut self, index: usize) {
        if index < self.back.len() {
            self.back.remove(index);
        }
    }

    pub fn clear(&mut self) {
        self.back.clear();
    }
}
