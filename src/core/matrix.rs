use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::domain::MatrixRanges;

/// Interaction parameters for one ordered pair of types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairParams {
    /// Positive attracts, negative repels.
    pub force: f64,
    /// Below this distance a repulsive push always applies.
    pub min_distance: f64,
    /// Beyond this distance the attraction term vanishes.
    pub radius: f64,
}

impl PairParams {
    pub fn new(force: f64, min_distance: f64, radius: f64) -> Self {
        Self { force, min_distance, radius }
    }

    /// Distance past which this pair contributes nothing.
    #[inline]
    pub fn reach(&self) -> f64 {
        self.min_distance.max(self.radius)
    }
}

/// A flattened `num_types x num_types` matrix of [`PairParams`].
/// Access is O(1) via `index = i * N + j`; cell `(i, j)` describes how a
/// type-`j` neighbour acts on a type-`i` particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix {
    num_types: usize,
    cells: Vec<PairParams>,
}

impl InteractionMatrix {
    /// Every cell set to `pair`.
    pub fn uniform(num_types: usize, pair: PairParams) -> Self {
        Self {
            num_types,
            cells: vec![pair; num_types * num_types],
        }
    }

    /// Samples every cell independently from `ranges`. Force magnitudes are
    /// negated with probability 0.5; distances keep their sign.
    pub fn generate<R: Rng + ?Sized>(num_types: usize, ranges: &MatrixRanges, rng: &mut R) -> Self {
        let mut cells = Vec::with_capacity(num_types * num_types);
        for _ in 0..num_types * num_types {
            let mut force = rng.gen_range(ranges.force.0..=ranges.force.1);
            if rng.gen_bool(0.5) {
                force = -force;
            }
            cells.push(PairParams {
                force,
                min_distance: rng.gen_range(ranges.min_distance.0..=ranges.min_distance.1),
                radius: rng.gen_range(ranges.radius.0..=ranges.radius.1),
            });
        }
        Self { num_types, cells }
    }

    /// Returns a copy with every value offset by an independent draw from
    /// `[-perturbation, perturbation]`. Distances are floored at zero.
    pub fn mutate<R: Rng + ?Sized>(&self, perturbation: f64, rng: &mut R) -> Self {
        let p = perturbation.abs();
        let cells = self
            .cells
            .iter()
            .map(|c| PairParams {
                force: c.force + rng.gen_range(-p..=p),
                min_distance: (c.min_distance + rng.gen_range(-p..=p)).max(0.0),
                radius: (c.radius + rng.gen_range(-p..=p)).max(0.0),
            })
            .collect();
        Self {
            num_types: self.num_types,
            cells,
        }
    }

    /// Swaps `force[i,j]` with `force[j,i]` for every `i < j`. Distances are untouched.
    pub fn transpose_forces(&mut self) {
        let n = self.num_types;
        for i in 0..n {
            for j in (i + 1)..n {
                let a = self.cells[i * n + j].force;
                self.cells[i * n + j].force = self.cells[j * n + i].force;
                self.cells[j * n + i].force = a;
            }
        }
    }

    #[inline]
    pub fn num_types(&self) -> usize {
        self.num_types
    }

    /// Checked cell index. Panics on an out-of-range type instead of
    /// aliasing another cell.
    fn index(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.num_types && j < self.num_types,
            "type pair ({}, {}) out of range for {} types",
            i,
            j,
            self.num_types
        );
        i * self.num_types + j
    }

    pub fn pair(&self, i: usize, j: usize) -> &PairParams {
        &self.cells[self.index(i, j)]
    }

    /// Force-loop lookup. Particle kinds are validated on entry, so the
    /// range check only runs in debug builds.
    #[inline(always)]
    pub fn lookup(&self, i: usize, j: usize) -> &PairParams {
        debug_assert!(
            i < self.num_types && j < self.num_types,
            "type pair ({}, {}) out of range for {} types",
            i,
            j,
            self.num_types
        );
        &self.cells[i * self.num_types + j]
    }

    pub fn force(&self, i: usize, j: usize) -> f64 {
        self.pair(i, j).force
    }

    pub fn min_distance(&self, i: usize, j: usize) -> f64 {
        self.pair(i, j).min_distance
    }

    pub fn radius(&self, i: usize, j: usize) -> f64 {
        self.pair(i, j).radius
    }

    pub fn set_pair(&mut self, i: usize, j: usize, pair: PairParams) {
        let idx = self.index(i, j);
        self.cells[idx] = pair;
    }

    pub fn set_force(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.cells[idx].force = value;
    }

    pub fn set_min_distance(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.cells[idx].min_distance = value;
    }

    pub fn set_radius(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.cells[idx].radius = value;
    }

    /// Largest interaction reach over all cells; the neighbour search radius.
    pub fn max_range(&self) -> f64 {
        self.cells.iter().map(PairParams::reach).fold(0.0, f64::max)
    }

    /// Row-major view of all cells.
    pub fn cells(&self) -> &[PairParams] {
        &self.cells
    }
}
