use std::f64::consts::TAU;

use nalgebra::{Point2, Vector2};

use crate::core::domain::{BoundaryPolicy, WorldConfig};
use crate::core::quadtree::{QuadTree, Rect};

/// The simulated region: a rectangle centred on the origin plus the policy
/// applied at its edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    half: Vector2<f64>,
    policy: BoundaryPolicy,
}

impl WorldBounds {
    pub fn new(width: f64, height: f64, policy: BoundaryPolicy) -> Self {
        Self {
            half: Vector2::new(width * 0.5, height * 0.5),
            policy,
        }
    }

    pub fn from_config(cfg: &WorldConfig) -> Self {
        Self::new(cfg.width, cfg.height, cfg.boundary)
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    #[inline]
    pub fn wraps(&self) -> bool {
        self.policy == BoundaryPolicy::Wrap
    }

    pub fn half_extents(&self) -> Vector2<f64> {
        self.half
    }

    /// `(width, height)`.
    pub fn extents(&self) -> (f64, f64) {
        (self.half.x * 2.0, self.half.y * 2.0)
    }

    pub fn rect(&self) -> Rect {
        Rect::centered(Point2::origin(), self.half.x, self.half.y)
    }

    /// Vector from `from` to `to`. When the world wraps, each axis takes the
    /// shorter way round the torus, so no component exceeds half the extent.
    #[inline]
    pub fn delta(&self, from: &Point2<f64>, to: &Point2<f64>) -> Vector2<f64> {
        let mut d = to - from;
        if self.wraps() {
            d.x = shortest_axis(d.x, self.half.x);
            d.y = shortest_axis(d.y, self.half.y);
        }
        d
    }

    #[inline]
    pub fn distance_sq(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        self.delta(a, b).norm_squared()
    }

    /// Applies the boundary policy after integration.
    ///
    /// Clamp: the position is pinned to the edge and the outward velocity
    /// component is zeroed. Wrap: the position re-enters from the far side.
    #[inline]
    pub fn confine(&self, position: &mut Point2<f64>, velocity: &mut Vector2<f64>) {
        match self.policy {
            BoundaryPolicy::Clamp => {
                clamp_axis(&mut position.x, &mut velocity.x, self.half.x);
                clamp_axis(&mut position.y, &mut velocity.y, self.half.y);
            }
            BoundaryPolicy::Wrap => {
                position.x = wrap_axis(position.x, self.half.x);
                position.y = wrap_axis(position.y, self.half.y);
            }
        }
    }

    /// Maps an arbitrary point into the world (used for spawn positions).
    pub fn confine_point(&self, p: Point2<f64>) -> Point2<f64> {
        let mut p = p;
        let mut v = Vector2::zeros();
        self.confine(&mut p, &mut v);
        p
    }

    /// The copies of `rect` that must be searched to see everything within
    /// it on a torus: the rect itself plus its images shifted by one world
    /// extent wherever it crosses an edge. Without wrapping only `rect`.
    pub fn query_images(&self, rect: Rect) -> impl Iterator<Item = Rect> {
        let xs = self.axis_images(rect.min.x, rect.max.x, self.half.x);
        let ys = self.axis_images(rect.min.y, rect.max.y, self.half.y);
        xs.into_iter().flatten().flat_map(move |dx| {
            ys.into_iter()
                .flatten()
                .map(move |dy| rect.translated(Vector2::new(dx, dy)))
        })
    }

    /// Appends to `out` the keys of every entry of `tree` within the square
    /// of half-side `radius` around `center`, across the torus seams when
    /// the world wraps. Each key appears at most once.
    pub fn query_tree(&self, tree: &QuadTree, center: Point2<f64>, radius: f64, out: &mut Vec<usize>) {
        let start = out.len();
        let mut images = 0;
        for rect in self.query_images(Rect::around(center, radius)) {
            tree.query_range_into(&rect, out);
            images += 1;
        }
        if images > 1 {
            out[start..].sort_unstable();
            let mut tail = out.split_off(start);
            tail.dedup();
            out.extend(tail);
        }
    }

    fn axis_images(&self, lo: f64, hi: f64, half: f64) -> [Option<f64>; 3] {
        if !self.wraps() {
            return [Some(0.0), None, None];
        }
        let extent = half * 2.0;
        [
            Some(0.0),
            (hi > half).then_some(-extent),
            (lo < -half).then_some(extent),
        ]
    }

    /// Mean position of `points`. Under wrap each axis is averaged on the
    /// circle so groups straddling an edge centre on the seam rather than
    /// the middle of the world. `None` for an empty set.
    pub fn centroid<I>(&self, points: I) -> Option<Point2<f64>>
    where
        I: IntoIterator<Item = Point2<f64>>,
        I::IntoIter: Clone,
    {
        let points = points.into_iter();
        match self.policy {
            BoundaryPolicy::Clamp => {
                let mut sum = Vector2::zeros();
                let mut n = 0usize;
                for p in points {
                    sum += p.coords;
                    n += 1;
                }
                (n > 0).then(|| Point2::from(sum / n as f64))
            }
            BoundaryPolicy::Wrap => {
                let x = circular_mean(points.clone().map(|p| p.x), -self.half.x, self.half.x * 2.0)?;
                let y = circular_mean(points.map(|p| p.y), -self.half.y, self.half.y * 2.0)?;
                Some(Point2::new(wrap_axis(x, self.half.x), wrap_axis(y, self.half.y)))
            }
        }
    }
}

/// Mean of values living on the periodic interval `[lo, lo + extent)`.
///
/// Each value is mapped to an angle, the unit vectors are summed and the
/// resulting angle mapped back. When the values cancel out on the circle
/// (e.g. evenly spread) the plain arithmetic mean is returned instead.
pub fn circular_mean<I>(values: I, lo: f64, extent: f64) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sin = 0.0;
    let mut cos = 0.0;
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        let theta = (v - lo) / extent * TAU;
        sin += theta.sin();
        cos += theta.cos();
        sum += v;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    if sin.hypot(cos) < 1e-9 * n as f64 {
        return Some(sum / n as f64);
    }
    let theta = sin.atan2(cos).rem_euclid(TAU);
    Some(lo + theta / TAU * extent)
}

#[inline]
fn shortest_axis(d: f64, half: f64) -> f64 {
    if d > half {
        d - 2.0 * half
    } else if d < -half {
        d + 2.0 * half
    } else {
        d
    }
}

#[inline]
fn wrap_axis(x: f64, half: f64) -> f64 {
    (x + half).rem_euclid(2.0 * half) - half
}

#[inline]
fn clamp_axis(x: &mut f64, v: &mut f64, half: f64) {
    if *x > half {
        *x = half;
        if *v > 0.0 {
            *v = 0.0;
        }
    } else if *x < -half {
        *x = -half;
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}
