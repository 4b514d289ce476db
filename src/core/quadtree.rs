//! Capacity-bounded quadtree over a 2D rectangle.
//!
//! The tree is a transient index: it is rebuilt from particle positions
//! and queried read-only during a force pass. Nodes live in a flat arena
//! and are recycled by [`QuadTree::clear`], so rebuilding every tick does
//! not reallocate once the arena has grown to its working size.
//!
//! Insertion policy: a node stores entries directly until it holds
//! [`NODE_CAPACITY`] of them. The next insertion subdivides it into four
//! equal quadrants and every later insertion is forwarded to a child; the
//! entries already held stay where they are.

use nalgebra::{Point2, Vector2};

pub const NODE_CAPACITY: usize = 10;

/// Nodes at this depth accept entries past capacity instead of subdividing,
/// which bounds the tree when many points coincide.
pub const MAX_DEPTH: u32 = 16;

const ROOT: usize = 0;

/// Axis-aligned rectangle, closed on all sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Rect {
    /// Rectangle from its minimum corner and size.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            min: Point2::new(x, y),
            max: Point2::new(x + width, y + height),
        }
    }

    pub fn centered(center: Point2<f64>, half_width: f64, half_height: f64) -> Self {
        let h = Vector2::new(half_width, half_height);
        Self {
            min: center - h,
            max: center + h,
        }
    }

    /// Square of side `2 * radius` around `center`.
    pub fn around(center: Point2<f64>, radius: f64) -> Self {
        Self::centered(center, radius, radius)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    #[inline]
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn translated(&self, offset: Vector2<f64>) -> Rect {
        Rect {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// One of the four equal quadrants: 0 = (low x, low y), 1 = (high x, low y),
    /// 2 = (low x, high y), 3 = (high x, high y).
    fn quadrant(&self, q: usize) -> Rect {
        let mid = self.center();
        let (x0, x1) = if q & 1 == 0 { (self.min.x, mid.x) } else { (mid.x, self.max.x) };
        let (y0, y1) = if q & 2 == 0 { (self.min.y, mid.y) } else { (mid.y, self.max.y) };
        Rect {
            min: Point2::new(x0, y0),
            max: Point2::new(x1, y1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: usize,
    position: Point2<f64>,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Rect,
    entries: Vec<Entry>,
    children: Option<[usize; 4]>,
    depth: u32,
}

impl Node {
    fn new(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::with_capacity(NODE_CAPACITY),
            children: None,
            depth,
        }
    }
}

/// Point quadtree mapping positions to caller-defined keys (particle indices).
#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Node>,
    /// Nodes `[0, active)` are part of the current tree; the rest are pooled.
    active: usize,
    len: usize,
}

impl QuadTree {
    pub fn new(bounds: Rect) -> Self {
        Self {
            nodes: vec![Node::new(bounds, 0)],
            active: 1,
            len: 0,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[ROOT].bounds
    }

    /// Number of entries stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Nodes in the current tree, root included.
    pub fn node_count(&self) -> usize {
        self.active
    }

    pub fn subdivisions(&self) -> usize {
        (self.active - 1) / 4
    }

    /// Bounds and directly-held entry count of every node in the current tree.
    pub fn node_occupancy(&self) -> Vec<(Rect, usize)> {
        self.nodes[..self.active]
            .iter()
            .map(|n| (n.bounds, n.entries.len()))
            .collect()
    }

    /// Empties the tree, keeping node and entry allocations for reuse.
    pub fn clear(&mut self) {
        for node in &mut self.nodes[..self.active] {
            node.entries.clear();
            node.children = None;
        }
        self.active = 1;
        self.len = 0;
    }

    /// Empties the tree and moves the root to new bounds.
    pub fn reset(&mut self, bounds: Rect) {
        self.clear();
        self.nodes[ROOT].bounds = bounds;
    }

    /// Inserts `key` at `position`. Positions outside the root bounds are
    /// dropped and `false` is returned.
    pub fn insert(&mut self, key: usize, position: Point2<f64>) -> bool {
        if !self.nodes[ROOT].bounds.contains(&position) {
            return false;
        }

        let entry = Entry { key, position };
        let mut idx = ROOT;
        loop {
            let (children, held, depth) = {
                let node = &self.nodes[idx];
                (node.children, node.entries.len(), node.depth)
            };
            let children = match children {
                Some(children) => children,
                // Room left (or depth cap hit): store here
                None if held < NODE_CAPACITY || depth >= MAX_DEPTH => {
                    self.nodes[idx].entries.push(entry);
                    self.len += 1;
                    return true;
                }
                // Full leaf: split, keep its entries, forward this one
                None => self.subdivide(idx),
            };

            match children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].bounds.contains(&position))
            {
                Some(child) => idx = child,
                None => {
                    // Only reachable through rounding at quadrant seams.
                    self.nodes[idx].entries.push(entry);
                    self.len += 1;
                    return true;
                }
            }
        }
    }

    /// Keys of all entries inside `range`.
    pub fn query_range(&self, range: &Rect) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_range_into(range, &mut out);
        out
    }

    /// Appends the keys of all entries inside `range` to `out`.
    pub fn query_range_into(&self, range: &Rect, out: &mut Vec<usize>) {
        self.query_node(ROOT, range, out);
    }

    fn query_node(&self, idx: usize, range: &Rect, out: &mut Vec<usize>) {
        let node = &self.nodes[idx];
        if !node.bounds.intersects(range) {
            return;
        }

        out.extend(
            node.entries
                .iter()
                .filter(|e| range.contains(&e.position))
                .map(|e| e.key),
        );

        if let Some(children) = node.children {
            for child in children {
                self.query_node(child, range, out);
            }
        }
    }

    fn subdivide(&mut self, idx: usize) -> [usize; 4] {
        let bounds = self.nodes[idx].bounds;
        let depth = self.nodes[idx].depth + 1;
        let children = [
            self.alloc_node(bounds.quadrant(0), depth),
            self.alloc_node(bounds.quadrant(1), depth),
            self.alloc_node(bounds.quadrant(2), depth),
            self.alloc_node(bounds.quadrant(3), depth),
        ];
        self.nodes[idx].children = Some(children);
        children
    }

    fn alloc_node(&mut self, bounds: Rect, depth: u32) -> usize {
        let idx = self.active;
        if idx < self.nodes.len() {
            let node = &mut self.nodes[idx];
            node.bounds = bounds;
            node.entries.clear();
            node.children = None;
            node.depth = depth;
        } else {
            self.nodes.push(Node::new(bounds, depth));
        }
        self.active += 1;
        idx
    }
}
