//! Geometry primitives. Obstacle shapes and broad-phase
//! bounds are plain `mazth`/`zpatial` types, treated as opaque
//! tokens (obtained via `get_bound()`,
//! passed straight into the BVH). Everything this crate needs to inspect or
//! subdivide directly — grid cells, desirability zones, corners — is instead
//! represented with the plain axis-aligned [`Aabb3`] below.

pub mod grid;

use zpatial::mazth::{
    i_bound::IBound,
    i_shape::{IShape, ShapeType},
    line::Line3,
    rbox::RecBox,
    triprism::TriPrism,
};

use crate::position::{Globe, Position};

/// Axis-aligned box used for grid cells, desirability zones, and the other
/// spots where this crate needs to read back min/max rather than just hand
/// an opaque bound to the BVH.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Aabb3 { min, max }
    }

    pub fn longest_edge(&self) -> f64 {
        (0..3)
            .map(|i| self.max[i] - self.min[i])
            .fold(0.0_f64, f64::max)
    }

    pub fn contains_point(&self, p: [f64; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn intersects(&self, other: &Aabb3) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    pub fn center(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    pub fn corners(&self) -> Vec<[f64; 3]> {
        let mut out = Vec::with_capacity(8);
        for &x in &[self.min[0], self.max[0]] {
            for &y in &[self.min[1], self.max[1]] {
                for &z in &[self.min[2], self.max[2]] {
                    out.push([x, y, z]);
                }
            }
        }
        out
    }

    pub fn intersects_segment(&self, a: [f64; 3], b: [f64; 3]) -> bool {
        // Slab method.
        let mut t_min = 0.0_f64;
        let mut t_max = 1.0_f64;
        for i in 0..3 {
            let d = b[i] - a[i];
            if d.abs() < 1e-12 {
                if a[i] < self.min[i] || a[i] > self.max[i] {
                    return false;
                }
                continue;
            }
            let mut t0 = (self.min[i] - a[i]) / d;
            let mut t1 = (self.max[i] - a[i]) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }

    pub fn intersects_sphere(&self, center: [f64; 3], radius: f64) -> bool {
        let mut dist_sq = 0.0;
        for i in 0..3 {
            let v = center[i];
            if v < self.min[i] {
                dist_sq += (self.min[i] - v) * (self.min[i] - v);
            } else if v > self.max[i] {
                dist_sq += (v - self.max[i]) * (v - self.max[i]);
            }
        }
        dist_sq <= radius * radius
    }

    pub fn intersects_cylinder(&self, axis_a: [f64; 3], axis_b: [f64; 3], radius: f64) -> bool {
        self.intersects_segment(axis_a, axis_b)
            || self.intersects_sphere(axis_a, radius)
            || self.intersects_sphere(axis_b, radius)
    }
}

/// A validity-bounded obstacle embedded in an environment. Two shapes are
/// supported: oriented boxes (terrain blocks, weather cells approximated as
/// boxes) and triangular prisms (extruded polygon terrain features).
#[derive(Clone, Debug)]
pub enum Obstacle {
    Box(RecBox<f64>),
    TriPrism(TriPrism<f64>),
}

impl Obstacle {
    /// Broad-phase bound handed straight to the BVH for obstacle indexing.
    pub fn get_bound(&self) -> zpatial::mazth::bound::AxisAlignedBBox<f64> {
        match self {
            Obstacle::Box(b) => b.get_bound(),
            Obstacle::TriPrism(t) => t.get_bound(),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Obstacle::Box(b) => b.get_type(),
            Obstacle::TriPrism(t) => t.get_type(),
        }
    }

    /// Narrow-phase segment/obstacle intersection test, used once the BVH's
    /// broad phase has already produced a short candidate list.
    pub fn intersects_segment(&self, line: &Line3<f64>) -> bool {
        match self {
            Obstacle::Box(_) => true, // AABB broad phase already confirmed the hit
            Obstacle::TriPrism(t) => t.get_intersect(line).0,
        }
    }
}

/// A volume with a desirability value in `[0,1]` influencing edge cost via
/// `lambda` (edge desirability blending).
#[derive(Clone, Debug)]
pub struct DesirabilityZone {
    pub bound: Aabb3,
    pub desirability: f64,
}

impl DesirabilityZone {
    pub fn intersects_segment(&self, a: [f64; 3], b: [f64; 3]) -> bool {
        self.bound.intersects_segment(a, b)
    }
}

pub fn position_to_line(globe: &Globe, a: &Position, b: &Position) -> Line3<f64> {
    let pa = a.to_cartesian(globe);
    let pb = b.to_cartesian(globe);
    Line3::init(&pa, &pb)
}
