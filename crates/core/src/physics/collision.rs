//! Particle-versus-triangle collision queries
//!
//! Stateless geometric queries against a borrowed batch of world-space
//! triangles. The host flattens its meshes (applying any transform) before
//! handing them over; nothing here owns or mutates geometry.
//!
//! Every query is `O(triangles)`, so a tick costs `O(particles × triangles)`.
//! That is fine for hundreds of particles against small-to-moderate meshes.
//! Hosts with large meshes can pre-filter triangles with their own spatial
//! index and pass the reduced batch through the same interface.

use crate::core_types::vec3::Vec3;
use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

/// Below this squared length a triangle normal is treated as degenerate
const DEGENERATE_AREA_SQ: f32 = 1e-12;

/// Below this distance the query point is considered to be on the surface
const SURFACE_EPSILON: f32 = 1e-6;

/// World-space triangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

/// Result of a successful collision query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Distance from the query point to the surface, or along the segment
    /// for [`segment_intersection`]
    pub distance: f32,
    /// Closest point on the surface
    pub point: Vec3,
    /// Unit normal pointing from the surface toward the query side
    pub normal: Vec3,
}

/// Read-only batch of triangles supplied by the host for one tick
#[derive(Debug, Clone, Copy)]
pub struct Collidable<'a> {
    triangles: &'a [Triangle],
}

impl<'a> Collidable<'a> {
    pub fn new(triangles: &'a [Triangle]) -> Self {
        Collidable { triangles }
    }

    pub fn triangles(&self) -> &'a [Triangle] {
        self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

impl<'a> From<&'a [Triangle]> for Collidable<'a> {
    fn from(triangles: &'a [Triangle]) -> Self {
        Collidable::new(triangles)
    }
}

impl<'a> From<&'a Vec<Triangle>> for Collidable<'a> {
    fn from(triangles: &'a Vec<Triangle>) -> Self {
        Collidable::new(triangles)
    }
}

fn closest_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= DEGENERATE_AREA_SQ {
        return a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Triangle { a, b, c }
    }

    /// Two triangles covering the quad `a, b, c, d` (in winding order)
    pub fn quad(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> [Triangle; 2] {
        [Triangle::new(a, b, c), Triangle::new(a, c, d)]
    }

    /// Flatten an indexed mesh into world-space triangles
    ///
    /// Index triples that reference missing vertices are skipped.
    pub fn from_indexed_mesh(
        vertices: &[Vec3],
        indices: &[[usize; 3]],
        transform: &Isometry3<f32>,
    ) -> Vec<Triangle> {
        let world = |v: Vec3| transform.transform_point(&Point3::from(v)).coords;

        indices
            .iter()
            .filter_map(|&[i, j, k]| {
                let (a, b, c) = (vertices.get(i)?, vertices.get(j)?, vertices.get(k)?);
                Some(Triangle::new(world(*a), world(*b), world(*c)))
            })
            .collect()
    }

    /// Unit face normal (right-hand winding), `None` for degenerate triangles
    pub fn normal(&self) -> Option<Vec3> {
        let n = (self.b - self.a).cross(&(self.c - self.a));
        let len_sq = n.norm_squared();
        if len_sq <= DEGENERATE_AREA_SQ {
            None
        } else {
            Some(n / len_sq.sqrt())
        }
    }

    /// Closest point on the triangle to `p`
    ///
    /// Projects `p` onto the triangle plane and tests the barycentric
    /// coordinates of the projection. Inside the triangle the projection is
    /// the answer; otherwise the nearest of the three edge segments is.
    pub fn closest_point_to(&self, p: Vec3) -> Vec3 {
        let ab = self.b - self.a;
        let ac = self.c - self.a;
        let n = ab.cross(&ac);
        let n_len_sq = n.norm_squared();

        if n_len_sq > DEGENERATE_AREA_SQ {
            let projected = p - n * ((p - self.a).dot(&n) / n_len_sq);

            let ap = projected - self.a;
            let d00 = ab.dot(&ab);
            let d01 = ab.dot(&ac);
            let d11 = ac.dot(&ac);
            let d20 = ap.dot(&ab);
            let d21 = ap.dot(&ac);
            let denom = d00 * d11 - d01 * d01;

            if denom.abs() > DEGENERATE_AREA_SQ {
                let v = (d11 * d20 - d01 * d21) / denom;
                let w = (d00 * d21 - d01 * d20) / denom;
                let u = 1.0 - v - w;
                if u >= 0.0 && v >= 0.0 && w >= 0.0 {
                    return projected;
                }
            }
        }

        let candidates = [
            closest_on_segment(p, self.a, self.b),
            closest_on_segment(p, self.b, self.c),
            closest_on_segment(p, self.c, self.a),
        ];
        candidates
            .into_iter()
            .min_by(|x, y| (p - x).norm_squared().total_cmp(&(p - y).norm_squared()))
            .unwrap_or(self.a)
    }

    /// Möller–Trumbore segment test, returning the segment parameter `t ∈ [0, 1]`
    fn segment_parameter(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let dir = to - from;
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;
        let h = dir.cross(&e2);
        let det = e1.dot(&h);
        if det.abs() < 1e-9 {
            return None; // parallel to the plane
        }
        let inv_det = 1.0 / det;
        let s = from - self.a;
        let u = s.dot(&h) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&e1);
        let v = dir.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(&q) * inv_det;
        (0.0..=1.0).contains(&t).then_some(t)
    }
}

/// Orient `normal` so it faces `side`
pub(crate) fn facing(normal: Vec3, surface_point: Vec3, side: Vec3) -> Vec3 {
    if normal.dot(&(side - surface_point)) < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Closest surface contact within `radius` of `point`
///
/// Returns the globally closest triangle's result when its distance is
/// strictly less than `radius`. An empty batch yields `None`.
pub fn closest_point(point: Vec3, radius: f32, collidable: &Collidable<'_>) -> Option<Contact> {
    let mut best: Option<(f32, Vec3, &Triangle)> = None;

    for triangle in collidable.triangles() {
        let candidate = triangle.closest_point_to(point);
        let dist_sq = (point - candidate).norm_squared();
        if best.is_none_or(|(best_sq, _, _)| dist_sq < best_sq) {
            best = Some((dist_sq, candidate, triangle));
        }
    }

    let (dist_sq, surface, triangle) = best?;
    let distance = dist_sq.sqrt();
    if distance >= radius {
        return None;
    }

    let normal = if distance > SURFACE_EPSILON {
        (point - surface) / distance
    } else {
        triangle.normal().unwrap_or_else(Vec3::y)
    };

    Some(Contact {
        distance,
        point: surface,
        normal,
    })
}

/// Earliest crossing of the segment `from → to` through any triangle
///
/// Used to catch particles that would otherwise pass through a thin
/// surface within a single step. The normal faces `from`.
pub fn segment_intersection(from: Vec3, to: Vec3, collidable: &Collidable<'_>) -> Option<Contact> {
    let length = (to - from).norm();
    if length <= SURFACE_EPSILON {
        return None;
    }

    collidable
        .triangles()
        .iter()
        .filter_map(|triangle| {
            let t = triangle.segment_parameter(from, to)?;
            let normal = triangle.normal()?;
            let point = from + (to - from) * t;
            Some(Contact {
                distance: t * length,
                point,
                normal: facing(normal, point, from),
            })
        })
        .min_by(|x, y| x.distance.total_cmp(&y.distance))
}
