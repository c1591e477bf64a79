//! Closest-point queries on beam centerlines.

use std::collections::BTreeMap;

use glam::DVec3;
use linkage_binning::EntityId;
use thiserror::Error;

use crate::entity::{EntityTable, Shape};

/// Tolerance below which lengths and denominators count as zero.
pub const EPSILON: f64 = 1.0e-12;

/// Geometry for which no unique closest point exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("segment has zero length")]
    ZeroLength,
    #[error("closest points coincide")]
    Coincident,
}

/// Straight centerline segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: DVec3,
    pub b: DVec3,
}

impl Segment {
    pub const fn new(a: DVec3, b: DVec3) -> Self {
        Self { a, b }
    }

    pub fn point_at(&self, s: f64) -> DVec3 {
        self.a.lerp(self.b, s)
    }

    pub fn direction(&self) -> DVec3 {
        self.b - self.a
    }
}

/// Closest points of two segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoints {
    /// Parameter on the first segment, in `[0, 1]`.
    pub s: f64,
    /// Parameter on the second segment, in `[0, 1]`.
    pub t: f64,
    pub point_a: DVec3,
    pub point_b: DVec3,
}

impl ClosestPoints {
    /// Vector from the point on the second segment to the point on the first.
    pub fn separation(&self) -> DVec3 {
        self.point_a - self.point_b
    }

    pub fn distance(&self) -> f64 {
        self.separation().length()
    }
}

/// Clamped closest points of two segments.
///
/// Parallel segments have a whole family of closest points; the one at the
/// middle of their overlap is taken, or the nearest ends when they do not
/// overlap.
pub fn closest_points_segments(p: &Segment, q: &Segment) -> Result<ClosestPoints, GeometryError> {
    let d1 = p.direction();
    let d2 = q.direction();
    let r = p.a - q.a;
    let a = d1.length_squared();
    let e = d2.length_squared();
    if a <= EPSILON || e <= EPSILON {
        return Err(GeometryError::ZeroLength);
    }

    let b = d1.dot(d2);
    let c = d1.dot(r);
    let f = d2.dot(r);
    let denom = a * e - b * b;
    let (s, t) = if denom <= EPSILON * a * e {
        parallel_parameters(p, q)
    } else {
        let mut s = ((b * f - c * e) / denom).clamp(0.0, 1.0);
        let mut t = (b * s + f) / e;
        if t < 0.0 {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else if t > 1.0 {
            t = 1.0;
            s = ((b - c) / a).clamp(0.0, 1.0);
        }
        (s, t)
    };

    let closest = ClosestPoints {
        s,
        t,
        point_a: p.point_at(s),
        point_b: q.point_at(t),
    };
    if closest.distance() <= EPSILON {
        return Err(GeometryError::Coincident);
    }
    Ok(closest)
}

/// Parameters of parallel segments: `s` at the middle of the overlap of `q`
/// projected onto `p`, `t` projected back from it.
fn parallel_parameters(p: &Segment, q: &Segment) -> (f64, f64) {
    let d1 = p.direction();
    let d2 = q.direction();
    let project = |x: DVec3, seg: &Segment, d: DVec3| (x - seg.a).dot(d) / d.length_squared();
    let (qa, qb) = (project(q.a, p, d1), project(q.b, p, d1));
    let (lo, hi) = (qa.min(qb).max(0.0), qa.max(qb).min(1.0));
    let s = if lo <= hi {
        0.5 * (lo + hi)
    } else if hi < 0.0 {
        0.0
    } else {
        1.0
    };
    let t = project(p.point_at(s), q, d2).clamp(0.0, 1.0);
    let s = project(q.point_at(t), p, d1).clamp(0.0, 1.0);
    (s, t)
}

/// Parameter and point on `segment` closest to `point`.
pub fn closest_point_on_segment(segment: &Segment, point: DVec3) -> Result<(f64, DVec3), GeometryError> {
    let d = segment.direction();
    let len2 = d.length_squared();
    if len2 <= EPSILON {
        return Err(GeometryError::ZeroLength);
    }
    let s = ((point - segment.a).dot(d) / len2).clamp(0.0, 1.0);
    Ok((s, segment.point_at(s)))
}

/// Angle in `[0, pi/2]` between two lines, ignoring their orientation.
pub fn line_angle(u: DVec3, v: DVec3) -> Option<f64> {
    let (nu, nv) = (u.try_normalize()?, v.try_normalize()?);
    Some(nu.dot(nv).abs().clamp(0.0, 1.0).acos())
}

/// Centerlines and sphere centers of every entity visible to a rank.
///
/// Built once in the pre-evaluation pass, shared by all pairs of a step.
#[derive(Debug, Clone, Default)]
pub struct GeometryCache {
    segments: BTreeMap<EntityId, (Segment, f64)>,
    points: BTreeMap<EntityId, (DVec3, f64)>,
}

impl GeometryCache {
    pub fn build(table: &EntityTable) -> Self {
        let mut cache = Self::default();
        for entity in table.iter() {
            match &entity.shape {
                Shape::Beam(b) => {
                    cache
                        .segments
                        .insert(entity.id, (Segment::new(b.positions[0], b.positions[1]), b.radius));
                }
                Shape::Sphere(s) => {
                    cache.points.insert(entity.id, (s.position, s.radius));
                }
                Shape::Particle(p) => {
                    cache.points.insert(entity.id, (p.position, p.radius));
                }
                Shape::Crosslinker(c) => {
                    cache.points.insert(entity.id, (c.position, 0.0));
                }
            }
        }
        cache
    }

    pub fn segment(&self, id: EntityId) -> Option<&Segment> {
        self.segments.get(&id).map(|(segment, _)| segment)
    }

    /// Cross-section radius of a beam, zero if unknown.
    pub fn beam_radius(&self, id: EntityId) -> f64 {
        self.segments.get(&id).map_or(0.0, |(_, radius)| *radius)
    }

    /// Center and radius of a point-like entity.
    pub fn point(&self, id: EntityId) -> Option<(DVec3, f64)> {
        self.points.get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(a: [f64; 3], b: [f64; 3]) -> Segment {
        Segment::new(DVec3::from_array(a), DVec3::from_array(b))
    }

    #[test]
    fn crossing_segments_meet_in_the_middle() {
        let p = seg([0.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        let q = seg([1.0, -1.0, 0.5], [1.0, 1.0, 0.5]);
        let cp = closest_points_segments(&p, &q).unwrap();
        assert!((cp.s - 0.5).abs() < 1e-12);
        assert!((cp.t - 0.5).abs() < 1e-12);
        assert!((cp.distance() - 0.5).abs() < 1e-12);
        assert_eq!(cp.separation(), DVec3::new(0.0, 0.0, -0.5));
    }

    #[test]
    fn endpoints_are_clamped() {
        let p = seg([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let q = seg([3.0, 1.0, 0.0], [3.0, 2.0, 0.0]);
        let cp = closest_points_segments(&p, &q).unwrap();
        assert_eq!(cp.s, 1.0);
        assert_eq!(cp.t, 0.0);
    }

    #[test]
    fn degenerate_cases_are_reported() {
        let p = seg([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        assert_eq!(
            closest_points_segments(&p, &seg([0.5, -1.0, 0.0], [0.5, 1.0, 0.0])),
            Err(GeometryError::Coincident)
        );
        assert_eq!(
            closest_points_segments(&p, &seg([0.5, 1.0, 0.0], [0.5, 1.0, 0.0])),
            Err(GeometryError::ZeroLength)
        );
    }

    #[test]
    fn parallel_segments_meet_in_the_middle_of_their_overlap() {
        let p = seg([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let cp = closest_points_segments(&p, &seg([1.5, 0.2, 0.0], [0.5, 0.2, 0.0])).unwrap();
        assert!((cp.s - 0.75).abs() < 1e-12);
        assert!((cp.t - 0.75).abs() < 1e-12);
        assert!((cp.separation() - DVec3::new(0.0, -0.2, 0.0)).length() < 1e-12);

        // no overlap: nearest ends
        let cp = closest_points_segments(&p, &seg([2.0, 0.0, 1.0], [3.0, 0.0, 1.0])).unwrap();
        assert_eq!((cp.s, cp.t), (1.0, 0.0));
        assert!((cp.distance() - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn point_projection() {
        let p = seg([0.0, 0.0, 0.0], [4.0, 0.0, 0.0]);
        let (s, x) = closest_point_on_segment(&p, DVec3::new(1.0, 3.0, 0.0)).unwrap();
        assert_eq!(s, 0.25);
        assert_eq!(x, DVec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn line_angle_ignores_orientation() {
        let a = line_angle(DVec3::X, -DVec3::X).unwrap();
        assert!(a.abs() < 1e-12);
        let b = line_angle(DVec3::X, DVec3::Y).unwrap();
        assert!((b - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(line_angle(DVec3::ZERO, DVec3::X), None);
    }
}
