//! Penalty contact between beam centerlines and between beams and spheres.

use glam::{DMat3, DVec3};
use linkage_binning::EntityId;
use serde::{Deserialize, Serialize};

use crate::assembly::{EvaluationMode, NodalMatrix, PairEvaluation};
use crate::catalog::PairKind;
use crate::geometry::{closest_point_on_segment, closest_points_segments, GeometryCache, GeometryError, EPSILON};
use crate::params::{BeamContactParams, PenaltyLaw};

use super::PairError;

/// Whether a contact pair currently transmits force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactState {
    Inactive,
    Active,
}

impl std::fmt::Display for ContactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Penalty law evaluated at a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalty {
    law: PenaltyLaw,
    eps: f64,
    g0: f64,
}

impl Penalty {
    pub fn new(params: &BeamContactParams) -> Self {
        Self {
            law: params.law,
            eps: params.penalty,
            g0: params.regularization_gap,
        }
    }

    /// Gap below which the law produces force.
    pub fn active_gap(&self) -> f64 {
        match self.law {
            PenaltyLaw::Linear => 0.0,
            PenaltyLaw::LinPosQuadPen => self.g0,
        }
    }

    /// Repulsive force magnitude.
    pub fn force(&self, gap: f64) -> f64 {
        match self.law {
            PenaltyLaw::Linear if gap < 0.0 => -self.eps * gap,
            PenaltyLaw::Linear => 0.0,
            PenaltyLaw::LinPosQuadPen if gap <= 0.0 => 0.5 * self.eps * self.g0 - self.eps * gap,
            PenaltyLaw::LinPosQuadPen if gap < self.g0 => {
                0.5 * self.eps * self.g0 * (1.0 - gap / self.g0).powi(2)
            }
            PenaltyLaw::LinPosQuadPen => 0.0,
        }
    }

    /// Derivative of [`Self::force`] with respect to the gap.
    pub fn force_derivative(&self, gap: f64) -> f64 {
        match self.law {
            PenaltyLaw::Linear if gap < 0.0 => -self.eps,
            PenaltyLaw::Linear => 0.0,
            PenaltyLaw::LinPosQuadPen if gap <= 0.0 => -self.eps,
            PenaltyLaw::LinPosQuadPen if gap < self.g0 => -self.eps * (1.0 - gap / self.g0),
            PenaltyLaw::LinPosQuadPen => 0.0,
        }
    }

    /// Penalty potential; `-dE/dg` equals [`Self::force`].
    pub fn energy(&self, gap: f64) -> f64 {
        match self.law {
            PenaltyLaw::Linear if gap < 0.0 => 0.5 * self.eps * gap * gap,
            PenaltyLaw::Linear => 0.0,
            PenaltyLaw::LinPosQuadPen if gap <= 0.0 => {
                let f0 = 0.5 * self.eps * self.g0;
                self.eps * self.g0 * self.g0 / 6.0 - f0 * gap + 0.5 * self.eps * gap * gap
            }
            PenaltyLaw::LinPosQuadPen if gap < self.g0 => {
                self.eps * self.g0 * self.g0 / 6.0 * (1.0 - gap / self.g0).powi(3)
            }
            PenaltyLaw::LinPosQuadPen => 0.0,
        }
    }
}

/// Closest-point data of the current configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactGeometry {
    /// Centerline parameters; `t` is unused for spheres.
    pub s: f64,
    pub t: f64,
    pub point_a: DVec3,
    pub point_b: DVec3,
    /// Unit normal pointing from b to a.
    pub normal: DVec3,
    pub distance: f64,
    pub gap: f64,
}

/// Contact of a beam with another beam or a sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamContactPair {
    ids: [EntityId; 2],
    kind: PairKind,
    penalty: Penalty,
    state: ContactState,
    geometry: Option<ContactGeometry>,
}

impl BeamContactPair {
    /// A new inactive pair; `kind` is [`PairKind::BeamBeam`] or
    /// [`PairKind::BeamSphere`] with the sphere second.
    pub fn new(a: EntityId, b: EntityId, kind: PairKind, params: &BeamContactParams) -> Self {
        Self {
            ids: [a, b],
            kind,
            penalty: Penalty::new(params),
            state: ContactState::Inactive,
            geometry: None,
        }
    }

    pub fn ids(&self) -> [EntityId; 2] {
        self.ids
    }

    pub fn kind(&self) -> PairKind {
        self.kind
    }

    pub fn state(&self) -> ContactState {
        self.state
    }

    pub fn geometry(&self) -> Option<&ContactGeometry> {
        self.geometry.as_ref()
    }

    /// Forget the configuration of the previous evaluation.
    pub fn reset_state(&mut self) {
        self.state = ContactState::Inactive;
        self.geometry = None;
    }

    /// Closest points and activity for the current configuration.
    pub fn pre_evaluate(&mut self, cache: &GeometryCache) -> Result<(), PairError> {
        self.reset_state();
        let [a, b] = self.ids;
        let seg_a = cache.segment(a).ok_or(PairError::MissingGeometry(a))?;

        let (s, t, point_a, point_b, radius_b) = match self.kind {
            PairKind::BeamSphere => {
                let (center, radius) = cache.point(b).ok_or(PairError::MissingGeometry(b))?;
                let (s, x) = closest_point_on_segment(seg_a, center)?;
                (s, 0.0, x, center, radius)
            }
            _ => {
                let seg_b = cache.segment(b).ok_or(PairError::MissingGeometry(b))?;
                let cp = closest_points_segments(seg_a, seg_b)?;
                (cp.s, cp.t, cp.point_a, cp.point_b, cache.beam_radius(b))
            }
        };

        let d = point_a - point_b;
        let distance = d.length();
        if distance <= EPSILON {
            return Err(PairError::Degenerate(GeometryError::Coincident));
        }
        let gap = distance - cache.beam_radius(a) - radius_b;
        self.geometry = Some(ContactGeometry {
            s,
            t,
            point_a,
            point_b,
            normal: d / distance,
            distance,
            gap,
        });
        if gap < self.penalty.active_gap() {
            self.state = ContactState::Active;
        }
        Ok(())
    }

    fn weights(&self, geometry: &ContactGeometry) -> (Vec<f64>, Vec<f64>) {
        let wa = vec![1.0 - geometry.s, geometry.s];
        let wb = match self.kind {
            PairKind::BeamSphere => vec![1.0],
            _ => vec![1.0 - geometry.t, geometry.t],
        };
        (wa, wb)
    }

    fn node_counts(&self) -> (usize, usize) {
        match self.kind {
            PairKind::BeamSphere => (2, 1),
            _ => (2, 2),
        }
    }

    /// Force on entity a; the force on b is its negative.
    pub fn contact_force(&self) -> DVec3 {
        match (self.state, &self.geometry) {
            (ContactState::Active, Some(g)) => g.normal * self.penalty.force(g.gap),
            _ => DVec3::ZERO,
        }
    }

    /// Nodal forces and stiffness of the pair.
    pub fn evaluate(&self, mode: EvaluationMode) -> PairEvaluation {
        let (na, nb) = self.node_counts();
        let geometry = match (self.state, &self.geometry) {
            (ContactState::Active, Some(g)) => g,
            _ => return PairEvaluation::inactive(na, nb, mode),
        };
        let (wa, wb) = self.weights(geometry);
        let f = self.penalty.force(geometry.gap);
        let force = geometry.normal * f;

        let forces = if mode.wants_force() {
            [
                wa.iter().map(|w| force * *w).collect(),
                wb.iter().map(|w| -force * *w).collect(),
            ]
        } else {
            [vec![DVec3::ZERO; na], vec![DVec3::ZERO; nb]]
        };

        let stiffness = mode.wants_stiffness().then(|| {
            let n = geometry.normal;
            let nn = DMat3::from_cols(n * n.x, n * n.y, n * n.z);
            let df = self.penalty.force_derivative(geometry.gap);
            // K = -dF_a/dd with closest-point parameters frozen
            let m = nn * -df - (DMat3::IDENTITY - nn) * (f / geometry.distance);
            [
                [NodalMatrix::outer(&wa, &wa, m), NodalMatrix::outer(&wa, &wb, -m)],
                [NodalMatrix::outer(&wb, &wa, -m), NodalMatrix::outer(&wb, &wb, m)],
            ]
        });

        PairEvaluation {
            forces,
            stiffness,
            active: true,
        }
    }

    /// Penalty energy of the current configuration.
    pub fn energy(&self) -> f64 {
        match (self.state, &self.geometry) {
            (ContactState::Active, Some(g)) => self.penalty.energy(g.gap),
            _ => 0.0,
        }
    }
}
