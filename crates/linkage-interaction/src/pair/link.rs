//! Double-bonded crosslinker acting as an axial spring between two spots.

use glam::{DMat3, DVec3};
use linkage_binning::EntityId;
use linkage_consensus::BindingSpot;
use serde::{Deserialize, Serialize};

use crate::assembly::{EvaluationMode, NodalMatrix, PairEvaluation};
use crate::entity::LinkerType;
use crate::geometry::{GeometryCache, GeometryError, EPSILON};

use super::PairError;

/// Truss spring between the two binding spots of a linker.
///
/// Exists exactly as long as both bonds of the linker are committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamLink {
    pub crosslinker: EntityId,
    pub linker: LinkerType,
    pub spots: [BindingSpot; 2],
    /// Centerline parameters of the spots on their elements.
    pub xi: [f64; 2],
    /// Spot distance when the second bond formed.
    pub reference_length: f64,
    pub stiffness: f64,
    pub created_step: u64,
    #[serde(skip)]
    positions: Option<[DVec3; 2]>,
}

impl BeamLink {
    pub fn new(
        crosslinker: EntityId,
        linker: LinkerType,
        spots: [BindingSpot; 2],
        xi: [f64; 2],
        reference_length: f64,
        stiffness: f64,
        created_step: u64,
    ) -> Self {
        Self {
            crosslinker,
            linker,
            spots,
            xi,
            reference_length,
            stiffness,
            created_step,
            positions: None,
        }
    }

    /// The two beam elements carrying the spots.
    pub fn elements(&self) -> [EntityId; 2] {
        [self.spots[0].element, self.spots[1].element]
    }

    pub fn reset_state(&mut self) {
        self.positions = None;
    }

    /// Current spot positions from the element centerlines.
    pub fn pre_evaluate(&mut self, cache: &GeometryCache) -> Result<(), PairError> {
        self.positions = None;
        let mut positions = [DVec3::ZERO; 2];
        for (k, spot) in self.spots.iter().enumerate() {
            let segment = cache
                .segment(spot.element)
                .ok_or(PairError::MissingGeometry(spot.element))?;
            positions[k] = segment.point_at(self.xi[k]);
        }
        if positions[0].distance(positions[1]) <= EPSILON {
            return Err(PairError::Degenerate(GeometryError::Coincident));
        }
        self.positions = Some(positions);
        Ok(())
    }

    pub fn positions(&self) -> Option<[DVec3; 2]> {
        self.positions
    }

    pub fn length(&self) -> Option<f64> {
        self.positions.map(|[a, b]| a.distance(b))
    }

    /// Axial force, positive in tension.
    pub fn tension(&self) -> f64 {
        self.length()
            .map_or(0.0, |l| self.stiffness * (l - self.reference_length))
    }

    /// Magnitude of the force the linker transmits.
    pub fn force_magnitude(&self) -> f64 {
        self.tension().abs()
    }

    /// Nodal forces on the two elements and the consistent stiffness.
    pub fn evaluate(&self, mode: EvaluationMode) -> PairEvaluation {
        let Some([x0, x1]) = self.positions else {
            return PairEvaluation::inactive(2, 2, mode);
        };
        let d = x1 - x0;
        let l = d.length();
        let e = d / l;
        let tension = self.stiffness * (l - self.reference_length);
        let w0 = [1.0 - self.xi[0], self.xi[0]];
        let w1 = [1.0 - self.xi[1], self.xi[1]];

        let forces = if mode.wants_force() {
            let f = e * tension;
            [w0.iter().map(|w| f * *w).collect(), w1.iter().map(|w| -f * *w).collect()]
        } else {
            [vec![DVec3::ZERO; 2], vec![DVec3::ZERO; 2]]
        };

        let stiffness = mode.wants_stiffness().then(|| {
            let ee = DMat3::from_cols(e * e.x, e * e.y, e * e.z);
            let m = ee * self.stiffness + (DMat3::IDENTITY - ee) * (tension / l);
            [
                [NodalMatrix::outer(&w0, &w0, m), NodalMatrix::outer(&w0, &w1, -m)],
                [NodalMatrix::outer(&w1, &w0, -m), NodalMatrix::outer(&w1, &w1, m)],
            ]
        });

        PairEvaluation {
            forces,
            stiffness,
            active: true,
        }
    }

    /// Elastic energy `k (l - l0)^2 / 2`.
    pub fn energy(&self) -> f64 {
        self.length().map_or(0.0, |l| {
            let stretch = l - self.reference_length;
            0.5 * self.stiffness * stretch * stretch
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BeamGeometry, Entity, EntityTable, FilamentType, NodeId, Shape};
    use linkage_comm::Rank;

    fn cache(gap: f64) -> GeometryCache {
        let mut table = EntityTable::new(Rank(0));
        for (id, y) in [(1u64, 0.0), (2, gap)] {
            table.insert(Entity {
                id: EntityId(id),
                owner: Rank(0),
                shape: Shape::Beam(BeamGeometry {
                    nodes: [NodeId(id * 10), NodeId(id * 10 + 1)],
                    positions: [DVec3::new(0.0, y, 0.0), DVec3::new(1.0, y, 0.0)],
                    radius: 0.01,
                    filament: FilamentType::Arbitrary,
                    binding_spots: vec![0.5],
                }),
                ghost_holders: Vec::new(),
            });
        }
        GeometryCache::build(&table)
    }

    fn link(reference_length: f64) -> BeamLink {
        BeamLink::new(
            EntityId(100),
            LinkerType::Arbitrary,
            [BindingSpot::new(EntityId(1), 0), BindingSpot::new(EntityId(2), 0)],
            [0.5, 0.5],
            reference_length,
            4.0,
            0,
        )
    }

    #[test]
    fn unstretched_link_is_force_free() {
        let mut l = link(0.3);
        l.pre_evaluate(&cache(0.3)).unwrap();
        let eval = l.evaluate(EvaluationMode::Force);
        assert!(eval.forces.iter().flatten().all(|f| f.length() < 1e-12));
        assert!(l.energy().abs() < 1e-20);
    }

    #[test]
    fn stretched_link_pulls_spots_together() {
        let mut l = link(0.3);
        l.pre_evaluate(&cache(0.5)).unwrap();
        assert!((l.tension() - 0.8).abs() < 1e-12);
        let eval = l.evaluate(EvaluationMode::Force);
        let on_first: DVec3 = eval.forces[0].iter().copied().sum();
        assert!((on_first - DVec3::new(0.0, 0.8, 0.0)).length() < 1e-12);
        assert!(eval.net_force().length() < 1e-12);
        assert!((l.energy() - 0.5 * 4.0 * 0.04).abs() < 1e-12);
    }

    #[test]
    fn stiffness_matches_finite_difference() {
        let mut l = link(0.3);
        l.pre_evaluate(&cache(0.5)).unwrap();
        let k = l.evaluate(EvaluationMode::Stiffness).stiffness.unwrap();
        // move the second element rigidly by h in y
        let h = 1e-7;
        let mut moved = l.clone();
        moved.pre_evaluate(&cache(0.5 + h)).unwrap();
        let f0: DVec3 = l.evaluate(EvaluationMode::Force).forces[0].iter().copied().sum();
        let f1: DVec3 = moved.evaluate(EvaluationMode::Force).forces[0].iter().copied().sum();
        let numeric = -(f1 - f0) / h;
        let mut analytic = DVec3::ZERO;
        for r in 0..2 {
            for c in 0..2 {
                analytic += k[0][1].block(r, c) * DVec3::Y;
            }
        }
        assert!((numeric - analytic).length() < 1e-5);
    }

    #[test]
    fn coincident_spots_are_degenerate() {
        let mut l = link(0.0);
        assert_eq!(
            l.pre_evaluate(&cache(0.0)),
            Err(PairError::Degenerate(GeometryError::Coincident))
        );
        assert_eq!(l.positions(), None);
    }

    #[test]
    fn missing_element_is_reported() {
        let mut l = link(0.3);
        l.spots[1] = BindingSpot::new(EntityId(9), 0);
        assert_eq!(
            l.pre_evaluate(&cache(0.3)),
            Err(PairError::MissingGeometry(EntityId(9)))
        );
    }
}
