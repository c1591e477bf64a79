//! Particle contact with tangential, rolling and adhesion history.
//!
//! Evaluation never mutates history. Updated springs are kept as trial
//! values and committed once per step, so a step may be evaluated any
//! number of times. Committing touches every pair still in contact; the
//! rest is erased by the history epoch.

use std::collections::BTreeMap;

use glam::{DMat3, DVec3};
use linkage_binning::{EntityId, EntityKind};
use linkage_comm::Communicator;
use linkage_consensus::{uniform_draw, DrawStream};
use linkage_history::{communicate_history_pairs, distribute_history_pairs, HistoryPairStore, MigrationSummary, PairKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembly::{Assembler, EvaluationMode, NodalMatrix};
use crate::catalog::{PairCatalog, PairKind};
use crate::entity::{EntityTable, ParticleGeometry};
use crate::error::{Error, Result};
use crate::geometry::EPSILON;
use crate::params::DemParams;

/// Elastic spring of a frictional contact mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpringHistory {
    /// Accumulated tangential displacement.
    pub gap: DVec3,
    /// Whether the spring stuck in its last update.
    pub stick: bool,
}

/// History of one particle pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemHistory {
    pub tangential: SpringHistory,
    pub rolling: SpringHistory,
    /// Surface energy drawn on first contact.
    pub surface_energy: Option<f64>,
}

impl DemHistory {
    /// Flat values for restart and output records.
    pub fn to_values(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(9);
        values.extend(self.tangential.gap.to_array());
        values.push(f64::from(u8::from(self.tangential.stick)));
        values.extend(self.rolling.gap.to_array());
        values.push(f64::from(u8::from(self.rolling.stick)));
        values.push(self.surface_energy.unwrap_or(f64::NAN));
        values
    }

    /// Inverse of [`Self::to_values`].
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let [tx, ty, tz, ts, rx, ry, rz, rs, gamma] = values else {
            return None;
        };
        Some(Self {
            tangential: SpringHistory {
                gap: DVec3::new(*tx, *ty, *tz),
                stick: *ts != 0.0,
            },
            rolling: SpringHistory {
                gap: DVec3::new(*rx, *ry, *rz),
                stick: *rs != 0.0,
            },
            surface_energy: (!gamma.is_nan()).then_some(*gamma),
        })
    }
}

/// Force, moments and energy of one evaluated pair.
#[derive(Debug, Clone, PartialEq)]
struct PairResponse {
    force_on_a: DVec3,
    moments: [DVec3; 2],
    normal: DVec3,
    normal_stiffness: f64,
    elastic: f64,
    adhesion: f64,
    trial: DemHistory,
}

/// DEM contact submodel of one rank.
#[derive(Debug, Clone)]
pub struct DemContact {
    params: DemParams,
    dt: f64,
    seed: u64,
    history: HistoryPairStore<DemHistory>,
    trial: BTreeMap<PairKey, DemHistory>,
    elastic_energy: f64,
    adhesion_energy: f64,
    contacts: usize,
}

impl DemContact {
    pub fn new(params: DemParams, dt: f64, seed: u64) -> Self {
        Self {
            params,
            dt,
            seed,
            history: HistoryPairStore::new(),
            trial: BTreeMap::new(),
            elastic_energy: 0.0,
            adhesion_energy: 0.0,
            contacts: 0,
        }
    }

    pub fn params(&self) -> &DemParams {
        &self.params
    }

    pub fn history(&self) -> &HistoryPairStore<DemHistory> {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryPairStore<DemHistory> {
        &mut self.history
    }

    /// Pairs in contact at the last evaluation.
    pub fn contacts(&self) -> usize {
        self.contacts
    }

    pub fn elastic_energy(&self) -> f64 {
        self.elastic_energy
    }

    pub fn adhesion_energy(&self) -> f64 {
        self.adhesion_energy
    }

    /// Surface energy of a pair, the same on every rank and in every run.
    pub fn surface_energy(&self, key: PairKey) -> f64 {
        let mean = self.params.adhesion_surface_energy;
        let u = uniform_draw(
            DrawStream::SurfaceEnergy,
            self.seed,
            &[key.primary().0, key.secondary().0],
            0,
        );
        mean * (1.0 + self.params.adhesion_spread * (2.0 * u - 1.0))
    }

    fn respond(&self, key: PairKey, a: &ParticleGeometry, b: &ParticleGeometry) -> Option<PairResponse> {
        let p = &self.params;
        let d = a.position - b.position;
        let distance = d.length();
        if distance <= EPSILON {
            debug!(pair = %key, "skipping coincident particles");
            return None;
        }
        let n = d / distance;
        let gap = distance - a.radius - b.radius;
        let adhesive = p.adhesion_enabled() && gap < p.adhesion_distance;
        if gap >= 0.0 && !adhesive {
            return None;
        }

        let previous = self.history.get(&key).cloned().unwrap_or_default();
        let mut trial = previous.clone();
        let r_eff = a.radius * b.radius / (a.radius + b.radius);

        // relative velocity of the contact point, a relative to b
        let v_rel = a.velocity + a.angular_velocity.cross(-n * a.radius)
            - b.velocity
            - b.angular_velocity.cross(n * b.radius);
        let vn = v_rel.dot(n);
        let vt = v_rel - n * vn;

        let mut force = DVec3::ZERO;
        let mut moments = [DVec3::ZERO; 2];
        let mut elastic = 0.0;
        let mut normal_force = 0.0;
        if gap < 0.0 {
            normal_force = (-p.normal_stiffness * gap - p.normal_damping * vn).max(0.0);
            force += n * normal_force;
            elastic += 0.5 * p.normal_stiffness * gap * gap;
        }

        if p.tangential_enabled() && gap < 0.0 {
            let spring = previous.tangential.gap - n * previous.tangential.gap.dot(n) + vt * self.dt;
            let mut ft = -spring * p.tangential_stiffness - vt * p.tangential_damping;
            let limit = p.friction * normal_force;
            let stick = ft.length() <= limit;
            let spring = if stick {
                spring
            } else {
                ft = ft.normalize_or_zero() * limit;
                -(ft + vt * p.tangential_damping) / p.tangential_stiffness
            };
            trial.tangential = SpringHistory { gap: spring, stick };
            force += ft;
            moments[0] += (-n * a.radius).cross(ft);
            moments[1] += (n * b.radius).cross(-ft);
            elastic += 0.5 * p.tangential_stiffness * spring.length_squared();
        }

        if p.rolling_enabled() && gap < 0.0 {
            let v_roll = -(a.angular_velocity - b.angular_velocity).cross(n) * r_eff;
            let spring = previous.rolling.gap - n * previous.rolling.gap.dot(n) + v_roll * self.dt;
            let mut fr = -spring * p.rolling_stiffness;
            let limit = p.rolling_friction * normal_force;
            let stick = fr.length() <= limit;
            let spring = if stick {
                spring
            } else {
                fr = fr.normalize_or_zero() * limit;
                -fr / p.rolling_stiffness
            };
            trial.rolling = SpringHistory { gap: spring, stick };
            let moment = (n * r_eff).cross(fr);
            moments[0] += -moment;
            moments[1] += moment;
            elastic += 0.5 * p.rolling_stiffness * spring.length_squared();
        }

        let mut adhesion = 0.0;
        if adhesive {
            let gamma = previous.surface_energy.unwrap_or_else(|| self.surface_energy(key));
            trial.surface_energy = Some(gamma);
            let pull = 2.0 * std::f64::consts::PI * r_eff * gamma;
            force -= n * pull;
            adhesion = -pull * (p.adhesion_distance - gap);
        }

        Some(PairResponse {
            force_on_a: force,
            moments,
            normal: n,
            normal_stiffness: if gap < 0.0 { p.normal_stiffness } else { 0.0 },
            elastic,
            adhesion,
            trial,
        })
    }

    /// Evaluate all particle pairs of `catalog` and assemble them.
    pub fn evaluate<A>(
        &mut self,
        table: &EntityTable,
        catalog: &PairCatalog,
        mode: EvaluationMode,
        assembler: &mut A,
    ) -> Result<()>
    where
        A: Assembler + ?Sized,
    {
        let rank = table.rank();
        self.trial.clear();
        self.elastic_energy = 0.0;
        self.adhesion_energy = 0.0;
        self.contacts = 0;

        for pair in catalog.of_kind(PairKind::ParticleParticle) {
            let lookup = |id: EntityId| {
                table.particle(id).ok_or(Error::UnknownEntity {
                    entity: id,
                    kind: EntityKind::Particle,
                    rank,
                })
            };
            let key = PairKey::new(pair.a, pair.b);
            let ids = [key.primary(), key.secondary()];
            let (first, second) = (lookup(ids[0])?, lookup(ids[1])?);
            let Some(response) = self.respond(key, first, second) else {
                continue;
            };

            self.contacts += 1;
            self.elastic_energy += response.elastic;
            self.adhesion_energy += response.adhesion;
            self.trial.insert(key, response.trial);

            if mode.wants_force() {
                assembler.assemble_force(ids, &[vec![response.force_on_a], vec![-response.force_on_a]]);
                assembler.assemble_moment(ids[0], response.moments[0]);
                assembler.assemble_moment(ids[1], response.moments[1]);
            }
            if mode.wants_stiffness() {
                let n = response.normal;
                let m = DMat3::from_cols(n * n.x, n * n.y, n * n.z) * response.normal_stiffness;
                let block = |s: f64| NodalMatrix::outer(&[1.0], &[1.0], m * s);
                assembler.assemble_stiffness(ids, &[[block(1.0), block(-1.0)], [block(-1.0), block(1.0)]]);
            }
        }
        Ok(())
    }

    /// Commit trial history and close the history epoch.
    pub fn update_history(&mut self) -> usize {
        for (key, value) in std::mem::take(&mut self.trial) {
            self.history.insert(key, value);
        }
        self.history.update_history_pairs()
    }

    /// Move history with its primary entity, then refresh ghost copies.
    pub fn redistribute<C>(&mut self, comm: &C, table: &EntityTable) -> Result<MigrationSummary>
    where
        C: Communicator + ?Sized,
    {
        self.trial.clear();
        let summary = distribute_history_pairs(&mut self.history, comm, |e| table.owner_of(e))?;
        communicate_history_pairs(&mut self.history, comm, |e| table.ghost_holders(e))?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::CollectingAssembler;
    use crate::catalog::{CandidatePair, CompatibilityTable};
    use crate::entity::{Entity, Shape};
    use linkage_binning::{BinGrid, BinningIndex};
    use linkage_comm::Rank;

    fn particle(id: u64, position: DVec3, velocity: DVec3) -> Entity {
        Entity {
            id: EntityId(id),
            owner: Rank(0),
            shape: Shape::Particle(ParticleGeometry {
                position,
                velocity,
                angular_velocity: DVec3::ZERO,
                radius: 0.5,
                mass: 1.0,
            }),
            ghost_holders: Vec::new(),
        }
    }

    fn setup(entities: Vec<Entity>) -> (EntityTable, PairCatalog) {
        let mut table = EntityTable::new(Rank(0));
        let mut index = BinningIndex::new(BinGrid::new(DVec3::ZERO, DVec3::splat(4.0), 1.5).unwrap());
        for e in entities {
            if let Shape::Particle(p) = &e.shape {
                index.insert_point(e.id, EntityKind::Particle, p.position).unwrap();
            }
            table.insert(e);
        }
        let compat = CompatibilityTable::new().allow(EntityKind::Particle, EntityKind::Particle);
        let catalog = PairCatalog::rebuild(&compat, &table, &index).unwrap();
        (table, catalog)
    }

    #[test]
    fn history_values_round_trip_through_records() {
        let history = DemHistory {
            tangential: SpringHistory {
                gap: DVec3::new(0.1, -0.2, 0.0),
                stick: true,
            },
            rolling: SpringHistory::default(),
            surface_energy: None,
        };
        assert_eq!(DemHistory::from_values(&history.to_values()), Some(history));
        assert_eq!(DemHistory::from_values(&[1.0, 2.0]), None);
    }

    #[test]
    fn overlapping_particles_repel() {
        let (table, catalog) = setup(vec![
            particle(1, DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO),
            particle(2, DVec3::new(1.9, 1.0, 1.0), DVec3::ZERO),
        ]);
        assert_eq!(
            catalog.pairs(),
            &[CandidatePair {
                a: EntityId(1),
                b: EntityId(2),
                kind: PairKind::ParticleParticle
            }]
        );
        let mut dem = DemContact::new(DemParams::default().with_normal(100.0, 0.0), 0.01, 1);
        let mut asm = CollectingAssembler::new();
        dem.evaluate(&table, &catalog, EvaluationMode::ForceStiffness, &mut asm).unwrap();
        let f = asm.force(EntityId(1), 0);
        assert!((f - DVec3::new(-10.0, 0.0, 0.0)).length() < 1e-9);
        assert!(asm.net_force().length() < 1e-12);
        assert!((dem.elastic_energy() - 0.5 * 100.0 * 0.01).abs() < 1e-9);
        assert_eq!(asm.stiffness[&(EntityId(1), 0, EntityId(1), 0)].x_axis.x, 100.0);
    }

    #[test]
    fn separated_particles_leave_no_history() {
        let (table, catalog) = setup(vec![
            particle(1, DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO),
            particle(2, DVec3::new(2.2, 1.0, 1.0), DVec3::ZERO),
        ]);
        let mut dem = DemContact::new(DemParams::default(), 0.01, 1);
        let mut asm = CollectingAssembler::new();
        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        assert_eq!(dem.contacts(), 0);
        dem.update_history();
        assert!(dem.history().is_empty());
    }

    #[test]
    fn tangential_spring_accumulates_once_per_step() {
        let (table, catalog) = setup(vec![
            particle(1, DVec3::new(1.0, 1.0, 1.0), DVec3::new(0.0, 1.0, 0.0)),
            particle(2, DVec3::new(1.9, 1.0, 1.0), DVec3::ZERO),
        ]);
        let params = DemParams::default()
            .with_normal(100.0, 0.0)
            .with_tangential(50.0, 0.0, 10.0);
        let mut dem = DemContact::new(params, 0.01, 1);
        let mut asm = CollectingAssembler::new();
        let key = PairKey::new(EntityId(1), EntityId(2));

        // two evaluations within one step leave the same trial
        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        dem.update_history();
        let gap = dem.history().get(&key).unwrap().tangential.gap;
        assert!((gap - DVec3::new(0.0, 0.01, 0.0)).length() < 1e-12);

        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        dem.update_history();
        let h = dem.history().get(&key).unwrap();
        assert!((h.tangential.gap - DVec3::new(0.0, 0.02, 0.0)).length() < 1e-12);
        assert!(h.tangential.stick);
    }

    #[test]
    fn coulomb_limit_caps_tangential_force() {
        let (table, catalog) = setup(vec![
            particle(1, DVec3::new(1.0, 1.0, 1.0), DVec3::new(0.0, 100.0, 0.0)),
            particle(2, DVec3::new(1.9, 1.0, 1.0), DVec3::ZERO),
        ]);
        let params = DemParams::default()
            .with_normal(100.0, 0.0)
            .with_tangential(50.0, 0.0, 0.1);
        let mut dem = DemContact::new(params, 0.01, 1);
        let mut asm = CollectingAssembler::new();
        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        let f = asm.force(EntityId(1), 0);
        // normal 10, friction limit 1
        assert!((f.y.abs() - 1.0).abs() < 1e-9);
        dem.update_history();
        assert!(!dem.history().get(&PairKey::new(EntityId(1), EntityId(2))).unwrap().tangential.stick);
    }

    #[test]
    fn adhesion_pulls_within_range_with_stable_surface_energy() {
        let (table, catalog) = setup(vec![
            particle(1, DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO),
            particle(2, DVec3::new(2.05, 1.0, 1.0), DVec3::ZERO),
        ]);
        let params = DemParams::default().with_adhesion(2.0, 0.2, 0.1);
        let mut dem = DemContact::new(params.clone(), 0.01, 42);
        let mut asm = CollectingAssembler::new();
        dem.evaluate(&table, &catalog, EvaluationMode::Force, &mut asm).unwrap();
        assert!(asm.force(EntityId(1), 0).x > 0.0);
        assert!(dem.adhesion_energy() < 0.0);
        dem.update_history();

        let key = PairKey::new(EntityId(1), EntityId(2));
        let gamma = dem.history().get(&key).unwrap().surface_energy.unwrap();
        assert!((1.6..=2.4).contains(&gamma));
        assert_eq!(gamma, DemContact::new(params, 0.01, 42).surface_energy(key));
    }
}
