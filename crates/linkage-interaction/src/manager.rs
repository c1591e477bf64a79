//! Per-step driver of all interaction submodels on one rank.
//!
//! # Phases
//!
//! ```text
//! Idle -> CatalogBuilt -> Reset -> Evaluated -> StateUpdated -> CatalogBuilt -> ...
//! ```
//!
//! Evaluation and state updates need a catalog built since the last state
//! update. Redistribution and restart invalidate the catalog and return the
//! manager to [`Phase::Idle`]. Every collective operation must be called on
//! all ranks in the same order.

use std::collections::BTreeMap;

use glam::DVec3;
use linkage_binning::{EntityId, EntityKind, SpatialIndex};
use linkage_comm::Communicator;
use linkage_history::communicate_history_pairs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assembly::{Assembler, EvaluationMode};
use crate::catalog::{CompatibilityTable, PairCatalog, PairKind};
use crate::crosslinking::{BindingSummary, Crosslinking};
use crate::dem::DemContact;
use crate::entity::EntityTable;
use crate::error::{Error, Result};
use crate::geometry::GeometryCache;
use crate::output::{BondPoint, ContactPoint, CrosslinkerPoint, VisualizationFrame};
use crate::pair::{BeamContactPair, ContactState, InteractionPair, PairError};
use crate::params::InteractionParams;
use crate::restart::{CrosslinkerRecord, PairRecord, RestartChunk};

/// Where the manager is within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No valid catalog.
    Idle,
    /// Pairs rebuilt from the spatial index.
    CatalogBuilt,
    /// Caches refreshed for a new configuration.
    Reset,
    /// Forces or stiffness assembled at least once.
    Evaluated,
    /// Bonds and history committed for the step.
    StateUpdated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::CatalogBuilt => write!(f, "CatalogBuilt"),
            Self::Reset => write!(f, "Reset"),
            Self::Evaluated => write!(f, "Evaluated"),
            Self::StateUpdated => write!(f, "StateUpdated"),
        }
    }
}

/// Energy contributions reported by [`InteractionManager::energy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnergyType {
    BeamContactPenalty,
    LinkerElastic,
    DemElastic,
    DemAdhesion,
}

/// What one state update did on this rank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u64,
    /// Candidate pairs in the catalog.
    pub candidates: usize,
    pub active_contacts: usize,
    /// Double-bonded linkers owned here.
    pub links: usize,
    pub binding: BindingSummary,
    pub dem_contacts: usize,
    /// History entries erased at the end of the step.
    pub history_erased: usize,
}

const BEFORE_STATE_UPDATE: [Phase; 3] = [Phase::CatalogBuilt, Phase::Reset, Phase::Evaluated];

/// Interaction layer of one rank.
#[derive(Debug)]
pub struct InteractionManager<C> {
    comm: C,
    params: InteractionParams,
    compatibility: CompatibilityTable,
    phase: Phase,
    step: u64,
    catalog: PairCatalog,
    pairs: Vec<InteractionPair>,
    crosslinking: Option<Crosslinking>,
    dem: Option<DemContact>,
    energies: BTreeMap<EnergyType, f64>,
}

impl<C: Communicator> InteractionManager<C> {
    /// Validate `params` and create the enabled submodels.
    pub fn new(comm: C, params: InteractionParams) -> Result<Self> {
        params.validate()?;
        let crosslinking = params
            .crosslinking
            .clone()
            .map(|p| Crosslinking::new(p, params.dt, params.seed));
        let dem = params.dem.clone().map(|p| DemContact::new(p, params.dt, params.seed));
        Ok(Self {
            compatibility: CompatibilityTable::from_params(&params),
            comm,
            params,
            phase: Phase::Idle,
            step: 0,
            catalog: PairCatalog::default(),
            pairs: Vec::new(),
            crosslinking,
            dem,
            energies: BTreeMap::new(),
        })
    }

    /// Keep diffusing crosslinkers inside `[lower, upper]`.
    #[must_use]
    pub fn with_domain(mut self, lower: DVec3, upper: DVec3) -> Self {
        if let Some(xl) = &mut self.crosslinking {
            xl.set_domain(lower, upper);
        }
        self
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn params(&self) -> &InteractionParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn catalog(&self) -> &PairCatalog {
        &self.catalog
    }

    pub fn pairs(&self) -> &[InteractionPair] {
        &self.pairs
    }

    pub fn crosslinking(&self) -> Option<&Crosslinking> {
        self.crosslinking.as_ref()
    }

    pub fn dem(&self) -> Option<&DemContact> {
        self.dem.as_ref()
    }

    fn require(&self, operation: &'static str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::PhaseOrder {
                operation,
                phase: self.phase,
            })
        }
    }

    fn check_rank(&self, table: &EntityTable) -> Result<()> {
        let me = self.comm.rank();
        if table.rank() != me {
            return Err(Error::InvalidParameter(format!(
                "entity table of {} handed to the manager of {me}",
                table.rank()
            )));
        }
        Ok(())
    }

    /// Create persistent state for every entity of `table`.
    pub fn setup(&mut self, table: &EntityTable) -> Result<()> {
        self.require("setup", &[Phase::Idle])?;
        self.check_rank(table)?;
        if let Some(xl) = &mut self.crosslinking {
            xl.setup(table);
        }
        info!(
            rank = %self.comm.rank(),
            entities = table.len(),
            crosslinking = self.crosslinking.is_some(),
            dem = self.dem.is_some(),
            contact = self.params.contact.is_some(),
            "interaction manager set up"
        );
        Ok(())
    }

    /// Move persistent state to the owners recorded in `table`.
    ///
    /// Collective. The catalog is invalid afterwards.
    pub fn redistribute(&mut self, table: &EntityTable) -> Result<()> {
        self.require("redistribute", &[Phase::Idle, Phase::StateUpdated])?;
        self.check_rank(table)?;
        if let Some(xl) = &mut self.crosslinking {
            xl.redistribute(&self.comm, table)?;
        }
        if let Some(dem) = &mut self.dem {
            let summary = dem.redistribute(&self.comm, table)?;
            debug!(
                rank = %self.comm.rank(),
                sent = summary.sent,
                received = summary.received,
                dropped = summary.dropped,
                "dem history redistributed"
            );
        }
        self.catalog = PairCatalog::default();
        self.pairs.clear();
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Rebuild candidate pairs and the evaluated pair list for `step`.
    pub fn update_step_element<S>(&mut self, table: &EntityTable, index: &S, step: u64) -> Result<()>
    where
        S: SpatialIndex + ?Sized,
    {
        self.check_rank(table)?;
        self.step = step;
        self.catalog = PairCatalog::rebuild(&self.compatibility, table, index)?;

        self.pairs.clear();
        if let Some(contact) = &self.params.contact {
            for pair in self.catalog.pairs() {
                if matches!(pair.kind, PairKind::BeamBeam | PairKind::BeamSphere) {
                    let contact_pair = BeamContactPair::new(pair.a, pair.b, pair.kind, contact);
                    self.pairs.push(InteractionPair::BeamContact(contact_pair));
                }
            }
        }
        if let Some(xl) = &self.crosslinking {
            for link in xl.links() {
                self.pairs.push(InteractionPair::BeamLink(link.clone()));
            }
        }

        debug!(
            rank = %self.comm.rank(),
            step,
            candidates = self.catalog.len(),
            pairs = self.pairs.len(),
            "catalog rebuilt"
        );
        self.phase = Phase::CatalogBuilt;
        Ok(())
    }

    /// Start a new configuration: move bond ends with their elements and
    /// forget the previous evaluation.
    pub fn reset(&mut self, table: &EntityTable) -> Result<()> {
        self.require("reset", &[Phase::CatalogBuilt, Phase::Reset, Phase::Evaluated])?;
        if let Some(xl) = &mut self.crosslinking {
            xl.update_bond_geometry(table);
        }
        self.pairs.iter_mut().for_each(InteractionPair::reset_state);
        self.energies.clear();
        self.phase = Phase::Reset;
        Ok(())
    }

    pub fn evaluate_force<A>(&mut self, table: &EntityTable, assembler: &mut A) -> Result<()>
    where
        A: Assembler + ?Sized,
    {
        self.evaluate("evaluate_force", table, EvaluationMode::Force, assembler)
    }

    pub fn evaluate_stiff<A>(&mut self, table: &EntityTable, assembler: &mut A) -> Result<()>
    where
        A: Assembler + ?Sized,
    {
        self.evaluate("evaluate_stiff", table, EvaluationMode::Stiffness, assembler)
    }

    pub fn evaluate_force_stiff<A>(&mut self, table: &EntityTable, assembler: &mut A) -> Result<()>
    where
        A: Assembler + ?Sized,
    {
        self.evaluate("evaluate_force_stiff", table, EvaluationMode::ForceStiffness, assembler)
    }

    fn evaluate<A>(
        &mut self,
        operation: &'static str,
        table: &EntityTable,
        mode: EvaluationMode,
        assembler: &mut A,
    ) -> Result<()>
    where
        A: Assembler + ?Sized,
    {
        self.require(operation, &BEFORE_STATE_UPDATE)?;
        let rank = self.comm.rank();

        if let Some(xl) = &self.crosslinking {
            for pair in &self.pairs {
                if let InteractionPair::BeamLink(link) = pair {
                    if !xl.is_committed(link) {
                        return Err(Error::Uncommitted {
                            crosslinker: link.crosslinker,
                            rank,
                            step: self.step,
                        });
                    }
                }
            }
        }

        // every pair sees the configuration before any pair is evaluated
        let cache = GeometryCache::build(table);
        let mut skipped = 0usize;
        for pair in &mut self.pairs {
            match pair.pre_evaluate(&cache) {
                Ok(()) => {}
                Err(PairError::Degenerate(reason)) => {
                    debug!(%rank, ids = ?pair.ids(), %reason, "skipping degenerate pair");
                    pair.reset_state();
                    skipped += 1;
                }
                Err(PairError::MissingGeometry(entity)) => {
                    return Err(Error::UnknownEntity {
                        entity,
                        kind: expected_kind(pair, entity),
                        rank,
                    });
                }
            }
        }

        let mut energies = BTreeMap::new();
        let mut active = 0usize;
        for pair in &self.pairs {
            if !pair.is_active() {
                continue;
            }
            active += 1;
            let energy_type = match pair {
                InteractionPair::BeamContact(_) => EnergyType::BeamContactPenalty,
                InteractionPair::BeamLink(_) => EnergyType::LinkerElastic,
            };
            *energies.entry(energy_type).or_insert(0.0) += pair.energy();

            let evaluation = pair.evaluate(mode);
            let ids = pair.ids();
            if mode.wants_force() {
                assembler.assemble_force(ids, &evaluation.forces);
            }
            if let Some(blocks) = &evaluation.stiffness {
                assembler.assemble_stiffness(ids, blocks);
            }
        }

        if let Some(dem) = &mut self.dem {
            dem.evaluate(table, &self.catalog, mode, assembler)?;
            energies.insert(EnergyType::DemElastic, dem.elastic_energy());
            energies.insert(EnergyType::DemAdhesion, dem.adhesion_energy());
        }
        self.energies = energies;

        debug!(%rank, step = self.step, active, skipped, pairs = self.pairs.len(), "pairs evaluated");
        self.phase = Phase::Evaluated;
        Ok(())
    }

    /// Commit the step: bind, unbind, diffuse, and close the history epoch.
    ///
    /// Collective.
    pub fn update_step_state(&mut self, table: &EntityTable, step: u64) -> Result<StepReport> {
        self.require("update_step_state", &BEFORE_STATE_UPDATE)?;
        self.step = step;
        let mut report = StepReport {
            step,
            candidates: self.catalog.len(),
            active_contacts: self
                .pairs
                .iter()
                .filter(|p| matches!(p, InteractionPair::BeamContact(c) if c.state() == ContactState::Active))
                .count(),
            ..StepReport::default()
        };

        if let Some(xl) = &mut self.crosslinking {
            let mut binding = xl.bind(&self.comm, table, &self.catalog, step)?;
            binding.unbound = xl.unbind(&self.comm, table, step)?;
            xl.diffuse(table, step);
            xl.refresh_ghosts(&self.comm, table, false)?;
            xl.check_occupancy(table)?;
            report.binding = binding;
            report.links = xl.links().count();
        }
        if let Some(dem) = &mut self.dem {
            report.dem_contacts = dem.contacts();
            report.history_erased = dem.update_history();
        }

        debug!(
            rank = %self.comm.rank(),
            step,
            granted = report.binding.granted,
            unbound = report.binding.unbound,
            stale = report.binding.stale,
            links = report.links,
            "step state updated"
        );
        self.phase = Phase::StateUpdated;
        Ok(report)
    }

    /// Energies of the pairs evaluated on this rank.
    pub fn local_energy(&self) -> &BTreeMap<EnergyType, f64> {
        &self.energies
    }

    /// Energies summed over all ranks. Collective.
    ///
    /// Every pair is evaluated on exactly one rank, so the sums count each
    /// contribution once.
    pub fn energy(&self) -> Result<BTreeMap<EnergyType, f64>> {
        let kinds = [
            EnergyType::BeamContactPenalty,
            EnergyType::LinkerElastic,
            EnergyType::DemElastic,
            EnergyType::DemAdhesion,
        ];
        let local: Vec<f64> = kinds
            .iter()
            .map(|k| self.energies.get(k).copied().unwrap_or(0.0))
            .collect();
        let total = self.comm.sum_all_f64(&local)?;
        Ok(kinds.into_iter().zip(total).collect())
    }

    /// Largest distance an entity must be extended by in the spatial index
    /// so that every interacting pair shares a bin neighborhood. Collective.
    pub fn half_interaction_distance(&self, table: &EntityTable) -> Result<f64> {
        let max_radius = |kind: EntityKind| {
            table
                .iter()
                .filter(|e| e.kind() == kind)
                .map(|e| e.shape.radius())
                .fold(0.0, f64::max)
        };

        let mut local = 0.0f64;
        if let Some(contact) = &self.params.contact {
            let mut radius = max_radius(EntityKind::Beam);
            if contact.beam_sphere {
                radius = radius.max(max_radius(EntityKind::Sphere));
            }
            local = local.max(contact.safety_factor * radius);
        }
        if let Some(xl) = &self.params.crosslinking {
            local = local.max(0.5 * xl.max_linking_length());
        }
        if let Some(dem) = &self.params.dem {
            local = local.max(max_radius(EntityKind::Particle) + 0.5 * dem.adhesion_distance);
        }

        let global = self.comm.max_all_f64(local)?;
        debug!(rank = %self.comm.rank(), local, global, "half interaction distance");
        Ok(global)
    }

    /// Current positions of row crosslinkers for the driver to write back.
    pub fn crosslinker_positions(&self, table: &EntityTable) -> Vec<(EntityId, DVec3)> {
        self.crosslinking
            .as_ref()
            .map_or_else(Vec::new, |xl| xl.crosslinker_positions(table))
    }

    /// Contact points and bonds of the last evaluation, every
    /// `output_interval` steps.
    pub fn visualization(&self, table: &EntityTable, step: u64) -> Option<VisualizationFrame> {
        let interval = self.params.output_interval;
        if interval == 0 || step % interval != 0 {
            return None;
        }
        let mut frame = VisualizationFrame::new(step, self.comm.rank());
        for pair in &self.pairs {
            match pair {
                InteractionPair::BeamContact(contact) => {
                    let Some(g) = contact.geometry().filter(|_| contact.state() == ContactState::Active) else {
                        continue;
                    };
                    frame.contact_points.push(ContactPoint {
                        pair: contact.ids(),
                        kind: contact.kind(),
                        position: (g.point_a + g.point_b) * 0.5,
                        force: contact.contact_force(),
                        gap: g.gap,
                    });
                }
                InteractionPair::BeamLink(link) => {
                    let Some(positions) = link.positions() else { continue };
                    frame.bonds.push(BondPoint {
                        crosslinker: link.crosslinker,
                        spots: link.spots,
                        positions,
                        force: link.tension(),
                    });
                }
            }
        }
        if let Some(xl) = &self.crosslinking {
            frame.crosslinkers = xl
                .linkers()
                .filter(|s| table.is_row(s.id))
                .map(|s| CrosslinkerPoint {
                    id: s.id,
                    position: s.position,
                    state: s.bond_state(),
                })
                .collect();
        }
        Some(frame)
    }

    /// Encode the state owned by this rank.
    pub fn write_restart(&self, table: &EntityTable) -> Result<Vec<u8>> {
        let mut chunk = RestartChunk {
            step: self.step,
            crosslinkers: Vec::new(),
            pairs: Vec::new(),
        };
        if let Some(xl) = &self.crosslinking {
            chunk.crosslinkers = xl
                .linkers()
                .filter(|s| table.is_row(s.id))
                .map(|s| CrosslinkerRecord::new(s, xl.link(s.id)))
                .collect();
        }
        if let Some(dem) = &self.dem {
            chunk.pairs = dem.history().restart_records().iter().map(PairRecord::from_history).collect();
        }
        debug!(
            rank = %self.comm.rank(),
            step = self.step,
            crosslinkers = chunk.crosslinkers.len(),
            pairs = chunk.pairs.len(),
            "restart written"
        );
        chunk.encode()
    }

    /// Restore from the chunks written by all ranks of an earlier run,
    /// whatever its rank count. Collective. Returns the restart step.
    pub fn read_restart<B>(&mut self, table: &EntityTable, chunks: &[B]) -> Result<u64>
    where
        B: AsRef<[u8]>,
    {
        self.check_rank(table)?;
        let chunks = chunks
            .iter()
            .map(|bytes| RestartChunk::decode(bytes.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let step = match chunks.first() {
            Some(first) => first.step,
            None => return Err(Error::CorruptRestart("no chunks".into())),
        };
        if let Some(other) = chunks.iter().find(|c| c.step != step) {
            return Err(Error::CorruptRestart(format!(
                "chunks of steps {step} and {} mixed",
                other.step
            )));
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut states = Vec::new();
        let mut records = Vec::new();
        for chunk in &chunks {
            for record in &chunk.crosslinkers {
                if !seen.insert(record.crosslinker) {
                    return Err(Error::CorruptRestart(format!(
                        "crosslinker {} written twice",
                        record.crosslinker
                    )));
                }
                states.push((record.to_state(table), record.reference_length, record.link_created));
            }
            for pair in &chunk.pairs {
                let record = pair.to_history().ok_or_else(|| {
                    Error::CorruptRestart(format!(
                        "history of ({}, {}) holds {} values",
                        pair.entity_a,
                        pair.entity_b,
                        pair.history.len()
                    ))
                })?;
                records.push(record);
            }
        }

        if let Some(xl) = &mut self.crosslinking {
            xl.restore(table, states);
        }
        if let Some(dem) = &mut self.dem {
            let kept = dem.history_mut().restore_records(records, |e| table.is_row(e))?;
            communicate_history_pairs(dem.history_mut(), &self.comm, |e| table.ghost_holders(e))?;
            debug!(rank = %self.comm.rank(), kept, "dem history restored");
        }

        info!(rank = %self.comm.rank(), step, chunks = chunks.len(), "restart read");
        self.step = step;
        self.catalog = PairCatalog::default();
        self.pairs.clear();
        self.phase = Phase::Idle;
        Ok(step)
    }
}

/// Kind of an entity a pair expected to find.
fn expected_kind(pair: &InteractionPair, entity: EntityId) -> EntityKind {
    match pair {
        InteractionPair::BeamContact(p) if p.kind() == PairKind::BeamSphere && p.ids()[1] == entity => {
            EntityKind::Sphere
        }
        _ => EntityKind::Beam,
    }
}
