//! Crosslinker bonds: binding, unbinding, diffusion and state migration.
//!
//! A bond has two writers. The crosslinker owner writes the linker's bond
//! slots, the beam owner writes the spot occupancy. Binding goes through a
//! consensus round so both sides commit the same decision; unbinding is
//! decided by the crosslinker owner and announced to the beam owner.
//! After every change owners push their state to all ghost holders.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use linkage_binning::{EntityId, EntityKind};
use linkage_comm::{exchange, Communicator, Outbox, Rank, Tag};
use linkage_consensus::rates::{bell_unbinding_probability, binding_probability, unbinding_probability};
use linkage_consensus::{
    check_single_occupancy, resolve, seed_for, select_candidate, uniform_draw, BindingSpot, DrawStream,
    OccupancyViolation, Proposal, Verdict,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{PairCatalog, PairKind};
use crate::entity::{BeamGeometry, EntityTable, FilamentType, LinkerType};
use crate::error::{Error, Result};
use crate::geometry::line_angle;
use crate::pair::BeamLink;
use crate::params::{CrosslinkingParams, LinkerParams};

/// One end of a crosslinker attached to a binding spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub spot: BindingSpot,
    pub step_bound: u64,
    /// Centerline parameter of the spot.
    pub xi: f64,
    pub position: DVec3,
    /// Unnormalized tangent of the element at the spot.
    pub tangent: DVec3,
}

/// Number of committed bonds of a linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondState {
    Unbonded,
    SingleBonded,
    DoubleBonded,
}

impl std::fmt::Display for BondState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbonded => write!(f, "unbonded"),
            Self::SingleBonded => write!(f, "single-bonded"),
            Self::DoubleBonded => write!(f, "double-bonded"),
        }
    }
}

/// Persistent state of a crosslinker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosslinkerState {
    pub id: EntityId,
    pub linker: LinkerType,
    pub position: DVec3,
    pub bonds: [Option<Bond>; 2],
}

impl CrosslinkerState {
    pub fn new(id: EntityId, linker: LinkerType, position: DVec3) -> Self {
        Self {
            id,
            linker,
            position,
            bonds: [None, None],
        }
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.iter().flatten().count()
    }

    pub fn bond_state(&self) -> BondState {
        match self.bond_count() {
            0 => BondState::Unbonded,
            1 => BondState::SingleBonded,
            _ => BondState::DoubleBonded,
        }
    }

    pub fn bonds(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.iter().flatten()
    }

    pub fn bound_spots(&self) -> Vec<BindingSpot> {
        self.bonds().map(|b| b.spot).collect()
    }

    /// Whether one end already sits on `element`.
    pub fn is_bound_to(&self, element: EntityId) -> bool {
        self.bonds().any(|b| b.spot.element == element)
    }

    fn free_slot(&self) -> Option<usize> {
        self.bonds.iter().position(Option::is_none)
    }

    fn place_at_bonds(&mut self) {
        let positions: Vec<DVec3> = self.bonds().map(|b| b.position).collect();
        match positions.as_slice() {
            [single] => self.position = *single,
            [a, b] => self.position = (*a + *b) * 0.5,
            _ => {}
        }
    }
}

/// Persistent binding state of a beam element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamBindingState {
    pub id: EntityId,
    pub filament: FilamentType,
    /// Occupant of each binding spot.
    pub occupants: Vec<Option<EntityId>>,
}

impl BeamBindingState {
    pub fn new(id: EntityId, filament: FilamentType, spots: usize) -> Self {
        Self {
            id,
            filament,
            occupants: vec![None; spots],
        }
    }

    pub fn occupant(&self, index: u16) -> Option<EntityId> {
        self.occupants.get(index as usize).copied().flatten()
    }

    pub fn free_spots(&self) -> impl Iterator<Item = u16> + '_ {
        self.occupants
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_none())
            .map(|(i, _)| i as u16)
    }
}

/// Outcome counts of one bind/unbind pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSummary {
    pub proposed: usize,
    pub granted: usize,
    pub stale: usize,
    pub unbound: usize,
}

/// What the proposer tells the linker owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BindPayload {
    /// Bond count of the linker copy the proposal was built against.
    bonds_seen: u8,
    bond: Bond,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnbindEvent {
    crosslinker: EntityId,
    spot: BindingSpot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Migrant {
    Linker {
        state: CrosslinkerState,
        link: Option<BeamLink>,
    },
    Beam(BeamBindingState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum GhostState {
    Linker(CrosslinkerState),
    Beam(BeamBindingState),
}

/// Crosslinker and beam binding state of one rank, row and ghost copies.
#[derive(Debug, Clone)]
pub struct Crosslinking {
    params: CrosslinkingParams,
    dt: f64,
    seed: u64,
    domain: Option<(DVec3, DVec3)>,
    linkers: BTreeMap<EntityId, CrosslinkerState>,
    beams: BTreeMap<EntityId, BeamBindingState>,
    /// Springs of double-bonded linkers owned here.
    links: BTreeMap<EntityId, BeamLink>,
    /// Row ids at the last synchronization.
    owned: BTreeSet<EntityId>,
    dirty: BTreeSet<EntityId>,
}

impl Crosslinking {
    pub fn new(params: CrosslinkingParams, dt: f64, seed: u64) -> Self {
        Self {
            params,
            dt,
            seed,
            domain: None,
            linkers: BTreeMap::new(),
            beams: BTreeMap::new(),
            links: BTreeMap::new(),
            owned: BTreeSet::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Keep diffusing linkers inside `[lower, upper]`.
    #[must_use]
    pub fn with_domain(mut self, lower: DVec3, upper: DVec3) -> Self {
        self.domain = Some((lower, upper));
        self
    }

    pub fn set_domain(&mut self, lower: DVec3, upper: DVec3) {
        self.domain = Some((lower, upper));
    }

    pub fn params(&self) -> &CrosslinkingParams {
        &self.params
    }

    pub fn linker(&self, id: EntityId) -> Option<&CrosslinkerState> {
        self.linkers.get(&id)
    }

    pub fn beam(&self, id: EntityId) -> Option<&BeamBindingState> {
        self.beams.get(&id)
    }

    pub fn linkers(&self) -> impl Iterator<Item = &CrosslinkerState> {
        self.linkers.values()
    }

    pub fn beams(&self) -> impl Iterator<Item = &BeamBindingState> {
        self.beams.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &BeamLink> {
        self.links.values()
    }

    pub fn link(&self, crosslinker: EntityId) -> Option<&BeamLink> {
        self.links.get(&crosslinker)
    }

    fn linker_params(&self, linker: LinkerType) -> Option<&LinkerParams> {
        self.params.linker(linker)
    }

    /// Whether a link matches two committed bonds of its linker.
    pub fn is_committed(&self, link: &BeamLink) -> bool {
        self.linkers.get(&link.crosslinker).is_some_and(|state| {
            let mut spots = state.bound_spots();
            spots.sort();
            let mut expected = link.spots.to_vec();
            expected.sort();
            state.bond_state() == BondState::DoubleBonded && spots == expected
        })
    }

    /// Create unbonded state for every crosslinker and beam the rank sees.
    pub fn setup(&mut self, table: &EntityTable) {
        self.sync_visible(table);
        self.owned = self.row_ids(table);
        debug!(
            rank = %table.rank(),
            linkers = self.linkers.len(),
            beams = self.beams.len(),
            "crosslinking set up"
        );
    }

    fn row_ids(&self, table: &EntityTable) -> BTreeSet<EntityId> {
        self.linkers
            .keys()
            .chain(self.beams.keys())
            .copied()
            .filter(|id| table.is_row(*id))
            .collect()
    }

    /// Drop state of entities no longer visible, add fresh state for new ones.
    fn sync_visible(&mut self, table: &EntityTable) {
        self.linkers.retain(|id, _| table.crosslinker(*id).is_some());
        self.beams.retain(|id, _| table.beam(*id).is_some());
        self.links.retain(|id, _| table.is_row(*id));
        for entity in table.iter() {
            if let Some(c) = table.crosslinker(entity.id) {
                self.linkers
                    .entry(entity.id)
                    .or_insert_with(|| CrosslinkerState::new(entity.id, c.linker, c.position));
            } else if let Some(b) = table.beam(entity.id) {
                self.beams
                    .entry(entity.id)
                    .or_insert_with(|| BeamBindingState::new(entity.id, b.filament, b.binding_spots.len()));
            }
        }
    }

    /// Hand row state to new owners after repartitioning, then refresh all
    /// ghost copies.
    pub fn redistribute<C>(&mut self, comm: &C, table: &EntityTable) -> Result<()>
    where
        C: Communicator + ?Sized,
    {
        let me = comm.rank();
        let mut outbox: Outbox<Migrant> = Outbox::new();
        let mut departed = Vec::new();
        for id in std::mem::take(&mut self.owned) {
            match table.owner_of(id) {
                Some(owner) if owner == me => continue,
                Some(owner) => {
                    let migrant = if let Some(state) = self.linkers.get(&id) {
                        Migrant::Linker {
                            state: state.clone(),
                            link: self.links.remove(&id),
                        }
                    } else if let Some(state) = self.beams.get(&id) {
                        Migrant::Beam(state.clone())
                    } else {
                        continue;
                    };
                    outbox.entry(owner).or_default().push(migrant);
                    departed.push(id);
                }
                None => {
                    warn!(%me, entity = %id, "dropping crosslinking state of entity without owner");
                    self.links.remove(&id);
                }
            }
        }
        let sent = departed.len();

        let mut received = 0usize;
        for (_, bundle) in exchange(comm, Tag::StateMigration, outbox)? {
            for migrant in bundle {
                received += 1;
                match migrant {
                    Migrant::Linker { state, link } => {
                        if let Some(link) = link {
                            self.links.insert(state.id, link);
                        }
                        self.linkers.insert(state.id, state);
                    }
                    Migrant::Beam(state) => {
                        self.beams.insert(state.id, state);
                    }
                }
            }
        }

        self.sync_visible(table);
        self.owned = self.row_ids(table);
        debug!(%me, sent, received, "crosslinking state redistributed");
        self.refresh_ghosts(comm, table, true)
    }

    /// Push row state to ghost holders; all of it or only what changed.
    pub fn refresh_ghosts<C>(&mut self, comm: &C, table: &EntityTable, full: bool) -> Result<()>
    where
        C: Communicator + ?Sized,
    {
        let me = comm.rank();
        let ids: Vec<EntityId> = if full {
            self.row_ids(table).into_iter().collect()
        } else {
            self.dirty.iter().copied().filter(|id| table.is_row(*id)).collect()
        };
        self.dirty.clear();

        let mut outbox: Outbox<GhostState> = Outbox::new();
        for id in ids {
            let state = match (self.linkers.get(&id), self.beams.get(&id)) {
                (Some(l), _) => GhostState::Linker(l.clone()),
                (None, Some(b)) => GhostState::Beam(b.clone()),
                (None, None) => continue,
            };
            for holder in table.ghost_holders(id) {
                if holder != me {
                    outbox.entry(holder).or_default().push(state.clone());
                }
            }
        }

        for (from, bundle) in exchange(comm, Tag::GhostRefresh, outbox)? {
            for state in bundle {
                let id = match &state {
                    GhostState::Linker(l) => l.id,
                    GhostState::Beam(b) => b.id,
                };
                if table.is_row(id) {
                    warn!(%me, %from, entity = %id, "ignoring ghost refresh of a row entity");
                    continue;
                }
                match state {
                    GhostState::Linker(l) => {
                        self.linkers.insert(id, l);
                    }
                    GhostState::Beam(b) => {
                        self.beams.insert(id, b);
                    }
                }
            }
        }
        Ok(())
    }

    /// Move bond ends with their elements and place bonded linkers there.
    pub fn update_bond_geometry(&mut self, table: &EntityTable) {
        for state in self.linkers.values_mut() {
            for bond in state.bonds.iter_mut().flatten() {
                if let Some(beam) = table.beam(bond.spot.element) {
                    bond.position = beam.point_at(bond.xi);
                    bond.tangent = beam.tangent();
                }
            }
            state.place_at_bonds();
        }
    }

    fn can_bind(&self, state: &CrosslinkerState, beam: &BeamGeometry, spot: BindingSpot, step: u64) -> Option<Bond> {
        if state.bond_count() >= 2 || state.is_bound_to(spot.element) {
            return None;
        }
        let params = self.linker_params(state.linker)?;
        if !state.linker.binds_to(beam.filament) {
            return None;
        }
        let xi = beam.spot_xi(spot.index)?;
        let position = beam.point_at(xi);
        let tangent = beam.tangent();

        let in_reach = match state.bonds().next() {
            None => state.position.distance(position) <= params.capture_radius(),
            Some(first) => {
                let distance = first.position.distance(position);
                let angle = line_angle(first.tangent, tangent);
                (params.linking_length_min..=params.linking_length_max).contains(&distance)
                    && angle.is_some_and(|a| (params.angle_min..=params.angle_max).contains(&a))
            }
        };
        if !in_reach {
            return None;
        }

        let draw = uniform_draw(
            DrawStream::Bind,
            self.seed,
            &[state.id.0, spot.element.0, u64::from(spot.index)],
            step,
        );
        (draw < binding_probability(params.k_on, self.dt)).then_some(Bond {
            spot,
            step_bound: step,
            xi,
            position,
            tangent,
        })
    }

    /// Run one binding round over the crosslinker-beam pairs of `catalog`.
    ///
    /// Every rank must call this in the same step.
    pub fn bind<C>(&mut self, comm: &C, table: &EntityTable, catalog: &PairCatalog, step: u64) -> Result<BindingSummary>
    where
        C: Communicator + ?Sized,
    {
        let me = comm.rank();
        let mut nearby: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
        for pair in catalog.of_kind(PairKind::CrosslinkerBeam) {
            nearby.entry(pair.a).or_default().push(pair.b);
        }

        let mut proposals = Vec::new();
        for (beam_id, linkers) in &nearby {
            let (Some(beam), Some(binding)) = (table.beam(*beam_id), self.beams.get(beam_id)) else {
                continue;
            };
            if !table.is_row(*beam_id) {
                continue;
            }
            for index in binding.free_spots() {
                let spot = BindingSpot::new(*beam_id, index);
                let mut eligible = BTreeMap::new();
                for linker in linkers {
                    if let Some(state) = self.linkers.get(linker) {
                        if let Some(bond) = self.can_bind(state, beam, spot, step) {
                            eligible.insert(*linker, (state.bond_count() as u8, bond));
                        }
                    }
                }
                let candidates: Vec<EntityId> = eligible.keys().copied().collect();
                let Some(chosen) = select_candidate(spot, step, &candidates) else {
                    continue;
                };
                let Some(target_owner) = table.owner_of(chosen) else {
                    continue;
                };
                let Some((bonds_seen, bond)) = eligible.remove(&chosen) else {
                    continue;
                };
                proposals.push(Proposal {
                    target: chosen,
                    target_owner,
                    contender: spot,
                    proposer: me,
                    payload: BindPayload { bonds_seen, bond },
                });
            }
        }
        let proposed = proposals.len();

        let resolution = {
            let linkers = &self.linkers;
            let arbiter = |p: &Proposal<BindPayload>| {
                linkers.get(&p.target).is_some_and(|state| {
                    state.bond_count() == usize::from(p.payload.bonds_seen)
                        && state.bond_count() < 2
                        && !state.is_bound_to(p.contender.element)
                })
            };
            resolve(comm, step, proposals, &arbiter)?
        };

        for proposal in resolution.granted_targets {
            self.commit_linker_side(proposal.target, proposal.payload.bond, me)?;
        }
        let mut granted = 0usize;
        for decision in resolution.own_decisions {
            if decision.verdict != Verdict::Granted {
                continue;
            }
            granted += 1;
            let spot = decision.proposal.contender;
            self.commit_spot_side(spot, decision.proposal.target, me, step)?;
        }

        self.update_bond_geometry(table);
        self.refresh_ghosts(comm, table, false)?;
        Ok(BindingSummary {
            proposed,
            granted,
            stale: resolution.stale,
            unbound: 0,
        })
    }

    fn commit_linker_side(&mut self, crosslinker: EntityId, bond: Bond, rank: Rank) -> Result<()> {
        let step = bond.step_bound;
        let state = self.linkers.get_mut(&crosslinker).ok_or(Error::UnknownEntity {
            entity: crosslinker,
            kind: EntityKind::Crosslinker,
            rank,
        })?;
        let Some(slot) = state.free_slot() else {
            return Err(OccupancyViolation::NoFreeEnd {
                spot: bond.spot,
                crosslinker,
                rank,
                step,
            }
            .into());
        };
        state.bonds[slot] = Some(bond);
        state.place_at_bonds();
        self.dirty.insert(crosslinker);

        if let [Some(a), Some(b)] = &state.bonds {
            let (spots, xi) = ([a.spot, b.spot], [a.xi, b.xi]);
            let reference_length = a.position.distance(b.position);
            let linker = state.linker;
            let stiffness = self.params.linker(linker).map_or(0.0, |p| p.stiffness);
            self.links.insert(
                crosslinker,
                BeamLink::new(crosslinker, linker, spots, xi, reference_length, stiffness, step),
            );
        }
        Ok(())
    }

    fn commit_spot_side(&mut self, spot: BindingSpot, crosslinker: EntityId, rank: Rank, step: u64) -> Result<()> {
        let Some(slot) = self
            .beams
            .get_mut(&spot.element)
            .and_then(|b| b.occupants.get_mut(spot.index as usize))
        else {
            return Err(Error::UnknownEntity {
                entity: spot.element,
                kind: EntityKind::Beam,
                rank,
            });
        };
        if let Some(existing) = *slot {
            return Err(OccupancyViolation::AlreadyOccupied {
                spot,
                existing,
                incoming: crosslinker,
                rank,
                step,
            }
            .into());
        }
        *slot = Some(crosslinker);
        self.dirty.insert(spot.element);
        Ok(())
    }

    /// Release bonds of row linkers and tell the spot owners.
    ///
    /// Bonds formed in `step` are kept.
    pub fn unbind<C>(&mut self, comm: &C, table: &EntityTable, step: u64) -> Result<usize>
    where
        C: Communicator + ?Sized,
    {
        let me = comm.rank();
        self.update_bond_geometry(table);

        let mut events: Outbox<UnbindEvent> = Outbox::new();
        let row: Vec<EntityId> = self.linkers.keys().copied().filter(|id| table.is_row(*id)).collect();
        for id in row {
            let Some(state) = self.linkers.get(&id) else { continue };
            let Some(params) = self.linker_params(state.linker) else { continue };

            let force = match &state.bonds {
                [Some(a), Some(b)] => self.links.get(&id).map_or(0.0, |link| {
                    (link.stiffness * (a.position.distance(b.position) - link.reference_length)).abs()
                }),
                _ => 0.0,
            };
            let double = state.bond_state() == BondState::DoubleBonded;

            let mut fired = Vec::new();
            for (slot, bond) in state.bonds.iter().enumerate() {
                let Some(bond) = bond else { continue };
                if bond.step_bound >= step {
                    continue;
                }
                let p = if double {
                    bell_unbinding_probability(params.k_off0, force, params.x_beta, self.params.kt, self.dt)
                } else {
                    unbinding_probability(params.k_off0, self.dt)
                };
                let draw = uniform_draw(
                    DrawStream::Unbind,
                    self.seed,
                    &[id.0, bond.spot.element.0, u64::from(bond.spot.index)],
                    step,
                );
                if draw < p {
                    fired.push(slot);
                }
            }
            if fired.len() == 2 {
                let pick = uniform_draw(DrawStream::UnbindChoice, self.seed, &[id.0], step);
                fired = vec![usize::from(pick >= 0.5)];
            }

            for slot in fired {
                let Some(state) = self.linkers.get_mut(&id) else { continue };
                let Some(bond) = state.bonds[slot].take() else { continue };
                state.place_at_bonds();
                self.links.remove(&id);
                self.dirty.insert(id);
                let owner = table.owner_of(bond.spot.element).ok_or(Error::UnknownEntity {
                    entity: bond.spot.element,
                    kind: EntityKind::Beam,
                    rank: me,
                })?;
                events.entry(owner).or_default().push(UnbindEvent {
                    crosslinker: id,
                    spot: bond.spot,
                });
            }
        }

        let mut unbound = 0usize;
        for (_, bundle) in exchange(comm, Tag::UnbindEvent, events)? {
            for event in bundle {
                let holder = self.beams.get(&event.spot.element).and_then(|b| b.occupant(event.spot.index));
                if holder != Some(event.crosslinker) {
                    return Err(OccupancyViolation::UnbindMismatch {
                        spot: event.spot,
                        crosslinker: event.crosslinker,
                        holder,
                        rank: me,
                        step,
                    }
                    .into());
                }
                if let Some(slot) = self
                    .beams
                    .get_mut(&event.spot.element)
                    .and_then(|b| b.occupants.get_mut(event.spot.index as usize))
                {
                    *slot = None;
                }
                self.dirty.insert(event.spot.element);
                unbound += 1;
            }
        }

        self.refresh_ghosts(comm, table, false)?;
        Ok(unbound)
    }

    /// Brownian step of every free row linker.
    pub fn diffuse(&mut self, table: &EntityTable, step: u64) {
        let d = self.params.diffusion;
        if d <= 0.0 {
            return;
        }
        let scale = (2.0 * d * self.dt).sqrt();
        for (id, state) in self.linkers.iter_mut() {
            if state.bond_count() > 0 || !table.is_row(*id) {
                continue;
            }
            let mut rng = StdRng::seed_from_u64(seed_for(DrawStream::Diffusion, self.seed, &[id.0], step));
            let x: f64 = StandardNormal.sample(&mut rng);
            let y: f64 = StandardNormal.sample(&mut rng);
            let z: f64 = StandardNormal.sample(&mut rng);
            let mut position = state.position + DVec3::new(x, y, z) * scale;
            if let Some((lower, upper)) = self.domain {
                position = position.clamp(lower, upper);
            }
            state.position = position;
            self.dirty.insert(*id);
        }
    }

    /// Current positions of row linkers, for the driver to write back.
    pub fn crosslinker_positions(&self, table: &EntityTable) -> Vec<(EntityId, DVec3)> {
        self.linkers
            .values()
            .filter(|s| table.is_row(s.id))
            .map(|s| (s.id, s.position))
            .collect()
    }

    /// Check the at-most-one-bond invariant over every linker copy here,
    /// and that row beams agree with the linkers they know about.
    pub fn check_occupancy(&self, table: &EntityTable) -> Result<()> {
        check_single_occupancy(
            self.linkers
                .values()
                .flat_map(|s| s.bonds().map(move |b| (b.spot, s.id))),
        )?;
        for state in self.linkers.values() {
            for bond in state.bonds() {
                if !table.is_row(bond.spot.element) {
                    continue;
                }
                let holder = self.beams.get(&bond.spot.element).and_then(|b| b.occupant(bond.spot.index));
                if holder != Some(state.id) {
                    return Err(OccupancyViolation::UnbindMismatch {
                        spot: bond.spot,
                        crosslinker: state.id,
                        holder,
                        rank: table.rank(),
                        step: bond.step_bound,
                    }
                    .into());
                }
            }
        }
        for beam in self.beams.values().filter(|b| table.is_row(b.id)) {
            for (index, occupant) in beam.occupants.iter().enumerate() {
                let Some(occupant) = *occupant else { continue };
                // linkers out of sight are checked by their own owner
                let Some(state) = self.linkers.get(&occupant) else { continue };
                let spot = BindingSpot::new(beam.id, index as u16);
                if !state.bonds().any(|b| b.spot == spot) {
                    return Err(OccupancyViolation::OrphanOccupant {
                        spot,
                        occupant,
                        rank: table.rank(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Every (spot, linker) bond of row linkers.
    pub fn row_bonds(&self, table: &EntityTable) -> Vec<(BindingSpot, EntityId)> {
        self.linkers
            .values()
            .filter(|s| table.is_row(s.id))
            .flat_map(|s| s.bonds().map(move |b| (b.spot, s.id)))
            .collect()
    }

    /// Replace every bond with the given linker states.
    ///
    /// `states` lists all linkers of the system; entries for entities the
    /// rank does not see are ignored. Spot occupancy and links are rebuilt
    /// from the bonds.
    pub(crate) fn restore(&mut self, table: &EntityTable, states: Vec<(CrosslinkerState, f64, u64)>) {
        self.sync_visible(table);
        for beam in self.beams.values_mut() {
            beam.occupants.iter_mut().for_each(|o| *o = None);
        }
        for state in self.linkers.values_mut() {
            state.bonds = [None, None];
        }
        self.links.clear();

        for (state, reference_length, created_step) in states {
            for bond in state.bonds() {
                if let Some(slot) = self
                    .beams
                    .get_mut(&bond.spot.element)
                    .and_then(|b| b.occupants.get_mut(bond.spot.index as usize))
                {
                    *slot = Some(state.id);
                }
            }
            if !self.linkers.contains_key(&state.id) {
                continue;
            }
            if let [Some(a), Some(b)] = &state.bonds {
                if table.is_row(state.id) {
                    let stiffness = self.params.linker(state.linker).map_or(0.0, |p| p.stiffness);
                    self.links.insert(
                        state.id,
                        BeamLink::new(
                            state.id,
                            state.linker,
                            [a.spot, b.spot],
                            [a.xi, b.xi],
                            reference_length,
                            stiffness,
                            created_step,
                        ),
                    );
                }
            }
            self.linkers.insert(state.id, state);
        }
        self.owned = self.row_ids(table);
        self.dirty.clear();
    }
}
