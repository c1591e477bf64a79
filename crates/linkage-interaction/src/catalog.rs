//! Candidate pairs from binning neighborhoods.
//!
//! The catalog is rebuilt from scratch whenever the binning changes. Each
//! pair is produced once per rank: same-kind pairs by the row entity with
//! the smaller id, mixed pairs by the row entity of the source kind.

use std::collections::BTreeSet;

use linkage_binning::{EntityId, EntityKind, SpatialIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityTable;
use crate::error::{Error, Result};
use crate::params::InteractionParams;

/// Kind of a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairKind {
    BeamBeam,
    BeamSphere,
    ParticleParticle,
    CrosslinkerBeam,
}

impl PairKind {
    /// Pair kind of a (source, neighbor) kind combination.
    pub fn of(source: EntityKind, neighbor: EntityKind) -> Option<Self> {
        match (source, neighbor) {
            (EntityKind::Beam, EntityKind::Beam) => Some(Self::BeamBeam),
            (EntityKind::Beam, EntityKind::Sphere) => Some(Self::BeamSphere),
            (EntityKind::Particle, EntityKind::Particle) => Some(Self::ParticleParticle),
            (EntityKind::Beam, EntityKind::Crosslinker) => Some(Self::CrosslinkerBeam),
            _ => None,
        }
    }
}

impl std::fmt::Display for PairKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeamBeam => write!(f, "beam-beam"),
            Self::BeamSphere => write!(f, "beam-sphere"),
            Self::ParticleParticle => write!(f, "particle-particle"),
            Self::CrosslinkerBeam => write!(f, "crosslinker-beam"),
        }
    }
}

/// Two entities that may interact this step. `a` is the row entity that
/// found the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePair {
    pub a: EntityId,
    pub b: EntityId,
    pub kind: PairKind,
}

/// Which neighbor kinds a row entity of each kind pairs with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityTable {
    rules: BTreeSet<(EntityKind, EntityKind)>,
}

impl CompatibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules implied by the enabled submodels.
    pub fn from_params(params: &InteractionParams) -> Self {
        let mut table = Self::new();
        if let Some(contact) = &params.contact {
            table = table.allow(EntityKind::Beam, EntityKind::Beam);
            if contact.beam_sphere {
                table = table.allow(EntityKind::Beam, EntityKind::Sphere);
            }
        }
        if params.crosslinking.is_some() {
            table = table.allow(EntityKind::Beam, EntityKind::Crosslinker);
        }
        if params.dem.is_some() {
            table = table.allow(EntityKind::Particle, EntityKind::Particle);
        }
        table
    }

    /// Allow row entities of `source` to pair with `neighbor`.
    #[must_use]
    pub fn allow(mut self, source: EntityKind, neighbor: EntityKind) -> Self {
        if PairKind::of(source, neighbor).is_some() {
            self.rules.insert((source, neighbor));
        }
        self
    }

    pub fn allows(&self, source: EntityKind, neighbor: EntityKind) -> bool {
        self.rules.contains(&(source, neighbor))
    }

    /// Neighbor kinds of a source kind.
    pub fn neighbors_of(&self, source: EntityKind) -> Vec<EntityKind> {
        self.rules
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, n)| *n)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Candidate pairs of one rank.
#[derive(Debug, Clone, Default)]
pub struct PairCatalog {
    pairs: Vec<CandidatePair>,
}

impl PairCatalog {
    /// Rebuild from the row entities of `entities` and the spatial index.
    ///
    /// Fails if a row entity has no bin or if the index references an
    /// entity this rank does not know.
    pub fn rebuild<S>(compatibility: &CompatibilityTable, entities: &EntityTable, index: &S) -> Result<Self>
    where
        S: SpatialIndex + ?Sized,
    {
        let rank = entities.rank();
        let mut pairs = BTreeSet::new();

        for a in entities.row() {
            let kind_a = a.kind();
            let kinds = compatibility.neighbors_of(kind_a);
            if kinds.is_empty() {
                continue;
            }
            let own_bins = index.bins_of(a.id).filter(|bins| !bins.is_empty()).ok_or(Error::StaleIndex {
                entity: a.id,
                kind: kind_a,
                rank,
            })?;

            let mut neighborhood: BTreeSet<_> = BTreeSet::new();
            for bin in own_bins {
                neighborhood.extend(index.neighbor_and_own_bin_ids(*bin));
            }
            let neighborhood: Vec<_> = neighborhood.into_iter().collect();

            for content in index.bin_content(&neighborhood, &kinds) {
                if content.id == a.id {
                    continue;
                }
                if content.kind == kind_a && a.id >= content.id {
                    continue;
                }
                let Some(kind) = PairKind::of(kind_a, content.kind) else {
                    continue;
                };
                let b = entities.get(content.id).ok_or(Error::UnknownEntity {
                    entity: content.id,
                    kind: content.kind,
                    rank,
                })?;
                if a.shares_node_with(b) {
                    continue;
                }
                pairs.insert(CandidatePair { a: a.id, b: b.id, kind });
            }
        }

        let pairs: Vec<_> = pairs.into_iter().collect();
        debug!(%rank, pairs = pairs.len(), "pair catalog rebuilt");
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub fn of_kind(&self, kind: PairKind) -> impl Iterator<Item = &CandidatePair> {
        self.pairs.iter().filter(move |p| p.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BeamGeometry, Entity, FilamentType, NodeId, ParticleGeometry, Shape};
    use glam::DVec3;
    use linkage_binning::{BinGrid, BinningIndex};
    use linkage_comm::Rank;
    use proptest::prelude::*;

    fn grid() -> BinGrid {
        BinGrid::new(DVec3::ZERO, DVec3::splat(4.0), 1.0).unwrap()
    }

    fn particle(id: u64, owner: u32, p: DVec3) -> Entity {
        Entity {
            id: EntityId(id),
            owner: Rank(owner),
            shape: Shape::Particle(ParticleGeometry {
                position: p,
                velocity: DVec3::ZERO,
                angular_velocity: DVec3::ZERO,
                radius: 0.1,
                mass: 1.0,
            }),
            ghost_holders: Vec::new(),
        }
    }

    fn beam(id: u64, nodes: [u64; 2], a: DVec3, b: DVec3) -> Entity {
        Entity {
            id: EntityId(id),
            owner: Rank(0),
            shape: Shape::Beam(BeamGeometry {
                nodes: [NodeId(nodes[0]), NodeId(nodes[1])],
                positions: [a, b],
                radius: 0.05,
                filament: FilamentType::Arbitrary,
                binding_spots: Vec::new(),
            }),
            ghost_holders: Vec::new(),
        }
    }

    fn index_of(table: &EntityTable) -> BinningIndex {
        let mut index = BinningIndex::new(grid());
        for e in table.iter() {
            match &e.shape {
                Shape::Beam(b) => index
                    .insert_segment(e.id, EntityKind::Beam, b.positions[0], b.positions[1])
                    .unwrap(),
                Shape::Particle(p) => {
                    index.insert_point(e.id, EntityKind::Particle, p.position).unwrap();
                }
                _ => unreachable!(),
            }
        }
        index
    }

    fn dem_only() -> CompatibilityTable {
        CompatibilityTable::new().allow(EntityKind::Particle, EntityKind::Particle)
    }

    #[test]
    fn same_kind_pair_is_found_once() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(particle(1, 0, DVec3::splat(0.5)));
        table.insert(particle(2, 0, DVec3::splat(1.5)));
        let catalog = PairCatalog::rebuild(&dem_only(), &table, &index_of(&table)).unwrap();
        assert_eq!(
            catalog.pairs(),
            &[CandidatePair {
                a: EntityId(1),
                b: EntityId(2),
                kind: PairKind::ParticleParticle
            }]
        );
    }

    #[test]
    fn far_entities_do_not_pair() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(particle(1, 0, DVec3::splat(0.5)));
        table.insert(particle(2, 0, DVec3::splat(3.5)));
        let catalog = PairCatalog::rebuild(&dem_only(), &table, &index_of(&table)).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn ghost_with_smaller_id_is_left_to_its_owner() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(particle(1, 1, DVec3::splat(0.5)));
        table.insert(particle(2, 0, DVec3::splat(0.6)));
        let catalog = PairCatalog::rebuild(&dem_only(), &table, &index_of(&table)).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn shared_node_excludes_pair() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(beam(1, [1, 2], DVec3::splat(0.5), DVec3::new(1.5, 0.5, 0.5)));
        table.insert(beam(2, [2, 3], DVec3::new(1.5, 0.5, 0.5), DVec3::new(2.5, 0.5, 0.5)));
        table.insert(beam(3, [4, 5], DVec3::new(0.5, 1.5, 0.5), DVec3::new(1.5, 1.5, 0.5)));
        let compat = CompatibilityTable::new().allow(EntityKind::Beam, EntityKind::Beam);
        let catalog = PairCatalog::rebuild(&compat, &table, &index_of(&table)).unwrap();
        let found: Vec<_> = catalog.pairs().iter().map(|p| (p.a.0, p.b.0)).collect();
        assert_eq!(found, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn unbinned_row_entity_is_fatal() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(particle(1, 0, DVec3::splat(0.5)));
        let index = BinningIndex::new(grid());
        let err = PairCatalog::rebuild(&dem_only(), &table, &index).unwrap_err();
        assert!(matches!(err, Error::StaleIndex { entity: EntityId(1), .. }));
    }

    #[test]
    fn disallowed_kinds_are_skipped() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(particle(1, 0, DVec3::splat(0.5)));
        table.insert(particle(2, 0, DVec3::splat(0.6)));
        let catalog = PairCatalog::rebuild(&CompatibilityTable::new(), &table, &index_of(&table)).unwrap();
        assert!(catalog.is_empty());
    }

    proptest! {
        #[test]
        fn every_close_pair_appears_exactly_once(
            points in prop::collection::vec((0.0f64..4.0, 0.0f64..4.0, 0.0f64..4.0), 1..40)
        ) {
            let mut table = EntityTable::new(Rank(0));
            for (i, (x, y, z)) in points.iter().enumerate() {
                table.insert(particle(i as u64, 0, DVec3::new(*x, *y, *z)));
            }
            let catalog = PairCatalog::rebuild(&dem_only(), &table, &index_of(&table)).unwrap();

            let unique: BTreeSet<_> = catalog.pairs().iter().map(|p| (p.a, p.b)).collect();
            prop_assert_eq!(unique.len(), catalog.len());
            for p in catalog.pairs() {
                prop_assert!(p.a < p.b);
            }
            // anything closer than one bin size shares a neighborhood
            for (i, pi) in points.iter().enumerate() {
                for (j, pj) in points.iter().enumerate().skip(i + 1) {
                    let d = DVec3::new(pi.0, pi.1, pi.2).distance(DVec3::new(pj.0, pj.1, pj.2));
                    if d < 1.0 {
                        prop_assert!(unique.contains(&(EntityId(i as u64), EntityId(j as u64))));
                    }
                }
            }
        }
    }
}
