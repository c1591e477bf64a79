//! Spatial index interface and its uniform-grid implementation.

use std::collections::{BTreeMap, HashMap};

use glam::DVec3;

use crate::error::{BinningError, Result};
use crate::{BinGrid, BinId};

/// Global entity identifier, stable across ranks and restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an indexed entity is. Used to filter content queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityKind {
    /// Two-noded beam element.
    Beam,
    /// Rigid sphere.
    Sphere,
    /// Point-like crosslinker molecule.
    Crosslinker,
    /// DEM particle.
    Particle,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Beam => write!(f, "beam"),
            EntityKind::Sphere => write!(f, "sphere"),
            EntityKind::Crosslinker => write!(f, "crosslinker"),
            EntityKind::Particle => write!(f, "particle"),
        }
    }
}

/// One entry of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinContent {
    pub id: EntityId,
    pub kind: EntityKind,
}

/// Read-only spatial queries needed for pair discovery.
pub trait SpatialIndex {
    /// The bin and its existing neighbors.
    fn neighbor_and_own_bin_ids(&self, bin: BinId) -> Vec<BinId>;

    /// Entities of the given kinds found in any of `bins`.
    ///
    /// Entities spanning several bins are reported once. The result is
    /// sorted by entity id.
    fn bin_content(&self, bins: &[BinId], kinds: &[EntityKind]) -> Vec<BinContent>;

    /// Bins an entity currently occupies, `None` if it is not indexed.
    fn bins_of(&self, entity: EntityId) -> Option<&[BinId]>;
}

/// Uniform-grid spatial index.
///
/// Point entities occupy one bin; beams occupy every bin their centerline
/// passes through.
#[derive(Debug, Clone)]
pub struct BinningIndex {
    grid: BinGrid,
    contents: HashMap<BinId, Vec<BinContent>>,
    memberships: HashMap<EntityId, Vec<BinId>>,
}

impl BinningIndex {
    /// Create an empty index over a grid.
    pub fn new(grid: BinGrid) -> Self {
        Self {
            grid,
            contents: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    /// Index a point-like entity. Replaces any previous membership.
    pub fn insert_point(&mut self, id: EntityId, kind: EntityKind, position: DVec3) -> Result<BinId> {
        let bin = self
            .grid
            .bin_of(position)
            .ok_or(BinningError::OutsideDomain { entity: id, position })?;
        self.place(id, kind, vec![bin]);
        Ok(bin)
    }

    /// Index a segment-shaped entity. Replaces any previous membership.
    pub fn insert_segment(&mut self, id: EntityId, kind: EntityKind, a: DVec3, b: DVec3) -> Result<()> {
        for position in [a, b] {
            if !self.grid.contains_position(position) {
                return Err(BinningError::OutsideDomain { entity: id, position });
            }
        }
        let bins = self.grid.bins_along_segment(a, b);
        self.place(id, kind, bins);
        Ok(())
    }

    fn place(&mut self, id: EntityId, kind: EntityKind, bins: Vec<BinId>) {
        self.remove(id);
        for bin in &bins {
            self.contents.entry(*bin).or_default().push(BinContent { id, kind });
        }
        self.memberships.insert(id, bins);
    }

    /// Drop an entity from the index.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(bins) = self.memberships.remove(&id) else {
            return false;
        };
        for bin in bins {
            if let Some(content) = self.contents.get_mut(&bin) {
                content.retain(|c| c.id != id);
                if content.is_empty() {
                    self.contents.remove(&bin);
                }
            }
        }
        true
    }

    /// Remove all entities, keeping the grid.
    pub fn clear(&mut self) {
        self.contents.clear();
        self.memberships.clear();
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.memberships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }

    /// Bins that hold at least one entity.
    pub fn occupied_bins(&self) -> impl Iterator<Item = BinId> + '_ {
        self.contents.keys().copied()
    }
}

impl SpatialIndex for BinningIndex {
    fn neighbor_and_own_bin_ids(&self, bin: BinId) -> Vec<BinId> {
        self.grid.neighbor_and_own(bin)
    }

    fn bin_content(&self, bins: &[BinId], kinds: &[EntityKind]) -> Vec<BinContent> {
        let mut found = BTreeMap::new();
        for bin in bins {
            let Some(content) = self.contents.get(bin) else {
                continue;
            };
            for entry in content.iter().filter(|c| kinds.contains(&c.kind)) {
                found.insert(entry.id, *entry);
            }
        }
        found.into_values().collect()
    }

    fn bins_of(&self, entity: EntityId) -> Option<&[BinId]> {
        self.memberships.get(&entity).map(Vec::as_slice)
    }
}
