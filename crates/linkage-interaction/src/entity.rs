//! Entities visible to a rank and the arena that stores them.
//!
//! The simulation driver owns the geometry: it tells each rank which
//! entities it owns (row entities), which it sees as read-only copies
//! (ghosts), and who holds ghosts of its row entities. The interaction
//! layer reads this table but never changes ownership.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use linkage_binning::{EntityId, EntityKind};
use linkage_comm::Rank;
use serde::{Deserialize, Serialize};

/// Global finite-element node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Filament family of a beam, restricts which linkers may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilamentType {
    Arbitrary,
    Actin,
    Collagen,
}

/// Linker family of a crosslinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkerType {
    Arbitrary,
    Actin,
    Collagen,
    Integrin,
}

impl LinkerType {
    /// Linker/filament compatibility.
    ///
    /// Arbitrary linkers and arbitrary filaments match anything; typed
    /// linkers bind their own filament family, integrins bind collagen.
    pub fn binds_to(self, filament: FilamentType) -> bool {
        match (self, filament) {
            (LinkerType::Arbitrary, _) | (_, FilamentType::Arbitrary) => true,
            (LinkerType::Actin, FilamentType::Actin) => true,
            (LinkerType::Collagen | LinkerType::Integrin, FilamentType::Collagen) => true,
            _ => false,
        }
    }
}

/// Two-noded straight beam element.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamGeometry {
    pub nodes: [NodeId; 2],
    pub positions: [DVec3; 2],
    pub radius: f64,
    pub filament: FilamentType,
    /// Centerline parameters in `[0, 1]` of the binding spots.
    pub binding_spots: Vec<f64>,
}

impl BeamGeometry {
    /// Point on the centerline at parameter `xi`.
    pub fn point_at(&self, xi: f64) -> DVec3 {
        self.positions[0].lerp(self.positions[1], xi)
    }

    /// Unnormalized tangent `x1 - x0`.
    pub fn tangent(&self) -> DVec3 {
        self.positions[1] - self.positions[0]
    }

    pub fn length(&self) -> f64 {
        self.tangent().length()
    }

    /// Parameter of a binding spot.
    pub fn spot_xi(&self, index: u16) -> Option<f64> {
        self.binding_spots.get(index as usize).copied()
    }

    /// Position of a binding spot.
    pub fn spot_position(&self, index: u16) -> Option<DVec3> {
        self.spot_xi(index).map(|xi| self.point_at(xi))
    }
}

/// Rigid sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereGeometry {
    pub node: NodeId,
    pub position: DVec3,
    pub radius: f64,
}

/// Point-like linker molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosslinkerGeometry {
    pub node: NodeId,
    pub position: DVec3,
    pub linker: LinkerType,
}

/// DEM particle with translational and rotational velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleGeometry {
    pub position: DVec3,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub radius: f64,
    pub mass: f64,
}

/// Geometry of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Beam(BeamGeometry),
    Sphere(SphereGeometry),
    Crosslinker(CrosslinkerGeometry),
    Particle(ParticleGeometry),
}

impl Shape {
    pub fn kind(&self) -> EntityKind {
        match self {
            Shape::Beam(_) => EntityKind::Beam,
            Shape::Sphere(_) => EntityKind::Sphere,
            Shape::Crosslinker(_) => EntityKind::Crosslinker,
            Shape::Particle(_) => EntityKind::Particle,
        }
    }

    /// Finite-element nodes of the entity. Particles have none.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Shape::Beam(b) => b.nodes.to_vec(),
            Shape::Sphere(s) => vec![s.node],
            Shape::Crosslinker(c) => vec![c.node],
            Shape::Particle(_) => Vec::new(),
        }
    }

    /// Interaction radius.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Beam(b) => b.radius,
            Shape::Sphere(s) => s.radius,
            Shape::Crosslinker(_) => 0.0,
            Shape::Particle(p) => p.radius,
        }
    }

    /// Positions that carry degrees of freedom.
    pub fn positions(&self) -> Vec<DVec3> {
        match self {
            Shape::Beam(b) => b.positions.to_vec(),
            Shape::Sphere(s) => vec![s.position],
            Shape::Crosslinker(c) => vec![c.position],
            Shape::Particle(p) => vec![p.position],
        }
    }
}

/// An entity as seen by one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub owner: Rank,
    pub shape: Shape,
    /// Ranks holding a ghost copy. Only meaningful on the owner.
    pub ghost_holders: Vec<Rank>,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.shape.kind()
    }

    /// Whether two entities share a finite-element node.
    pub fn shares_node_with(&self, other: &Entity) -> bool {
        let mine: BTreeSet<NodeId> = self.shape.nodes().into_iter().collect();
        other.shape.nodes().iter().any(|n| mine.contains(n))
    }
}

/// Stable slot index into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

/// Slot storage with stable handles and an id index.
///
/// Removing an entry frees its slot for reuse; handles of other entries
/// stay valid.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<(EntityId, T)>>,
    free: Vec<u32>,
    index: BTreeMap<EntityId, Handle>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value stored for `id`.
    pub fn insert(&mut self, id: EntityId, value: T) -> Handle {
        if let Some(&handle) = self.index.get(&id) {
            self.slots[handle.0 as usize] = Some((id, value));
            return handle;
        }
        let handle = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some((id, value));
                Handle(slot)
            }
            None => {
                self.slots.push(Some((id, value)));
                Handle((self.slots.len() - 1) as u32)
            }
        };
        self.index.insert(id, handle);
        handle
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let handle = self.index.remove(&id)?;
        self.free.push(handle.0);
        self.slots[handle.0 as usize].take().map(|(_, v)| v)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<Handle> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle.0 as usize)?.as_ref().map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle.0 as usize)?.as_mut().map(|(_, v)| v)
    }

    pub fn by_id(&self, id: EntityId) -> Option<&T> {
        self.get(self.handle_of(id)?)
    }

    pub fn by_id_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let handle = self.handle_of(id)?;
        self.get_mut(handle)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.index
            .iter()
            .filter_map(|(id, h)| self.get(*h).map(|v| (*id, v)))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
    }
}

/// Flattened centerline/position values of an entity.
pub trait DofProvider {
    /// `[x0, y0, z0, x1, y1, z1, ...]` for every position-carrying node.
    fn extract_dof_values(&self, entity: EntityId) -> Option<Vec<f64>>;
}

/// Row and ghost entities of one rank.
#[derive(Debug, Clone)]
pub struct EntityTable {
    rank: Rank,
    entities: Arena<Entity>,
}

impl EntityTable {
    /// Empty table for `rank`.
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            entities: Arena::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Insert or replace an entity.
    pub fn insert(&mut self, entity: Entity) -> Handle {
        self.entities.insert(entity.id, entity)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.by_id(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.by_id_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Current owner of an entity, if this rank sees it at all.
    pub fn owner_of(&self, id: EntityId) -> Option<Rank> {
        self.get(id).map(|e| e.owner)
    }

    /// Whether this rank owns the entity.
    pub fn is_row(&self, id: EntityId) -> bool {
        self.owner_of(id) == Some(self.rank)
    }

    /// Ghost holders of an owned entity; empty for ghosts and unknown ids.
    pub fn ghost_holders(&self, id: EntityId) -> Vec<Rank> {
        match self.get(id) {
            Some(e) if e.owner == self.rank => e.ghost_holders.clone(),
            _ => Vec::new(),
        }
    }

    /// All entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().map(|(_, e)| e)
    }

    /// Owned entities in id order.
    pub fn row(&self) -> impl Iterator<Item = &Entity> {
        let rank = self.rank;
        self.iter().filter(move |e| e.owner == rank)
    }

    /// Ghost entities in id order.
    pub fn ghosts(&self) -> impl Iterator<Item = &Entity> {
        let rank = self.rank;
        self.iter().filter(move |e| e.owner != rank)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn beam(&self, id: EntityId) -> Option<&BeamGeometry> {
        match &self.get(id)?.shape {
            Shape::Beam(b) => Some(b),
            _ => None,
        }
    }

    pub fn sphere(&self, id: EntityId) -> Option<&SphereGeometry> {
        match &self.get(id)?.shape {
            Shape::Sphere(s) => Some(s),
            _ => None,
        }
    }

    pub fn crosslinker(&self, id: EntityId) -> Option<&CrosslinkerGeometry> {
        match &self.get(id)?.shape {
            Shape::Crosslinker(c) => Some(c),
            _ => None,
        }
    }

    pub fn particle(&self, id: EntityId) -> Option<&ParticleGeometry> {
        match &self.get(id)?.shape {
            Shape::Particle(p) => Some(p),
            _ => None,
        }
    }
}

impl DofProvider for EntityTable {
    fn extract_dof_values(&self, entity: EntityId) -> Option<Vec<f64>> {
        let positions = self.get(entity)?.shape.positions();
        Some(positions.iter().flat_map(|p| p.to_array()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beam(id: u64, owner: u32, n0: u64, n1: u64) -> Entity {
        Entity {
            id: EntityId(id),
            owner: Rank(owner),
            shape: Shape::Beam(BeamGeometry {
                nodes: [NodeId(n0), NodeId(n1)],
                positions: [DVec3::ZERO, DVec3::X],
                radius: 0.1,
                filament: FilamentType::Actin,
                binding_spots: vec![0.25, 0.75],
            }),
            ghost_holders: Vec::new(),
        }
    }

    #[test]
    fn arena_reuses_slots_and_keeps_handles() {
        let mut arena: Arena<&str> = Arena::new();
        let a = arena.insert(EntityId(1), "a");
        let b = arena.insert(EntityId(2), "b");
        assert_eq!(arena.remove(EntityId(1)), Some("a"));
        let c = arena.insert(EntityId(3), "c");
        assert_eq!(c, a);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.by_id(EntityId(3)), Some(&"c"));
        assert_eq!(arena.by_id(EntityId(1)), None);
    }

    #[test]
    fn arena_iterates_in_id_order() {
        let mut arena: Arena<u8> = Arena::new();
        arena.insert(EntityId(9), 0);
        arena.insert(EntityId(2), 0);
        arena.insert(EntityId(5), 0);
        let ids: Vec<_> = arena.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn row_and_ghost_split() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(beam(1, 0, 1, 2));
        table.insert(beam(2, 1, 3, 4));
        assert_eq!(table.row().count(), 1);
        assert_eq!(table.ghosts().count(), 1);
        assert!(table.is_row(EntityId(1)));
        assert_eq!(table.owner_of(EntityId(2)), Some(Rank(1)));
    }

    #[test]
    fn shared_node_detection() {
        assert!(beam(1, 0, 1, 2).shares_node_with(&beam(2, 0, 2, 3)));
        assert!(!beam(1, 0, 1, 2).shares_node_with(&beam(2, 0, 3, 4)));
    }

    #[test]
    fn spot_positions_interpolate() {
        let e = beam(1, 0, 1, 2);
        let Shape::Beam(b) = &e.shape else { unreachable!() };
        assert_eq!(b.spot_position(1), Some(DVec3::new(0.75, 0.0, 0.0)));
        assert_eq!(b.spot_position(2), None);
    }

    #[test]
    fn compatibility_table() {
        assert!(LinkerType::Arbitrary.binds_to(FilamentType::Collagen));
        assert!(LinkerType::Actin.binds_to(FilamentType::Arbitrary));
        assert!(LinkerType::Integrin.binds_to(FilamentType::Collagen));
        assert!(!LinkerType::Actin.binds_to(FilamentType::Collagen));
        assert!(!LinkerType::Integrin.binds_to(FilamentType::Actin));
    }

    #[test]
    fn dof_values_flatten_positions() {
        let mut table = EntityTable::new(Rank(0));
        table.insert(beam(1, 0, 1, 2));
        assert_eq!(
            table.extract_dof_values(EntityId(1)),
            Some(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0])
        );
    }
}
