//! Global entity list shared by every rank of a run.

use std::collections::BTreeMap;

use glam::DVec3;
use linkage_binning::EntityId;
use linkage_comm::Rank;
use linkage_interaction::{
    BeamGeometry, CrosslinkerGeometry, Entity, EntityTable, FilamentType, LinkerType, NodeId,
    ParticleGeometry, Shape, SphereGeometry,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Moving state of an entity, broadcast by its owner after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Update {
    Particle {
        id: EntityId,
        position: DVec3,
        velocity: DVec3,
        angular_velocity: DVec3,
    },
    Crosslinker {
        id: EntityId,
        position: DVec3,
    },
}

/// Every entity of the simulated box.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    lower: DVec3,
    upper: DVec3,
    shapes: BTreeMap<EntityId, Shape>,
    next_id: u64,
    next_node: u64,
}

impl Scene {
    /// An empty box `[lower, upper]`.
    pub fn new(lower: DVec3, upper: DVec3) -> Self {
        Self {
            lower,
            upper,
            shapes: BTreeMap::new(),
            next_id: 1,
            next_node: 1,
        }
    }

    pub fn lower(&self) -> DVec3 {
        self.lower
    }

    pub fn upper(&self) -> DVec3 {
        self.upper
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Shape)> {
        self.shapes.iter().map(|(id, shape)| (*id, shape))
    }

    fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn next_node(&mut self) -> NodeId {
        let node = NodeId(self.next_node);
        self.next_node += 1;
        node
    }

    fn push(&mut self, shape: Shape) -> EntityId {
        let id = self.next_id();
        self.shapes.insert(id, shape);
        id
    }

    /// A single beam element with `spots` evenly spaced binding spots.
    pub fn add_beam(&mut self, a: DVec3, b: DVec3, radius: f64, filament: FilamentType, spots: usize) -> EntityId {
        let nodes = [self.next_node(), self.next_node()];
        self.push(Shape::Beam(BeamGeometry {
            nodes,
            positions: [a, b],
            radius,
            filament,
            binding_spots: spot_parameters(spots),
        }))
    }

    /// A straight filament of `elements` beams; neighbors share a node.
    pub fn add_filament(
        &mut self,
        a: DVec3,
        b: DVec3,
        elements: usize,
        radius: f64,
        filament: FilamentType,
        spots: usize,
    ) -> Vec<EntityId> {
        let elements = elements.max(1);
        let mut node = self.next_node();
        let mut ids = Vec::with_capacity(elements);
        for k in 0..elements {
            let next = self.next_node();
            let s0 = k as f64 / elements as f64;
            let s1 = (k + 1) as f64 / elements as f64;
            ids.push(self.push(Shape::Beam(BeamGeometry {
                nodes: [node, next],
                positions: [a.lerp(b, s0), a.lerp(b, s1)],
                radius,
                filament,
                binding_spots: spot_parameters(spots),
            })));
            node = next;
        }
        ids
    }

    pub fn add_sphere(&mut self, center: DVec3, radius: f64) -> EntityId {
        let node = self.next_node();
        self.push(Shape::Sphere(SphereGeometry {
            node,
            position: center,
            radius,
        }))
    }

    pub fn add_crosslinker(&mut self, position: DVec3, linker: LinkerType) -> EntityId {
        let node = self.next_node();
        self.push(Shape::Crosslinker(CrosslinkerGeometry { node, position, linker }))
    }

    pub fn add_particle(&mut self, position: DVec3, velocity: DVec3, radius: f64, mass: f64) -> EntityId {
        self.push(Shape::Particle(ParticleGeometry {
            position,
            velocity,
            angular_velocity: DVec3::ZERO,
            radius,
            mass,
        }))
    }

    /// Random straight filaments and free linkers in `[0, extent]`.
    pub fn random_network(
        extent: DVec3,
        seed: u64,
        filaments: usize,
        elements: usize,
        linkers: usize,
        linker: LinkerType,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scene = Self::new(DVec3::ZERO, extent);
        let margin = extent * 0.1;
        let length = 0.4 * extent.min_element();
        for _ in 0..filaments {
            let start = random_point(&mut rng, margin, extent - margin);
            let direction = random_direction(&mut rng);
            let end = (start + direction * length).clamp(margin, extent - margin);
            if start.distance(end) < 0.25 * length {
                continue;
            }
            scene.add_filament(start, end, elements, 0.01, FilamentType::Actin, 2);
        }
        for _ in 0..linkers {
            let position = random_point(&mut rng, margin, extent - margin);
            scene.add_crosslinker(position, linker);
        }
        scene
    }

    /// A cubic lattice of particles with small random velocities.
    pub fn particle_lattice(extent: DVec3, seed: u64, per_side: usize, radius: f64, speed: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scene = Self::new(DVec3::ZERO, extent);
        let spacing = extent / (per_side.max(1) as f64);
        for i in 0..per_side {
            for j in 0..per_side {
                for k in 0..per_side {
                    let position = (DVec3::new(i as f64, j as f64, k as f64) + 0.5) * spacing;
                    let velocity = random_direction(&mut rng) * speed;
                    scene.add_particle(position, velocity, radius, 1.0);
                }
            }
        }
        scene
    }

    /// Largest half extent of a beam along x.
    pub fn max_beam_half_extent(&self) -> f64 {
        self.shapes
            .values()
            .filter_map(|shape| match shape {
                Shape::Beam(b) => Some(0.5 * (b.positions[0].x - b.positions[1].x).abs()),
                _ => None,
            })
            .fold(0.0, f64::max)
    }

    /// Every entity as a row entity of `rank`.
    pub(crate) fn table_of_everything(&self, rank: Rank) -> EntityTable {
        let mut table = EntityTable::new(rank);
        for (id, shape) in &self.shapes {
            table.insert(Entity {
                id: *id,
                owner: rank,
                shape: shape.clone(),
                ghost_holders: Vec::new(),
            });
        }
        table
    }

    pub(crate) fn apply(&mut self, update: Update) {
        match update {
            Update::Particle {
                id,
                position,
                velocity,
                angular_velocity,
            } => {
                if let Some(Shape::Particle(p)) = self.shapes.get_mut(&id) {
                    p.position = position;
                    p.velocity = velocity;
                    p.angular_velocity = angular_velocity;
                }
            }
            Update::Crosslinker { id, position } => {
                if let Some(Shape::Crosslinker(c)) = self.shapes.get_mut(&id) {
                    c.position = position;
                }
            }
        }
    }
}

fn spot_parameters(spots: usize) -> Vec<f64> {
    (0..spots).map(|k| (k as f64 + 0.5) / spots as f64).collect()
}

fn random_point(rng: &mut StdRng, lower: DVec3, upper: DVec3) -> DVec3 {
    DVec3::new(
        rng.gen_range(lower.x..=upper.x),
        rng.gen_range(lower.y..=upper.y),
        rng.gen_range(lower.z..=upper.z),
    )
}

fn random_direction(rng: &mut StdRng) -> DVec3 {
    loop {
        let x: f64 = StandardNormal.sample(rng);
        let y: f64 = StandardNormal.sample(rng);
        let z: f64 = StandardNormal.sample(rng);
        if let Some(direction) = DVec3::new(x, y, z).try_normalize() {
            return direction;
        }
    }
}
