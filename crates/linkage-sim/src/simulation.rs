//! Multi-rank runs on threads.
//!
//! Per step every rank:
//!
//! 1. rebuilds its entity table from the scene and redistributes state
//! 2. bins its entities and rebuilds the pair catalog
//! 3. evaluates forces and commits the step state
//! 4. sends loads assembled on ghosts to their owners
//! 5. integrates its row particles and broadcasts every moving state
//!
//! Loads are summed in a canonical order, so a run gives the same
//! trajectory on any number of ranks.

use std::collections::BTreeMap;
use std::thread;

use glam::DVec3;
use linkage_binning::{BinGrid, EntityId};
use linkage_comm::{decode, encode, exchange, Communicator, ExchangeConfig, LocalCluster, Outbox, Tag};
use linkage_consensus::BindingSpot;
use linkage_interaction::{Assembler, EntityTable, InteractionManager, InteractionParams, NodalMatrix, Shape};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decomposition::{bin_entities, SlabDecomposition};
use crate::error::{Result, SimError};
use crate::events::SimEvent;
use crate::scene::{Scene, Update};

/// Run settings.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub ranks: usize,
    pub steps: u64,
    /// Lower bound of the bin edge; the edge is at least twice the half
    /// interaction distance.
    pub min_bin_size: f64,
    pub exchange: ExchangeConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ranks: 1,
            steps: 10,
            min_bin_size: 0.25,
            exchange: ExchangeConfig::default(),
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn with_ranks(mut self, ranks: usize) -> Self {
        self.ranks = ranks;
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    #[must_use]
    pub fn with_min_bin_size(mut self, size: f64) -> Self {
        self.min_bin_size = size;
        self
    }

    #[must_use]
    pub fn with_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.exchange = exchange;
        self
    }
}

/// Merged result of all ranks.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub first_step: u64,
    pub last_step: u64,
    /// Events ordered by step, then rank.
    pub events: Vec<SimEvent>,
    /// Scene after the last step.
    pub scene: Scene,
    /// Every committed bond, sorted by spot.
    pub bonds: Vec<(BindingSpot, EntityId)>,
    /// Restart chunks, one per rank.
    pub restart: Vec<Vec<u8>>,
}

impl RunOutcome {
    /// Global energies reported for `step`.
    pub fn energy_at(&self, step: u64) -> Option<&BTreeMap<linkage_interaction::EnergyType, f64>> {
        self.events.iter().find_map(|event| match event {
            SimEvent::StepCompleted { step: s, energy, .. } if *s == step => Some(energy),
            _ => None,
        })
    }

    /// Sum of bind grants over all ranks and steps.
    pub fn granted(&self) -> usize {
        self.events
            .iter()
            .map(|event| match event {
                SimEvent::StepCompleted { report, .. } => report.binding.granted,
                SimEvent::Frame { .. } => 0,
            })
            .sum()
    }
}

struct RankOutcome {
    events: Vec<SimEvent>,
    scene: Scene,
    bonds: Vec<(BindingSpot, EntityId)>,
    restart: Vec<u8>,
}

/// A scene, its parameters and the run settings.
#[derive(Debug, Clone)]
pub struct Simulation {
    scene: Scene,
    params: InteractionParams,
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(scene: Scene, params: InteractionParams, config: SimulationConfig) -> Self {
        Self { scene, params, config }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Run steps `1..=steps`.
    pub fn run(&self) -> Result<RunOutcome> {
        self.run_from(1, None)
    }

    /// Continue after `restart_step` from restart chunks written by a run on
    /// any number of ranks. The scene must be the scene of that run.
    pub fn resume(&self, restart: &[Vec<u8>], restart_step: u64) -> Result<RunOutcome> {
        self.run_from(restart_step + 1, Some(restart))
    }

    fn run_from(&self, first_step: u64, restart: Option<&[Vec<u8>]>) -> Result<RunOutcome> {
        if self.config.ranks == 0 {
            return Err(SimError::InvalidConfig("at least one rank is required".into()));
        }
        self.params.validate()?;
        let comms = LocalCluster::new(self.config.ranks, self.config.exchange)?;
        info!(
            ranks = self.config.ranks,
            entities = self.scene.len(),
            first_step,
            steps = self.config.steps,
            "simulation started"
        );

        let results: Vec<Result<RankOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank();
                    let handle = scope.spawn(move || -> Result<RankOutcome> {
                        RankRun::new(comm, self, first_step)?.run(restart)
                    });
                    (rank, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(rank, handle)| handle.join().unwrap_or(Err(SimError::RankPanicked(rank))))
                .collect()
        });

        let mut outcome = RunOutcome {
            first_step,
            last_step: (first_step + self.config.steps).saturating_sub(1),
            events: Vec::new(),
            scene: self.scene.clone(),
            bonds: Vec::new(),
            restart: Vec::new(),
        };
        for (rank, result) in results.into_iter().enumerate() {
            let part = result?;
            if rank == 0 {
                outcome.scene = part.scene;
            }
            outcome.events.extend(part.events);
            outcome.bonds.extend(part.bonds);
            outcome.restart.push(part.restart);
        }
        outcome.events.sort_by_key(|e| (e.step(), e.rank()));
        outcome.bonds.sort();
        info!(bonds = outcome.bonds.len(), "simulation finished");
        Ok(outcome)
    }
}

/// One load acting on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Load {
    Force(EntityId, DVec3),
    Moment(EntityId, DVec3),
}

/// Assembler keeping every contribution separately so owners can sum
/// them in a fixed order.
#[derive(Debug, Default)]
struct LoadLog {
    loads: Vec<Load>,
}

impl Assembler for LoadLog {
    fn assemble_force(&mut self, ids: [EntityId; 2], forces: &[Vec<DVec3>; 2]) {
        for (id, nodal) in ids.iter().zip(forces) {
            for force in nodal {
                self.loads.push(Load::Force(*id, *force));
            }
        }
    }

    fn assemble_stiffness(&mut self, _ids: [EntityId; 2], _blocks: &[[NodalMatrix; 2]; 2]) {}

    fn assemble_moment(&mut self, entity: EntityId, moment: DVec3) {
        self.loads.push(Load::Moment(entity, moment));
    }
}

/// Sum of `values` independent of their order.
fn canonical_sum(mut values: Vec<DVec3>) -> DVec3 {
    values.sort_by_key(|v| v.to_array().map(f64::to_bits));
    values.into_iter().fold(DVec3::ZERO, |acc, v| acc + v)
}

struct RankRun<'a, C> {
    manager: InteractionManager<C>,
    sim: &'a Simulation,
    scene: Scene,
    grid: BinGrid,
    slabs: SlabDecomposition,
    first_step: u64,
}

impl<'a, C: Communicator> RankRun<'a, C> {
    fn new(comm: C, sim: &'a Simulation, first_step: u64) -> Result<Self> {
        let me = comm.rank();
        let scene = sim.scene.clone();
        let manager = InteractionManager::new(comm, sim.params.clone())?.with_domain(scene.lower(), scene.upper());

        let half = manager.half_interaction_distance(&scene.table_of_everything(me))?;
        let bin_size = sim.config.min_bin_size.max(2.0 * half);
        let grid = BinGrid::new(scene.lower(), scene.upper() - scene.lower(), bin_size)?;
        let slabs = SlabDecomposition::new(&grid, sim.config.ranks, bin_size + scene.max_beam_half_extent());
        debug!(%me, bin_size, dims = ?grid.dims(), "grid built");
        Ok(Self {
            manager,
            sim,
            scene,
            grid,
            slabs,
            first_step,
        })
    }

    fn run(mut self, restart: Option<&[Vec<u8>]>) -> Result<RankOutcome> {
        let me = self.manager.comm().rank();
        let mut events = Vec::new();
        let mut table = self.slabs.table_for(me, &self.scene);
        self.manager.setup(&table)?;
        if let Some(chunks) = restart {
            let written = self.manager.read_restart(&table, chunks)?;
            if written + 1 != self.first_step {
                return Err(SimError::InvalidConfig(format!(
                    "restart written after step {written} cannot resume at step {}",
                    self.first_step
                )));
            }
        }

        let last = self.first_step + self.sim.config.steps;
        for step in self.first_step..last {
            if step != self.first_step {
                table = self.slabs.table_for(me, &self.scene);
                self.manager.redistribute(&table)?;
            }
            let index = bin_entities(&self.grid, &table)?;
            self.manager.update_step_element(&table, &index, step)?;
            self.manager.reset(&table)?;
            let mut log = LoadLog::default();
            self.manager.evaluate_force(&table, &mut log)?;
            let report = self.manager.update_step_state(&table, step)?;
            let energy = self.manager.energy()?;

            let rows = table.row().count();
            events.push(SimEvent::StepCompleted {
                step,
                rank: me,
                rows,
                ghosts: table.len() - rows,
                report,
                energy,
            });
            if let Some(frame) = self.manager.visualization(&table, step) {
                events.push(SimEvent::Frame { frame });
            }

            let loads = self.route_loads(&table, log)?;
            let updates = self.integrate(&table, &loads);
            self.broadcast(updates)?;
        }

        let bonds = self
            .manager
            .crosslinking()
            .map_or_else(Vec::new, |xl| xl.row_bonds(&table));
        let restart = self.manager.write_restart(&table)?;
        Ok(RankOutcome {
            events,
            scene: self.scene,
            bonds,
            restart,
        })
    }

    /// Loads on row entities, from this rank and from the ranks that
    /// evaluated pairs involving them.
    fn route_loads(&self, table: &EntityTable, log: LoadLog) -> Result<BTreeMap<EntityId, (DVec3, DVec3)>> {
        let comm = self.manager.comm();
        let mut outbox: Outbox<Load> = Outbox::new();
        for load in log.loads {
            let (Load::Force(id, _) | Load::Moment(id, _)) = load;
            if let Some(owner) = table.owner_of(id) {
                outbox.entry(owner).or_default().push(load);
            }
        }

        let mut forces: BTreeMap<EntityId, Vec<DVec3>> = BTreeMap::new();
        let mut moments: BTreeMap<EntityId, Vec<DVec3>> = BTreeMap::new();
        for (_, bundle) in exchange(comm, Tag::GhostForce, outbox)? {
            for load in bundle {
                match load {
                    Load::Force(id, f) => forces.entry(id).or_default().push(f),
                    Load::Moment(id, m) => moments.entry(id).or_default().push(m),
                }
            }
        }

        let mut totals: BTreeMap<EntityId, (DVec3, DVec3)> = BTreeMap::new();
        for (id, values) in forces {
            totals.entry(id).or_insert((DVec3::ZERO, DVec3::ZERO)).0 = canonical_sum(values);
        }
        for (id, values) in moments {
            totals.entry(id).or_insert((DVec3::ZERO, DVec3::ZERO)).1 = canonical_sum(values);
        }
        Ok(totals)
    }

    /// Symplectic Euler step of row particles with reflecting walls, plus
    /// the current crosslinker positions.
    fn integrate(&self, table: &EntityTable, loads: &BTreeMap<EntityId, (DVec3, DVec3)>) -> Vec<Update> {
        let dt = self.sim.params.dt;
        let (lower, upper) = (self.scene.lower(), self.scene.upper());
        let mut updates = Vec::new();
        for entity in table.row() {
            let Shape::Particle(p) = &entity.shape else { continue };
            let (force, moment) = loads.get(&entity.id).copied().unwrap_or((DVec3::ZERO, DVec3::ZERO));
            let inertia = 0.4 * p.mass * p.radius * p.radius;
            let mut velocity = p.velocity + force / p.mass * dt;
            let angular_velocity = p.angular_velocity + moment / inertia * dt;
            let mut position = p.position + velocity * dt;
            for axis in 0..3 {
                if position[axis] < lower[axis] {
                    position[axis] = 2.0 * lower[axis] - position[axis];
                    velocity[axis] = velocity[axis].abs();
                } else if position[axis] > upper[axis] {
                    position[axis] = 2.0 * upper[axis] - position[axis];
                    velocity[axis] = -velocity[axis].abs();
                }
            }
            updates.push(Update::Particle {
                id: entity.id,
                position: position.clamp(lower, upper),
                velocity,
                angular_velocity,
            });
        }
        for (id, position) in self.manager.crosslinker_positions(table) {
            updates.push(Update::Crosslinker { id, position });
        }
        updates
    }

    /// Apply the updates of every rank to the local scene copy.
    fn broadcast(&mut self, updates: Vec<Update>) -> Result<()> {
        let gathered = self.manager.comm().all_gather(encode(&updates)?)?;
        for bytes in gathered {
            for update in decode::<Vec<Update>>(&bytes)? {
                self.scene.apply(update);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkage_interaction::{BeamContactParams, CrosslinkingParams, DemParams, EnergyType, LinkerParams, LinkerType};

    fn network_params() -> InteractionParams {
        InteractionParams::default().with_dt(0.01).with_seed(11).with_crosslinking(
            CrosslinkingParams::default().with_linker(
                LinkerParams::default()
                    .with_rates(50.0, 5.0)
                    .with_linking_length(0.05, 0.3)
                    .with_angle(0.0, std::f64::consts::FRAC_PI_2),
            ),
        )
    }

    fn config(ranks: usize) -> SimulationConfig {
        SimulationConfig::default()
            .with_ranks(ranks)
            .with_steps(6)
            .with_exchange(ExchangeConfig::fast())
    }

    #[test]
    fn canonical_sum_ignores_order() {
        let values = vec![DVec3::new(1.0e16, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(-1.0e16, 0.0, 0.0)];
        let mut reversed = values.clone();
        reversed.reverse();
        assert_eq!(canonical_sum(values), canonical_sum(reversed));
    }

    #[test]
    fn zero_ranks_is_rejected() {
        let scene = Scene::new(DVec3::ZERO, DVec3::ONE);
        let sim = Simulation::new(scene, InteractionParams::default(), config(0));
        assert!(matches!(sim.run(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn single_rank_network_forms_bonds() {
        let scene = Scene::random_network(DVec3::splat(1.0), 5, 6, 3, 30, LinkerType::Arbitrary);
        let outcome = Simulation::new(scene, network_params(), config(1)).run().unwrap();
        assert_eq!(outcome.restart.len(), 1);
        assert_eq!(outcome.last_step, 6);
        assert!(outcome.energy_at(6).is_some());
        let bonded: usize = outcome.bonds.len();
        assert!(outcome.granted() >= bonded);
    }

    #[test]
    fn bond_sets_do_not_depend_on_rank_count() {
        let scene = Scene::random_network(DVec3::new(2.0, 1.0, 1.0), 21, 10, 4, 60, LinkerType::Arbitrary);
        let one = Simulation::new(scene.clone(), network_params(), config(1)).run().unwrap();
        let three = Simulation::new(scene, network_params(), config(3)).run().unwrap();
        assert_eq!(one.bonds, three.bonds);
        assert_eq!(one.scene, three.scene);
    }

    #[test]
    fn colliding_particles_conserve_momentum_across_ranks() {
        let mut scene = Scene::new(DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0));
        scene.add_particle(DVec3::new(0.9, 0.5, 0.5), DVec3::new(1.0, 0.0, 0.0), 0.1, 1.0);
        scene.add_particle(DVec3::new(1.1, 0.5, 0.5), DVec3::new(-1.0, 0.0, 0.0), 0.1, 1.0);
        let params = InteractionParams::default()
            .with_dt(0.001)
            .with_dem(DemParams::default().with_normal(1.0e4, 0.0));
        let cfg = config(2).with_steps(40);
        let outcome = Simulation::new(scene, params, cfg).run().unwrap();

        let momentum: DVec3 = outcome
            .scene
            .iter()
            .filter_map(|(_, shape)| match shape {
                Shape::Particle(p) => Some(p.velocity * p.mass),
                _ => None,
            })
            .sum();
        assert!(momentum.length() < 1e-9);
        let touched = outcome.events.iter().any(|e| match e {
            SimEvent::StepCompleted { report, .. } => report.dem_contacts > 0,
            SimEvent::Frame { .. } => false,
        });
        assert!(touched);
        assert!(outcome.energy_at(1).unwrap().contains_key(&EnergyType::DemElastic));
    }

    #[test]
    fn contact_only_scene_reports_penalty_energy() {
        let mut scene = Scene::new(DVec3::ZERO, DVec3::ONE);
        scene.add_beam(DVec3::new(0.1, 0.5, 0.5), DVec3::new(0.9, 0.5, 0.5), 0.05, linkage_interaction::FilamentType::Actin, 0);
        scene.add_beam(DVec3::new(0.5, 0.1, 0.55), DVec3::new(0.5, 0.9, 0.55), 0.05, linkage_interaction::FilamentType::Actin, 0);
        let params = InteractionParams::default().with_contact(BeamContactParams::default().with_penalty(100.0));
        let outcome = Simulation::new(scene, params, config(2).with_steps(1)).run().unwrap();
        let energy = outcome.energy_at(1).unwrap();
        assert!((energy[&EnergyType::BeamContactPenalty] - 0.125).abs() < 1e-12);
    }
}
