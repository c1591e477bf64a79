//! Linkage Simulation
//!
//! A small outer driver for the interaction layer. Every rank runs on its
//! own thread and holds a copy of the global [`Scene`]; ownership and ghost
//! copies follow from a slab decomposition of the bin grid along x.
//!
//! # Architecture
//!
//! - **Scene**: global entity list with builders for filaments, linkers and particles
//! - **Decomposition**: bin columns per rank and the ghost halo around them
//! - **Simulation**: per-step phases, load routing and explicit integration
//! - **Events**: per-step summaries and visualization frames as JSON
//!
//! Beams and spheres are held in place; particles move under the assembled
//! loads and crosslinkers diffuse.
//!
//! # Usage
//!
//! ```no_run
//! use glam::DVec3;
//! use linkage_interaction::{CrosslinkingParams, InteractionParams, LinkerType};
//! use linkage_sim::{Scene, Simulation, SimulationConfig};
//!
//! let scene = Scene::random_network(DVec3::splat(2.0), 7, 8, 4, 40, LinkerType::Arbitrary);
//! let params = InteractionParams::default().with_crosslinking(CrosslinkingParams::default());
//! let outcome = Simulation::new(scene, params, SimulationConfig::default().with_ranks(3)).run()?;
//! println!("{} bonds", outcome.bonds.len());
//! # Ok::<(), linkage_sim::SimError>(())
//! ```

mod decomposition;
mod error;
mod events;
mod scene;
mod simulation;

pub use decomposition::{bin_entities, SlabDecomposition};
pub use error::{Result, SimError};
pub use events::SimEvent;
pub use scene::Scene;
pub use simulation::{RunOutcome, Simulation, SimulationConfig};
