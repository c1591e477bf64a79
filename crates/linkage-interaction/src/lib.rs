//! Linkage Interaction - pairwise interactions of beams, spheres, linkers
//! and particles across distributed ranks.
//!
//! Every rank owns a set of row entities and sees a halo of ghosts. Per
//! step the [`InteractionManager`] rebuilds candidate pairs from the
//! spatial index, evaluates contact and linker forces, and commits bind
//! and unbind decisions through the ownership consensus round so that all
//! copies of a crosslinker agree.
//!
//! # Architecture
//!
//! - **Entity**: arena of row and ghost entities handed in by the driver
//! - **Catalog**: candidate pairs from the binning neighborhoods
//! - **Pair**: beam contact and double-bonded linker springs
//! - **Crosslinking**: bond state, binding, unbinding, diffusion
//! - **DEM**: particle contact with tangential, rolling and adhesion history
//! - **Manager**: per-step phases, assembly, energy, output and restart
//!
//! # Example
//!
//! ```no_run
//! use linkage_comm::{ExchangeConfig, LocalCluster};
//! use linkage_interaction::{EntityTable, InteractionManager, InteractionParams};
//!
//! let comm = LocalCluster::new(1, ExchangeConfig::default())?.remove(0);
//! let params = InteractionParams::default();
//! let table = EntityTable::new(linkage_comm::Rank(0));
//! let mut manager = InteractionManager::new(comm, params)?;
//! manager.setup(&table)?;
//! # Ok::<(), linkage_interaction::Error>(())
//! ```

pub mod assembly;
pub mod catalog;
pub mod crosslinking;
pub mod dem;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod manager;
pub mod output;
pub mod pair;
pub mod params;
pub mod restart;

pub use assembly::{Assembler, CollectingAssembler, EvaluationMode, NodalMatrix, PairEvaluation};
pub use catalog::{CandidatePair, CompatibilityTable, PairCatalog, PairKind};
pub use crosslinking::{BeamBindingState, BindingSummary, Bond, BondState, CrosslinkerState, Crosslinking};
pub use dem::{DemContact, DemHistory};
pub use entity::{
    Arena, BeamGeometry, CrosslinkerGeometry, DofProvider, Entity, EntityTable, FilamentType, Handle,
    LinkerType, NodeId, ParticleGeometry, Shape, SphereGeometry,
};
pub use error::{Error, Result};
pub use manager::{EnergyType, InteractionManager, Phase, StepReport};
pub use output::{BondPoint, ContactPoint, CrosslinkerPoint, VisualizationFrame};
pub use pair::{BeamContactPair, BeamLink, ContactState, InteractionPair, PairError};
pub use params::{
    BeamContactParams, CrosslinkingParams, DemParams, InteractionParams, LinkerParams, PenaltyLaw,
};
pub use restart::{CrosslinkerRecord, PairRecord, RestartChunk};

pub use linkage_binning::{EntityId, EntityKind};
pub use linkage_consensus::BindingSpot;
