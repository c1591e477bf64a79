//! Shared fixtures for the multi-rank scenario tests.

use std::thread;

use glam::DVec3;
use linkage_binning::BinGrid;
use linkage_comm::{ExchangeConfig, LocalCluster, LocalComm};
use linkage_interaction::{CrosslinkingParams, FilamentType, InteractionParams, LinkerParams, LinkerType};
use linkage_sim::{Scene, SimulationConfig, SlabDecomposition};

/// Run `body` once per rank of an in-process cluster, each on its own
/// thread. Results are ordered by rank; a panic on any rank is re-raised.
pub fn on_ranks<T, F>(ranks: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let comms = match LocalCluster::new(ranks, ExchangeConfig::fast()) {
        Ok(comms) => comms,
        Err(e) => panic!("cluster of {ranks} ranks: {e}"),
    };
    let body = &body;
    thread::scope(|scope| {
        let handles: Vec<_> = comms.into_iter().map(|comm| scope.spawn(move || body(comm))).collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// One arbitrary linker type with the given kinetics.
pub fn linker_params(k_on: f64, k_off0: f64, length: (f64, f64)) -> LinkerParams {
    LinkerParams::default()
        .with_linker(LinkerType::Arbitrary)
        .with_rates(k_on, k_off0)
        .with_linking_length(length.0, length.1)
        .with_angle(0.0, std::f64::consts::FRAC_PI_2)
        .with_stiffness(10.0)
}

/// Crosslinking only.
pub fn network_params(seed: u64, linker: LinkerParams) -> InteractionParams {
    InteractionParams::default()
        .with_dt(0.01)
        .with_seed(seed)
        .with_crosslinking(CrosslinkingParams::default().with_linker(linker))
}

pub fn sim_config(ranks: usize, steps: u64) -> SimulationConfig {
    SimulationConfig::default()
        .with_ranks(ranks)
        .with_steps(steps)
        .with_exchange(ExchangeConfig::fast())
}

/// Grid and slabs over the scene box with bins of `bin_size`.
pub fn decompose(scene: &Scene, ranks: usize, bin_size: f64) -> (BinGrid, SlabDecomposition) {
    let grid = match BinGrid::new(scene.lower(), scene.upper() - scene.lower(), bin_size) {
        Ok(grid) => grid,
        Err(e) => panic!("grid over the scene: {e}"),
    };
    let slabs = SlabDecomposition::new(&grid, ranks, bin_size + scene.max_beam_half_extent());
    (grid, slabs)
}

/// Two parallel filaments along x, `gap` apart in y, with linkers on the
/// midline between them.
pub fn ladder(length: f64, elements: usize, gap: f64, linkers: usize) -> Scene {
    let extent = DVec3::new(length + 0.2, 1.0, 1.0);
    let mut scene = Scene::new(DVec3::ZERO, extent);
    let y0 = 0.5 - 0.5 * gap;
    let y1 = 0.5 + 0.5 * gap;
    scene.add_filament(
        DVec3::new(0.1, y0, 0.5),
        DVec3::new(0.1 + length, y0, 0.5),
        elements,
        0.01,
        FilamentType::Actin,
        2,
    );
    scene.add_filament(
        DVec3::new(0.1, y1, 0.5),
        DVec3::new(0.1 + length, y1, 0.5),
        elements,
        0.01,
        FilamentType::Actin,
        2,
    );
    for k in 0..linkers {
        let x = 0.1 + length * (k as f64 + 0.5) / linkers as f64;
        scene.add_crosslinker(DVec3::new(x, 0.5, 0.5), LinkerType::Arbitrary);
    }
    scene
}
