//! Linkage simulation runner
//!
//! Runs a random filament network on threaded ranks and prints the event
//! log as JSON lines.
//!
//! Usage: `linkage-sim [ranks] [steps] [params.json]`

use std::env;
use std::fs;

use glam::DVec3;
use linkage_interaction::{CrosslinkingParams, InteractionParams, LinkerParams, LinkerType};
use linkage_sim::{Scene, Simulation, SimulationConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkage=info,linkage_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    let ranks: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(3);
    let steps: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let params = match args.get(3) {
        Some(path) => InteractionParams::from_json(&fs::read_to_string(path)?)?,
        None => InteractionParams::default()
            .with_dt(0.01)
            .with_output_interval(5)
            .with_crosslinking(
                CrosslinkingParams::default().with_linker(
                    LinkerParams::default()
                        .with_rates(20.0, 1.0)
                        .with_linking_length(0.05, 0.2)
                        .with_angle(0.0, std::f64::consts::FRAC_PI_2),
                ),
            ),
    };

    let scene = Scene::random_network(DVec3::splat(2.0), 7, 8, 4, 40, LinkerType::Arbitrary);
    tracing::info!(ranks, steps, entities = scene.len(), "starting run");

    let config = SimulationConfig::default().with_ranks(ranks).with_steps(steps);
    let outcome = Simulation::new(scene, params, config).run()?;
    for event in &outcome.events {
        println!("{}", event.to_json_line()?);
    }
    tracing::info!(bonds = outcome.bonds.len(), last_step = outcome.last_step, "run finished");
    Ok(())
}
