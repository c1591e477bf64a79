//! Beam contact across ranks: every pair is evaluated exactly once, and
//! separated beams never push.

use glam::DVec3;
use linkage_integration_tests::sim_config;
use linkage_interaction::{BeamContactParams, EnergyType, FilamentType, InteractionParams};
use linkage_sim::{RunOutcome, Scene, SimEvent, Simulation};

fn contact_params() -> InteractionParams {
    InteractionParams::default().with_contact(BeamContactParams::default().with_penalty(100.0))
}

/// Filaments along x crossed by single beams along y lying `lift` above
/// them. The crossings sit near element midpoints.
fn mesh(lift: f64) -> Scene {
    let mut scene = Scene::new(DVec3::ZERO, DVec3::new(2.4, 1.2, 1.0));
    for k in 0..5 {
        let y = 0.2 + 0.2 * k as f64;
        scene.add_filament(
            DVec3::new(0.1, y, 0.5),
            DVec3::new(2.3, y, 0.5),
            6,
            0.01,
            FilamentType::Actin,
            0,
        );
    }
    for x in [0.28, 0.65, 1.02, 1.38, 1.75] {
        scene.add_beam(
            DVec3::new(x, 0.1, 0.5 + lift),
            DVec3::new(x, 1.1, 0.5 + lift),
            0.01,
            FilamentType::Actin,
            0,
        );
    }
    scene
}

fn active_contacts(outcome: &RunOutcome, step: u64) -> usize {
    outcome
        .events
        .iter()
        .filter(|e| e.step() == step)
        .map(|e| match e {
            SimEvent::StepCompleted { report, .. } => report.active_contacts,
            SimEvent::Frame { .. } => 0,
        })
        .sum()
}

#[test]
fn separated_beams_stay_inactive_on_every_rank() {
    let outcome = Simulation::new(mesh(0.05), contact_params(), sim_config(3, 2)).run().unwrap();
    assert_eq!(active_contacts(&outcome, 1), 0);
    assert_eq!(outcome.energy_at(1).unwrap()[&EnergyType::BeamContactPenalty], 0.0);
}

#[test]
fn each_crossing_is_counted_once() {
    let runs: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|ranks| Simulation::new(mesh(0.015), contact_params(), sim_config(ranks, 1)).run().unwrap())
        .collect();

    // 5 x 5 crossings, none on an element boundary
    assert_eq!(active_contacts(&runs[0], 1), 25);
    let energy = runs[0].energy_at(1).unwrap()[&EnergyType::BeamContactPenalty];
    // gap -0.005 at each crossing
    assert!((energy - 25.0 * 0.5 * 100.0 * 0.005 * 0.005).abs() < 1e-12);

    for run in &runs[1..] {
        assert_eq!(active_contacts(run, 1), 25);
        let e = run.energy_at(1).unwrap()[&EnergyType::BeamContactPenalty];
        assert!((e - energy).abs() < 1e-12 * energy.max(1.0));
    }
}

#[test]
fn frames_list_every_active_contact_once() {
    let params = contact_params().with_output_interval(1);
    let outcome = Simulation::new(mesh(0.015), params, sim_config(2, 1)).run().unwrap();
    let points: usize = outcome
        .events
        .iter()
        .map(|e| match e {
            SimEvent::Frame { frame } => frame.contact_points.len(),
            SimEvent::StepCompleted { .. } => 0,
        })
        .sum();
    assert_eq!(points, 25);
}
