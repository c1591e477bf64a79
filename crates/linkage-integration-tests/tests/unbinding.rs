//! Force-dependent unbinding.

use linkage_consensus::rates::{bell_off_rate, bell_unbinding_probability, unbinding_probability};
use linkage_integration_tests::{ladder, linker_params, network_params, sim_config};
use linkage_interaction::RestartChunk;
use linkage_sim::Simulation;
use proptest::prelude::*;

const KT: f64 = 4.04e-3;

#[test]
fn unloaded_bell_bond_releases_like_a_single_bond() {
    for k_off0 in [0.0, 0.1, 2.0, 50.0] {
        let plain = unbinding_probability(k_off0, 0.01);
        let bell = bell_unbinding_probability(k_off0, 0.0, 2.0e-3, KT, 0.01);
        assert_eq!(plain, bell);
    }
}

#[test]
fn load_speeds_release() {
    let at = |force: f64| bell_unbinding_probability(1.0, force, 1.0e-3, KT, 0.01);
    assert!(at(2.0) > at(0.0));
    assert!(at(4.0) > at(2.0));
    let rate = bell_off_rate(1.0, KT / 1.0e-3, 1.0e-3, KT);
    assert!((rate - std::f64::consts::E).abs() < 1e-12);
}

proptest! {
    #[test]
    fn bell_probability_is_a_probability(
        k in 0.0f64..100.0,
        force in 0.0f64..10.0,
        x_beta in 0.0f64..1.0e-3,
        dt in 1.0e-4f64..0.1,
    ) {
        let p = bell_unbinding_probability(k, force, x_beta, KT, dt);
        prop_assert!((0.0..=1.0).contains(&p));
    }
}

/// With certain binding and certain release every bond lives exactly one
/// step: the bond of the previous step always fires, the new one never.
#[test]
fn bonds_never_outlive_the_step_after_they_form() {
    let scene = ladder(1.6, 6, 0.2, 12);
    let params = network_params(8, linker_params(1.0e9, 1.0e9, (0.05, 0.4)));
    let outcome = Simulation::new(scene, params, sim_config(2, 4)).run().unwrap();
    assert!(!outcome.bonds.is_empty());

    for bytes in &outcome.restart {
        let chunk = RestartChunk::decode(bytes).unwrap();
        for record in &chunk.crosslinkers {
            for (spot, step) in record.bonded_spots.iter().zip(record.step_bound) {
                if spot.is_some() {
                    assert_eq!(step, 4, "{} keeps a bond of step {step}", record.crosslinker);
                }
            }
        }
    }
}

#[test]
fn without_release_rate_bonds_persist() {
    let scene = ladder(1.6, 6, 0.2, 12);
    let params = network_params(8, linker_params(1.0e9, 0.0, (0.05, 0.4)));
    let outcome = Simulation::new(scene, params, sim_config(2, 4)).run().unwrap();
    let oldest = outcome
        .restart
        .iter()
        .flat_map(|b| RestartChunk::decode(b).unwrap().crosslinkers)
        .flat_map(|r| r.bonded_spots.into_iter().zip(r.step_bound))
        .filter_map(|(spot, step)| spot.map(|_| step))
        .min();
    assert_eq!(oldest, Some(1));
}
