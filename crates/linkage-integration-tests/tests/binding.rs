//! Bind decisions across ranks: one grant per contended linker, at most
//! one bond per spot, and bond sets that do not depend on the rank count.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use linkage_binning::EntityId;
use linkage_comm::{Communicator, Rank};
use linkage_consensus::{resolve, select_winner, ArbitrationKey, BindingSpot, Proposal, Verdict};
use linkage_integration_tests::{ladder, linker_params, network_params, on_ranks, sim_config};
use linkage_interaction::{FilamentType, LinkerType};
use linkage_sim::{Scene, Simulation};
use proptest::prelude::*;

/// Two beams in different slabs of a two-rank run, one linker in reach
/// of all four of their spots.
fn contended_linker() -> Scene {
    let mut scene = Scene::new(DVec3::ZERO, DVec3::new(2.4, 1.0, 1.0));
    scene.add_beam(DVec3::new(1.1, 0.3, 0.5), DVec3::new(1.1, 0.7, 0.5), 0.01, FilamentType::Actin, 2);
    scene.add_beam(DVec3::new(1.3, 0.3, 0.5), DVec3::new(1.3, 0.7, 0.5), 0.01, FilamentType::Actin, 2);
    scene.add_crosslinker(DVec3::new(1.25, 0.5, 0.5), LinkerType::Arbitrary);
    scene
}

#[test]
fn contended_linker_gets_one_grant() {
    let params = network_params(5, linker_params(1.0e9, 0.0, (0.1, 0.6)));
    for ranks in [1, 2] {
        let outcome = Simulation::new(contended_linker(), params.clone(), sim_config(ranks, 1))
            .run()
            .unwrap();
        assert_eq!(outcome.granted(), 1, "{ranks} ranks");
        assert_eq!(outcome.bonds.len(), 1);
        assert_eq!(outcome.bonds[0].1, EntityId(3));
    }
}

#[test]
fn contended_linker_picks_the_same_spot_on_any_rank_count() {
    let params = network_params(5, linker_params(1.0e9, 0.0, (0.1, 0.6)));
    let one = Simulation::new(contended_linker(), params.clone(), sim_config(1, 1)).run().unwrap();
    let two = Simulation::new(contended_linker(), params, sim_config(2, 1)).run().unwrap();
    assert_eq!(one.bonds, two.bonds);
}

#[test]
fn second_bond_closes_the_link_to_the_other_beam() {
    let params = network_params(5, linker_params(1.0e9, 0.0, (0.1, 0.6)));
    let outcome = Simulation::new(contended_linker(), params, sim_config(2, 2)).run().unwrap();
    let elements: BTreeSet<EntityId> = outcome.bonds.iter().map(|(spot, _)| spot.element).collect();
    assert_eq!(elements, BTreeSet::from([EntityId(1), EntityId(2)]));
    let links: usize = outcome
        .events
        .iter()
        .filter(|e| e.step() == 2)
        .map(|e| match e {
            linkage_sim::SimEvent::StepCompleted { report, .. } => report.links,
            linkage_sim::SimEvent::Frame { .. } => 0,
        })
        .sum();
    assert_eq!(links, 1);
}

fn assert_bond_invariants(bonds: &[(BindingSpot, EntityId)]) {
    let spots: BTreeSet<BindingSpot> = bonds.iter().map(|(spot, _)| *spot).collect();
    assert_eq!(spots.len(), bonds.len(), "a spot holds two linkers");

    let mut per_linker: BTreeMap<EntityId, Vec<BindingSpot>> = BTreeMap::new();
    for (spot, linker) in bonds {
        per_linker.entry(*linker).or_default().push(*spot);
    }
    for (linker, spots) in per_linker {
        assert!(spots.len() <= 2, "{linker} has {} bonds", spots.len());
        if let [a, b] = spots.as_slice() {
            assert_ne!(a.element, b.element, "{linker} bonded twice to one element");
        }
    }
}

#[test]
fn ladder_bonds_do_not_depend_on_rank_count() {
    let scene = ladder(2.0, 8, 0.2, 24);
    let params = network_params(17, linker_params(40.0, 2.0, (0.05, 0.4)));
    let runs: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|ranks| Simulation::new(scene.clone(), params.clone(), sim_config(ranks, 8)).run().unwrap())
        .collect();
    assert!(!runs[0].bonds.is_empty());
    for run in &runs {
        assert_bond_invariants(&run.bonds);
        assert_eq!(run.bonds, runs[0].bonds);
        assert_eq!(run.scene, runs[0].scene);
    }
}

#[test]
fn random_network_bonds_do_not_depend_on_rank_count() {
    let scene = Scene::random_network(DVec3::new(3.0, 1.5, 1.5), 23, 14, 4, 80, LinkerType::Arbitrary);
    let mut params = network_params(29, linker_params(30.0, 1.0, (0.05, 0.3)));
    if let Some(xl) = params.crosslinking.as_mut() {
        xl.diffusion = 0.01;
    }
    let one = Simulation::new(scene.clone(), params.clone(), sim_config(1, 6)).run().unwrap();
    let three = Simulation::new(scene, params, sim_config(3, 6)).run().unwrap();
    assert_bond_invariants(&one.bonds);
    assert_eq!(one.bonds, three.bonds);
    assert_eq!(one.scene, three.scene);
}

#[test]
fn without_unbinding_every_grant_is_a_bond() {
    let scene = ladder(1.6, 6, 0.2, 12);
    let params = network_params(3, linker_params(25.0, 0.0, (0.05, 0.4)));
    let outcome = Simulation::new(scene, params, sim_config(2, 10)).run().unwrap();
    assert_eq!(outcome.granted(), outcome.bonds.len());
}

#[test]
fn typed_linker_ignores_other_filaments() {
    let mut scene = Scene::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 1.0));
    scene.add_beam(DVec3::new(0.5, 0.3, 0.5), DVec3::new(0.5, 0.7, 0.5), 0.01, FilamentType::Collagen, 2);
    scene.add_crosslinker(DVec3::new(0.55, 0.5, 0.5), LinkerType::Actin);
    let linker = linker_params(1.0e9, 0.0, (0.1, 0.6)).with_linker(LinkerType::Actin);
    let outcome = Simulation::new(scene, network_params(1, linker), sim_config(1, 3)).run().unwrap();
    assert!(outcome.bonds.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Wherever the contenders live, the owner grants the same one.
    #[test]
    fn arbitration_ignores_proposer_placement(
        elements in prop::collection::btree_set(1u64..500, 1..6),
        placement in prop::collection::vec(0u32..3, 6),
        step in 0u64..1000,
    ) {
        let target = EntityId(9000);
        let contenders: Vec<(BindingSpot, Rank)> = elements
            .iter()
            .zip(&placement)
            .map(|(e, r)| (BindingSpot::new(EntityId(*e), 0), Rank(*r)))
            .collect();
        let spots: Vec<BindingSpot> = contenders.iter().map(|(s, _)| *s).collect();
        let expected = select_winner(ArbitrationKey::new(target, step), &spots);

        let grants = on_ranks(3, |comm| {
            let me = comm.rank();
            let proposals: Vec<Proposal<()>> = contenders
                .iter()
                .filter(|(_, proposer)| *proposer == me)
                .map(|(spot, proposer)| Proposal {
                    target,
                    target_owner: Rank(1),
                    contender: *spot,
                    proposer: *proposer,
                    payload: (),
                })
                .collect();
            let admit_all = |_: &Proposal<()>| true;
            let out = resolve(&comm, step, proposals, &admit_all).unwrap();
            out.own_decisions
                .into_iter()
                .filter(|d| d.verdict == Verdict::Granted)
                .map(|d| d.proposal.contender)
                .collect::<Vec<_>>()
        });
        let granted: Vec<BindingSpot> = grants.into_iter().flatten().collect();
        prop_assert_eq!(granted.len(), 1);
        prop_assert_eq!(Some(granted[0]), expected);
    }
}
