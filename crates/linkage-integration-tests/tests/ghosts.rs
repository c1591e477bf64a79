//! Every copy of a crosslinker or beam binding state agrees with its
//! owner's copy after each committed step.

use std::collections::BTreeMap;

use linkage_binning::EntityId;
use linkage_comm::{Communicator, Rank};
use linkage_integration_tests::{decompose, ladder, linker_params, network_params, on_ranks};
use linkage_interaction::{BeamBindingState, CollectingAssembler, CrosslinkerState, InteractionManager};
use linkage_sim::bin_entities;

struct Snapshot {
    rank: Rank,
    rows: Vec<EntityId>,
    linkers: Vec<CrosslinkerState>,
    beams: Vec<BeamBindingState>,
}

fn snapshots(ranks: usize, steps: u64) -> Vec<Vec<Snapshot>> {
    let scene = ladder(2.0, 8, 0.2, 20);
    let mut params = network_params(41, linker_params(60.0, 5.0, (0.05, 0.4)));
    if let Some(xl) = params.crosslinking.as_mut() {
        xl.diffusion = 0.005;
    }
    let (grid, slabs) = decompose(&scene, ranks, 0.4);

    on_ranks(ranks, |comm| {
        let me = comm.rank();
        let table = slabs.table_for(me, &scene);
        let mut manager = InteractionManager::new(comm, params.clone())
            .unwrap()
            .with_domain(scene.lower(), scene.upper());
        manager.setup(&table).unwrap();

        let mut per_step = Vec::new();
        for step in 1..=steps {
            let index = bin_entities(&grid, &table).unwrap();
            manager.update_step_element(&table, &index, step).unwrap();
            manager.reset(&table).unwrap();
            manager.evaluate_force(&table, &mut CollectingAssembler::new()).unwrap();
            manager.update_step_state(&table, step).unwrap();

            let xl = manager.crosslinking().unwrap();
            per_step.push(Snapshot {
                rank: me,
                rows: table.row().map(|e| e.id).collect(),
                linkers: xl.linkers().cloned().collect(),
                beams: xl.beams().cloned().collect(),
            });
        }
        per_step
    })
}

#[test]
fn ghost_copies_match_their_owner_after_every_step() {
    let steps = 6;
    let by_rank = snapshots(3, steps);
    let mut bonded = 0;

    for step in 0..steps as usize {
        let mut owner_linkers: BTreeMap<EntityId, &CrosslinkerState> = BTreeMap::new();
        let mut owner_beams: BTreeMap<EntityId, &BeamBindingState> = BTreeMap::new();
        for snapshot in by_rank.iter().map(|r| &r[step]) {
            for linker in snapshot.linkers.iter().filter(|l| snapshot.rows.contains(&l.id)) {
                assert!(owner_linkers.insert(linker.id, linker).is_none(), "two owners of {}", linker.id);
            }
            for beam in snapshot.beams.iter().filter(|b| snapshot.rows.contains(&b.id)) {
                assert!(owner_beams.insert(beam.id, beam).is_none(), "two owners of {}", beam.id);
            }
        }

        for snapshot in by_rank.iter().map(|r| &r[step]) {
            for linker in &snapshot.linkers {
                assert_eq!(
                    Some(&linker),
                    owner_linkers.get(&linker.id),
                    "{} differs on {} at step {}",
                    linker.id,
                    snapshot.rank,
                    step + 1
                );
            }
            for beam in &snapshot.beams {
                assert_eq!(Some(&beam), owner_beams.get(&beam.id), "{} differs on {}", beam.id, snapshot.rank);
            }
        }
        bonded = owner_linkers.values().map(|l| l.bond_count()).sum::<usize>();
    }
    assert!(bonded > 0);
}

#[test]
fn single_rank_holds_every_state_as_owner() {
    let by_rank = snapshots(1, 2);
    let last = &by_rank[0][1];
    assert_eq!(last.linkers.len(), 20);
    assert_eq!(last.beams.len(), 16);
    assert!(last.linkers.iter().all(|l| last.rows.contains(&l.id)));
}
