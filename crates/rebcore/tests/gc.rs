//! Integration coverage for the embedding-level GC surface (spec §4.6, §8
//! scenario 6): `Engine::recycle` run back to back is idempotent once
//! nothing new is garbage.

use pretty_assertions::assert_eq as pretty_assert_eq;
use rebcore::api::Engine;
use rebcore::arena::StubPoolStats;
use rebcore::resource::NoLimitTracker;
use rebcore::tracer::NoopTracer;
use rebcore::{Array, Cell, Flavor};

type E = Engine<NoLimitTracker, NoopTracer>;

#[test]
fn recycle_recycle_reclaims_nothing_the_second_time() {
    let mut engine: E = Engine::default();

    // Produce garbage: the source program array (unreachable the moment
    // `reb_value` finishes evaluating it -- only its *result* gets guarded,
    // not the array itself) and a second array that was never guarded at all.
    let held = {
        let w = engine.world_mut();
        let id = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(1)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(id);
        id
    };
    let handle = engine.reb_value(held).unwrap();
    engine.reb_release(handle).unwrap();

    {
        let w = engine.world_mut();
        let orphan = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(2)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(orphan);
    }

    let first = engine.recycle();
    assert_eq!(first, 2, "both the released handle and the orphan array are unreachable");

    let before_second: StubPoolStats = engine.heap_stats();
    let second = engine.recycle();
    assert_eq!(second, 0, "a recycle immediately after another must find nothing new to free");
    let after_second: StubPoolStats = engine.heap_stats();
    pretty_assert_eq!(before_second, after_second, "a no-op recycle must not change pool occupancy at all");
}

#[test]
fn array_reachable_only_through_a_guarded_handle_survives_recycle() {
    let mut engine: E = Engine::default();
    // `inner` is what the guarded handle will end up referencing (through the
    // block cell it evaluates to); `program` is the throwaway source array,
    // unreachable as soon as evaluation finishes.
    let program = {
        let w = engine.world_mut();
        let inner = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(9)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(inner);
        let program = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::block(inner, 0, rebcore::Sigil::Plain)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(program);
        program
    };

    let handle = engine.reb_value(program).unwrap();
    let freed = engine.recycle();
    assert_eq!(freed, 1, "the source array is garbage once evaluated, but `inner` is rooted by the guarded block handle");

    let freed_again = engine.recycle();
    assert_eq!(freed_again, 0, "nothing new became garbage between the two cycles");

    engine.reb_release(handle).unwrap();
    let freed_after_release = engine.recycle();
    assert_eq!(freed_after_release, 1, "`inner` becomes unreachable once its only guarding handle is released");
}
