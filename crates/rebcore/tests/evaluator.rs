//! Integration coverage for whole-array evaluation (spec §4.5 "ghost
//! preservation"): a trailing invisible result never clobbers the last real
//! value, and an all-invisible program evaluates to a trash antiform.

use rebcore::api::Engine;
use rebcore::resource::NoLimitTracker;
use rebcore::tracer::NoopTracer;
use rebcore::{Array, Cell, Flavor};

type E = Engine<NoLimitTracker, NoopTracer>;

fn run_and_unbox_int(engine: &mut E, cells: Vec<Cell>) -> i64 {
    let w = engine.world_mut();
    let id = w.arrays.allocate(Array::from_cells(Flavor::PlainList, cells), &mut w.tracker).unwrap();
    w.arrays.make_managed(id);
    let handle = engine.reb_value(id).unwrap();
    let v = engine.reb_unbox_integer(handle).unwrap();
    engine.reb_release(handle).unwrap();
    v
}

#[test]
fn trailing_comma_preserves_the_last_real_value() {
    let mut engine: E = Engine::default();
    let result = run_and_unbox_int(&mut engine, vec![Cell::integer(5), Cell::comma()]);
    assert_eq!(result, 5);
}

#[test]
fn multiple_trailing_commas_still_preserve_the_last_real_value() {
    let mut engine: E = Engine::default();
    let result = run_and_unbox_int(&mut engine, vec![Cell::integer(3), Cell::comma(), Cell::comma()]);
    assert_eq!(result, 3);
}

#[test]
fn a_bare_comma_alone_evaluates_to_trash() {
    let mut engine: E = Engine::default();
    let w = engine.world_mut();
    let id = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::comma()]), &mut w.tracker).unwrap();
    w.arrays.make_managed(id);
    let handle = engine.reb_value(id).unwrap();
    assert!(engine.reb_unbox_integer(handle).is_err(), "a lone comma's result is trash, not an integer");
    engine.reb_release(handle).unwrap();
}
