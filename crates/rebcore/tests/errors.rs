//! Integration coverage for the embedding-boundary error surface (spec §7,
//! §6): a raised error's kebab-case `ErrKind` name shows up in the
//! `EmbedError` text a caller actually sees.

use rebcore::api::Engine;
use rebcore::cell::Sigil;
use rebcore::resource::NoLimitTracker;
use rebcore::tracer::NoopTracer;
use rebcore::{Array, Cell, Flavor};

type E = Engine<NoLimitTracker, NoopTracer>;

#[test]
fn evaluating_an_unbound_word_reports_not_bound() {
    let mut engine: E = Engine::default();
    let word = {
        let w = engine.world_mut();
        let sym = w.interns.intern("undefined-name");
        Cell::word(sym, Sigil::Plain)
    };
    let program = {
        let w = engine.world_mut();
        let id = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [word]), &mut w.tracker).unwrap();
        w.arrays.make_managed(id);
        id
    };
    let err = engine.reb_value(program).expect_err("an unbound word cannot evaluate");
    assert!(err.to_string().contains("not-bound"), "error text was: {err}");
}

#[test]
fn reb_release_out_of_order_reports_bad_parameter() {
    let mut engine: E = Engine::default();
    let (a, b) = {
        let w = engine.world_mut();
        let a = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(1)]), &mut w.tracker).unwrap();
        let b = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(2)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(a);
        w.arrays.make_managed(b);
        (a, b)
    };
    let h1 = engine.reb_value(a).unwrap();
    let _h2 = engine.reb_value(b).unwrap();
    let err = engine.reb_release(h1).expect_err("h1 is not the top of the guard stack");
    assert!(err.to_string().contains("bad-parameter"), "error text was: {err}");
}
