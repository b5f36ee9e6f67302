//! Integration coverage for the parse dialect (spec §5 "Parse engine"):
//! literal matching, `some` repetition, and set-word span capture, driven
//! directly through `parse::parse3` against a `World`.

use rebcore::arena::StubId;
use rebcore::array::{Array, Flavor};
use rebcore::cell::{Cell, Sigil};
use rebcore::context::{Context, ContextKind};
use rebcore::parse::parse3;
use rebcore::resource::{GcConfig, NoLimitTracker};
use rebcore::tracer::NoopTracer;
use rebcore::trampoline::World;

type W = World<NoLimitTracker, NoopTracer>;

fn world() -> W {
    World::new(NoLimitTracker::default(), NoopTracer::default(), GcConfig::default())
}

fn array(world: &mut W, cells: Vec<Cell>) -> StubId {
    let id = world.arrays.allocate(Array::from_cells(Flavor::PlainList, cells), &mut world.tracker).unwrap();
    world.arrays.make_managed(id);
    id
}

fn parse_succeeded(cell: &Cell) -> bool {
    !matches!(cell.heart, rebcore::cell::Heart::Trash)
}

#[test]
fn literal_sequence_matches_fully() {
    let mut w = world();
    let input = array(&mut w, vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)]);
    let rules = array(&mut w, vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)]);
    let result = parse3(&mut w, input, rules, false, false, true).unwrap();
    assert!(parse_succeeded(&result), "a fully consumed literal sequence parses successfully");
}

#[test]
fn mismatched_literal_fails() {
    let mut w = world();
    let input = array(&mut w, vec![Cell::integer(1), Cell::integer(9)]);
    let rules = array(&mut w, vec![Cell::integer(1), Cell::integer(2)]);
    let result = parse3(&mut w, input, rules, true, false, true).unwrap();
    assert!(!parse_succeeded(&result), "a literal mismatch fails the parse");
}

#[test]
fn some_repeats_a_clause_at_least_once() {
    let mut w = world();
    let input = array(&mut w, vec![Cell::integer(1), Cell::integer(1), Cell::integer(1)]);
    let sym = w.interns.intern("some");
    let some_kw = Cell::word(sym, Sigil::Plain);
    let rules = array(&mut w, vec![some_kw, Cell::integer(1)]);
    let result = parse3(&mut w, input, rules, false, false, true).unwrap();
    assert!(parse_succeeded(&result), "`some` consumes every repeated literal match");
}

#[test]
fn set_word_captures_the_matched_span() {
    let mut w = world();
    let input = array(&mut w, vec![Cell::integer(7), Cell::integer(8)]);

    let root_varlist = world_root_varlist(&mut w);
    let capture_sym = w.interns.intern("captured");
    let mut set_word = Cell::word(capture_sym, Sigil::Set);
    set_word.binding = Some(root_varlist);

    let some_sym = w.interns.intern("some");
    let some_kw = Cell::word(some_sym, Sigil::Plain);
    let rules = array(&mut w, vec![set_word, some_kw, Cell::integer(7), Cell::integer(8)]);
    let _ = parse3(&mut w, input, rules, true, false, true).unwrap();

    let ctx = Context::from_varlist(root_varlist, ContextKind::Object, &w.arrays);
    let idx = ctx.find(capture_sym, &w.arrays).expect("parse binds `captured` into the root context");
    let captured = ctx.get(idx, &w.arrays);
    assert!(matches!(captured.heart, rebcore::cell::Heart::Block(_)), "the set-word captures a block span, not a scalar");
}

fn world_root_varlist(w: &mut W) -> StubId {
    let ctx = rebcore::trampoline::new_module(w).unwrap();
    ctx.varlist
}
