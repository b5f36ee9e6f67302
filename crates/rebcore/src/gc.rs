//! Mark-and-sweep collection (spec §4.6 "Garbage Collector"): a worklist-driven
//! mark pass over every root the trampoline and the engine's global state can
//! reach, followed by one `Arena::sweep` pass.
//!
//! Grounded on `heap.rs`'s refcount-free mark/sweep variant the teacher keeps
//! behind a feature flag for cycle collection — this engine always runs that
//! path (spec §4.6 calls for tracing GC outright, not refcounting), so the
//! worklist shape here is that variant generalized to run unconditionally.

use crate::arena::StubId;
use crate::array::Array;
use crate::cell::{Cell, Payload};
use crate::context::Context;
use crate::level::{Level, LevelScratch};
use crate::resource::ResourceTracker;
use crate::tracer::LevelTracer;
use crate::trampoline::World;

/// Runs one full mark-and-sweep cycle over `stack` plus every global root on
/// `world`, returning the number of stubs reclaimed. Guarded against
/// reentrancy (spec §4.6 "GC is not allowed to spawn GC"): nested allocation
/// during a cycle cannot happen since marking never allocates, but the guard
/// still documents the invariant for anyone adding a marking step that might.
pub fn collect<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &[Level]) -> usize {
    static COLLECTING: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
    if COLLECTING.swap(true, std::sync::atomic::Ordering::SeqCst) {
        debug_assert!(false, "gc::collect re-entered during its own mark pass");
        return 0;
    }

    world.arrays.clear_marks();
    world.interns.clear_marks();

    let mut worklist: Vec<StubId> = Vec::new();

    for level in stack {
        mark_level(&mut worklist, level);
    }
    for cell in &world.data_stack {
        mark_cell(&mut worklist, cell);
    }
    for cell in &world.guarded {
        mark_cell(&mut worklist, cell);
    }
    for ctx in &world.modules {
        mark_context(&mut worklist, ctx);
    }

    drain_worklist(world, &mut worklist);

    // Module iteration (spec §4.6): a symbol's hitch ring can reach a patch
    // whose context was marked only by a later root, so keep walking symbols
    // until a full pass adds no new marks.
    loop {
        let mut added = false;
        for ctx in &world.modules {
            for cell in &world.arrays.get(ctx.keylist).cells[1..] {
                let Some(sym) = cell.symbol else { continue };
                if world.interns.mark(sym) {
                    added = true;
                }
                if let Some(patch) = world.interns.hitch_head(sym) {
                    worklist.push(patch);
                }
            }
        }
        drain_worklist(world, &mut worklist);
        if !added {
            break;
        }
    }

    let freed = world.arrays.sweep(&mut world.tracker);
    COLLECTING.store(false, std::sync::atomic::Ordering::SeqCst);
    freed
}

fn drain_worklist<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, worklist: &mut Vec<StubId>) {
    while let Some(id) = worklist.pop() {
        if !world.arrays.mark(id) {
            continue;
        }
        let (bonus, link, misc, cells) = {
            let array = world.arrays.get(id);
            (array.bonus, array.link, array.misc, array.cells.clone())
        };
        if let Some(bonus) = bonus {
            worklist.push(bonus);
        }
        if let Some(link) = link {
            worklist.push(link);
        }
        if let Some(misc) = misc {
            worklist.push(misc);
        }
        for cell in &cells {
            mark_cell(worklist, cell);
        }
    }
}

/// Every root a live level contributes (spec §4.6's root-set bullet: "feed
/// singular..., feed temp cells, level spare/scratch, output cell, label
/// symbol, varlist, partially-fulfilled arguments").
fn mark_level(worklist: &mut Vec<StubId>, level: &Level) {
    worklist.push(level.feed.array());
    if let Some(lookback) = level.feed.lookback() {
        mark_cell(worklist, lookback);
    }
    mark_cell(worklist, &level.out);
    mark_cell(worklist, &level.spare);
    mark_cell(worklist, &level.scratch_cell);
    if let Some(ctx) = &level.varlist {
        mark_context(worklist, ctx);
    }
    match &level.scratch {
        LevelScratch::None => {}
        LevelScratch::Stepper(pending) => {
            if let Some(target) = &pending.target {
                worklist.push(target.binding);
            }
        }
        LevelScratch::Action(action) => {
            let (paramlist, args) = action.gc_roots();
            worklist.push(paramlist);
            for arg in args {
                mark_cell(worklist, arg);
            }
        }
        LevelScratch::Evaluator(evaluator) => {
            if let Some(primed) = &evaluator.primed {
                mark_cell(worklist, primed);
            }
        }
        LevelScratch::Parse(parse) => {
            worklist.push(parse.input_array);
            worklist.push(parse.rules_array);
        }
    }
}

fn mark_context(worklist: &mut Vec<StubId>, ctx: &Context) {
    worklist.push(ctx.keylist);
    worklist.push(ctx.varlist);
}

/// Marks the arrays/bindings a single cell reaches (spec §4.6's cell-marking
/// rules): skip past the quote/antiform ladder and mark on underlying kind,
/// follow a bound word's cached binding, and follow any node-carrying payload
/// (`Series`, `Action`).
fn mark_cell(worklist: &mut Vec<StubId>, cell: &Cell) {
    if let Some(binding) = cell.binding {
        worklist.push(binding);
    }
    match &cell.payload {
        Payload::Series { array, .. } => worklist.push(*array),
        Payload::Action { paramlist, .. } => worklist.push(*paramlist),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Flavor;
    use crate::cell::Sigil;
    use crate::feed::Feed;
    use crate::level::ExecutorKind;
    use crate::resource::NoLimitTracker;
    use crate::tracer::NoopTracer;

    fn world() -> World<NoLimitTracker, NoopTracer> {
        World::default()
    }

    #[test]
    fn unreachable_array_is_swept() {
        let mut w = world();
        let orphan = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(1)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(orphan);
        let freed = collect(&mut w, &[]);
        assert_eq!(freed, 1);
    }

    #[test]
    fn array_reachable_from_level_feed_survives() {
        let mut w = world();
        let kept = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(1)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(kept);
        let level = Level::new(Feed::new(kept), ExecutorKind::Evaluator);
        let freed = collect(&mut w, std::slice::from_ref(&level));
        assert_eq!(freed, 0);
        assert_eq!(w.arrays.live_count(), 1);
    }

    #[test]
    fn array_reachable_only_through_nested_block_cell_survives() {
        let mut w = world();
        let inner = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(2)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(inner);
        let outer = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::block(inner, 0, Sigil::Plain)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(outer);
        let level = Level::new(Feed::new(outer), ExecutorKind::Evaluator);
        let freed = collect(&mut w, std::slice::from_ref(&level));
        assert_eq!(freed, 0);
        assert_eq!(w.arrays.live_count(), 2);
    }

    #[test]
    fn second_cycle_with_no_remark_reclaims_previously_rooted_array() {
        let mut w = world();
        let id = w.arrays.allocate(Array::from_cells(Flavor::PlainList, [Cell::integer(1)]), &mut w.tracker).unwrap();
        w.arrays.make_managed(id);
        let level = Level::new(Feed::new(id), ExecutorKind::Evaluator);
        assert_eq!(collect(&mut w, std::slice::from_ref(&level)), 0);
        assert_eq!(collect(&mut w, &[]), 1, "dropping the rooting level lets the next cycle reclaim it");
    }
}
