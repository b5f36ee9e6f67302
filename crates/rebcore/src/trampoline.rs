//! The trampoline: the single non-recursive loop that drives every level on
//! the level stack to completion (spec §4.2 "Trampoline & Level Stack").
//!
//! Grounded on `bytecode/vm/mod.rs`'s main run loop — each iteration there
//! pops one bytecode instruction and reacts to the frame's `CallResult`,
//! reloading cached state (`reload_cache!`) after a nested call returns and
//! using `try_catch_sync!` to let a raised Python exception unwind to the
//! nearest handler frame. This module plays the same role one level higher:
//! each iteration dispatches the *entire* top level via its [`ExecutorKind`]
//! and reacts to the returned [`Bounce`].

use crate::arena::{Arena, StubId};
use crate::array::Array;
use crate::cell::Cell;
use crate::context::{Context, ContextKind};
use crate::error::{RaisedError, ThrowLabel, Thrown};
use crate::executors;
use crate::level::{Bounce, ExecutorKind, Level};
use crate::resource::{GcConfig, ResourceError, ResourceTracker};
use crate::symbol::Interns;
use crate::tracer::LevelTracer;

/// All engine-wide mutable state a dispatch needs: the stub pool, the symbol
/// table, the resource tracker, the tracer, GC configuration, and the two
/// global root sets the garbage collector must enumerate alongside the level
/// stack (spec §4.6 "root set"): the evaluator's data stack (pushed
/// refinement words) and the guarded-node stack (API handles pinned against
/// collection).
///
/// Generic over `R`/`T` the way the teacher's `VM` is generic over its
/// resource tracker and tracer, so an embedder that never configures limits
/// or tracing pays nothing for either (spec §9's zero-cost design note).
pub struct World<R: ResourceTracker = crate::resource::NoLimitTracker, T: LevelTracer = crate::tracer::NoopTracer> {
    pub arrays: Arena<Array>,
    pub interns: Interns,
    pub tracker: R,
    pub tracer: T,
    pub gc_config: GcConfig,
    pub ticks: u64,
    /// Refinement words pushed by the action executor during argument
    /// fulfillment (spec §4.4 "out-of-order refinement pickups").
    pub data_stack: Vec<Cell>,
    /// API cells explicitly rooted against collection (spec §4.6 "guarded
    /// node stack").
    pub guarded: Vec<Cell>,
    /// Live module contexts, each a hitch-ring root for its declared symbols
    /// (spec §4.6 "Module iteration").
    pub modules: Vec<Context>,
    allocated_since_gc: usize,
}

impl<R: ResourceTracker + Default, T: LevelTracer + Default> Default for World<R, T> {
    fn default() -> Self {
        Self::new(R::default(), T::default(), GcConfig::default())
    }
}

impl<R: ResourceTracker, T: LevelTracer> World<R, T> {
    pub fn new(tracker: R, tracer: T, gc_config: GcConfig) -> Self {
        Self {
            arrays: Arena::new(),
            interns: Interns::new(),
            tracker,
            tracer,
            gc_config,
            ticks: 0,
            data_stack: Vec::new(),
            guarded: Vec::new(),
            modules: Vec::new(),
            allocated_since_gc: 0,
        }
    }

    /// Records one allocation against the ballast counter, returning whether
    /// a collection should run before the next dispatch (spec §4.6
    /// "Ballast: N stub allocations before a cycle... fuzzing mode: force a
    /// cycle every tick").
    pub fn note_allocation(&mut self) -> bool {
        self.allocated_since_gc += 1;
        let ballast_exhausted = self.allocated_since_gc >= self.gc_config.ballast;
        let fuzz_due = self.gc_config.fuzz_every_n_ticks.is_some_and(|n| n > 0 && self.ticks % u64::from(n) == 0);
        ballast_exhausted || fuzz_due
    }

    pub fn reset_ballast(&mut self) {
        self.allocated_since_gc = 0;
    }
}

/// Runs the level stack to completion, returning the outermost level's
/// output cell or the first uncaught failure (spec §4.2's dispatch loop,
/// §4.6's per-tick collection check, and §4.2's "Ordering & cancellation").
///
/// `top` is pushed as the sole initial level; the loop exits once the level
/// stack is empty (the initial level bounced `Out`/`Delegate` with nothing
/// left above it) or a `Fail`/unhandled `Thrown` propagates past the bottom.
pub fn run<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, top: Level) -> Result<Cell, EngineStop> {
    let mut stack: Vec<Level> = vec![top];

    loop {
        world.tracker.check_recursion_depth(stack.len()).map_err(EngineStop::Resource)?;
        world.tracker.tick().map_err(EngineStop::Resource)?;
        world.ticks += 1;

        if world.note_allocation() {
            world.tracer.on_gc_start(world.ticks);
            let freed = crate::gc::collect(world, &stack);
            world.tracer.on_gc_end(world.ticks, freed);
            world.reset_ballast();
        }

        let depth = stack.len() - 1;
        let level = &mut stack[depth];
        let executor_name = executor_name(level.executor);
        world.tracer.on_dispatch(world.ticks, executor_name, level.state);

        let bounce = dispatch(world, &mut stack, depth);

        match bounce {
            Bounce::Out => {
                world.tracer.on_pop(world.ticks, "out");
                let finished = stack.pop().expect("dispatched level must exist");
                match stack.last_mut() {
                    None => return Ok(finished.out),
                    Some(caller) => {
                        sync_shared_feed(caller, &finished);
                        caller.spare = finished.out;
                    }
                }
            }
            Bounce::Delegate => {
                world.tracer.on_pop(world.ticks, "delegate");
                // The level above (the delegate target) was already pushed by
                // this level's own dispatch; nothing to do here except let
                // the loop continue into it. When that sublevel later bounces
                // `Out`, its result must land in *this* level's caller, not
                // in this level's `spare` -- so we mark the delegator so its
                // own `Out` handling is skipped and it is popped silently
                // alongside its child. Implemented via the sentinel state
                // `u32::MAX`, checked below before ordinary `Out` handling.
                stack[depth].state = DELEGATED_SENTINEL;
            }
            Bounce::Continue => {
                world.tracer.on_push(world.ticks, executor_name);
            }
            Bounce::Suspend => return Err(EngineStop::Suspended),
            Bounce::Redo { recheck_types } => {
                stack[depth].flags.left_quote_path = recheck_types || stack[depth].flags.left_quote_path;
            }
            Bounce::Thrown(thrown) => {
                if let Some(result) = unwind_to_catcher(world, &mut stack, thrown)? {
                    return Ok(result);
                }
            }
            Bounce::Fail(err) => {
                return Err(EngineStop::Raised(err));
            }
        }

        // A delegator whose child just bounced `Out` and overwrote `spare`
        // must itself pop with that value as its own output, propagating
        // upward without re-entering its executor.
        while let Some(top) = stack.last() {
            if top.state != DELEGATED_SENTINEL {
                break;
            }
            let finished = stack.pop().expect("sentinel state implies a live level");
            match stack.last_mut() {
                None => return Ok(finished.spare),
                Some(caller) => {
                    sync_shared_feed(caller, &finished);
                    caller.spare = finished.spare;
                }
            }
        }
    }
}

const DELEGATED_SENTINEL: u32 = u32::MAX;

/// A pushed sublevel that reads from the *same* backing array as its caller
/// (an action call consuming the caller's own feed to fulfill arguments, per
/// spec §4.4) advances a feed the caller must see reflected in its own
/// cursor once that sublevel finishes. A sublevel evaluating a nested array
/// of its own (a group's contents, a block passed to the evaluator) has a
/// different backing array and is left alone -- distinguishing the two
/// cases by array identity avoids a dedicated "shares-feed" flag on `Level`.
fn sync_shared_feed(caller: &mut Level, finished: &Level) {
    if caller.feed.array() == finished.feed.array() {
        caller.feed = finished.feed.clone();
    }
}

fn executor_name(kind: ExecutorKind) -> &'static str {
    match kind {
        ExecutorKind::Stepper => "stepper",
        ExecutorKind::Evaluator => "evaluator",
        ExecutorKind::Action => "action",
        ExecutorKind::Subparse => "subparse",
    }
}

fn dispatch<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    match stack[depth].executor {
        ExecutorKind::Stepper => executors::stepper::step(world, stack, depth),
        ExecutorKind::Evaluator => executors::evaluator::step(world, stack, depth),
        ExecutorKind::Action => executors::action::step(world, stack, depth),
        ExecutorKind::Subparse => crate::parse::step(world, stack, depth),
    }
}

/// Unwinds the level stack looking for a catcher (spec §4.2 "dispatcher
/// catches": a level with `catches_throws` set is re-entered with
/// `flags.throwing` so it can run cleanup, then re-dispatched). Returns
/// `Ok(Some(value))` if the throw reaches past the bottom level carrying
/// `ThrowLabel::Return` from the outermost call (treated as the engine's
/// final result), `Ok(None)` if a catcher absorbed it and the loop should
/// continue, or propagates as a failure if nothing ever catches it.
fn unwind_to_catcher<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    stack: &mut Vec<Level>,
    mut thrown: Thrown,
) -> Result<Option<Cell>, EngineStop> {
    world.tracer.on_throw(world.ticks, &thrown.label);
    loop {
        let Some(level) = stack.last_mut() else {
            return Err(EngineStop::Raised(crate::error::uncaught_throw_to_error(&thrown)));
        };
        if level.flags.catches_throws {
            level.flags.throwing = true;
            level.scratch_cell = thrown.value.clone_value();
            return Ok(None);
        }
        stack.pop();
        if matches!(thrown.label, ThrowLabel::Return) && stack.is_empty() {
            return Ok(Some(thrown.value));
        }
        // Keep unwinding; `thrown` is consumed identically at every frame.
        thrown = Thrown { label: thrown.label.clone(), value: thrown.value.clone_value() };
    }
}

/// Why [`run`] stopped without a normal `Ok` result.
#[derive(Debug)]
pub enum EngineStop {
    Raised(RaisedError),
    Resource(ResourceError),
    /// A level bounced `Suspend`; the host may resume by calling `run` again
    /// with the same stack (not yet wired to a public resumption API --
    /// no executor in this engine currently produces `Suspend`).
    Suspended,
}

impl std::fmt::Display for EngineStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raised(e) => write!(f, "{e}"),
            Self::Resource(e) => write!(f, "{e}"),
            Self::Suspended => f.write_str("execution suspended"),
        }
    }
}

impl std::error::Error for EngineStop {}

/// Builds the initial level for evaluating `array` top to bottom (spec §4.5
/// "Evaluator executor").
pub fn top_level(array: StubId) -> Level {
    Level::new(crate::feed::Feed::new(array), ExecutorKind::Evaluator)
}

/// Builds a fresh, empty module context and registers it as a GC root (spec
/// §4.6 "Module iteration").
pub fn new_module<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>) -> Result<Context, ResourceError> {
    let ctx = Context::new(ContextKind::Module, &mut world.arrays, &mut world.tracker)?;
    world.modules.push(ctx);
    Ok(ctx)
}
