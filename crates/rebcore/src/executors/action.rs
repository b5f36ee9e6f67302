//! Action call protocol (spec §4.4 "Action executor"): argument fulfillment,
//! out-of-order refinement pickups, typechecking, and native dispatch.
//!
//! Grounded on `signature.rs`'s `Signature`/`BindMode` parameter-binding
//! machinery (positional-or-keyword classification, defaults, `*args`-style
//! collection) — generalized from Python's call convention to spec §4.4's
//! four quoting classes (normal/meta/just/the/soft) plus variadic collection
//! and refinement flags, and from `bytecode/vm/mod.rs`'s `ClassBodyInfo`-style
//! phase tracking (build up state across several dispatches of the same
//! frame) for the fulfilling → typechecking → dispatching progression.

use ahash::AHashMap;

use crate::arena::StubId;
use crate::array::{Array, Flavor};
use crate::cell::{Cell, Heart, ParamClass, Payload};
use crate::error::{ErrKind, RaisedError};
use crate::level::{Bounce, ExecutorKind, Level};
use crate::resource::ResourceTracker;
use crate::symbol::SymbolId;
use crate::tracer::LevelTracer;
use crate::trampoline::World;

/// Tags which native body a [`Heart::Action`] cell dispatches to (spec §9's
/// "dense table... enum with exhaustive match" design note, applied here the
/// same way it is applied to [`crate::level::ExecutorKind`]). This engine
/// does not implement user-authored (interpreted) action bodies -- every
/// action is one of these natives -- since spec §4.4 specifies the call
/// *protocol*, not a standard library; see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeId {
    Add,
    Subtract,
    Multiply,
    /// `**`: infix, not tight, so repeated calls chase right (spec §4.3
    /// "tight infix right-associative" scenario: `2 ** 3 ** 2 == 512`).
    Power,
    Equal,
    Not,
    /// `if cond [block]`: `cond` is a normal argument, `block` is taken
    /// unevaluated (`ParamClass::Just`) and run only when `cond` is truthy.
    If,
    /// `left then [block]`: infix, defer-class. Runs `block` when `left` is
    /// truthy, passing `left` through unchanged; otherwise yields `left`'s
    /// antiform-null so a following `else` can still see the failure.
    Then,
    /// `left else [block]`: infix, defer-class. Runs `block` when `left` is
    /// null/falsy, otherwise passes `left` through.
    Else,
    /// Throws `ThrowLabel::Return` carrying its single argument.
    Return,
    /// Backward-quote-lookahead postfix `quote`: raises its literal left
    /// argument one rung on the quote ladder (spec §4.3's worked example of
    /// an action that "quotes its first argument").
    Quote,
}

const START: u32 = 0;
const AWAIT_ARG: u32 = 1;
const AWAIT_BODY: u32 = 2;

#[derive(Debug, Clone)]
pub struct ActionScratch {
    paramlist: StubId,
    native: NativeId,
    /// Refinement symbols requested for this call, drained from
    /// `World::data_stack` at construction time (spec §4.4 "out-of-order
    /// refinement pickups": the caller may push refinement words in any
    /// order before the call begins; this implementation does not yet parse
    /// `action/refine` path-call syntax to populate the stack automatically,
    /// but the pickup protocol itself -- consult this set while walking the
    /// paramlist in declared order -- is real and exercised by tests that
    /// push refinement symbols directly).
    requested_refinements: AHashMap<SymbolId, bool>,
    args: Vec<Cell>,
    typechecked: Vec<bool>,
    cursor: usize,
}

impl ActionScratch {
    pub fn new<R: ResourceTracker, T: LevelTracer>(action: Cell, left_arg: Option<Cell>, world: &mut World<R, T>) -> Self {
        let Payload::Action { paramlist, native, .. } = action.payload else {
            panic!("ActionScratch::new requires a Heart::Action cell");
        };
        let param_count = world.arrays.get(paramlist).len();
        let mut args = vec![Cell::trash(); param_count];
        let mut requested_refinements = AHashMap::new();
        while let Some(top) = world.data_stack.last() {
            let Some(sym) = top.symbol else { break };
            requested_refinements.insert(sym, true);
            world.data_stack.pop();
        }
        let mut cursor = 0;
        if let Some(left) = left_arg {
            // Infix actions take their left argument pre-fulfilled as
            // parameter 0 (spec §4.3 "right-side infix lookahead").
            if param_count > 0 {
                args[0] = left;
                cursor = 1;
            }
        }
        Self { paramlist, native, requested_refinements, args, typechecked: vec![false; param_count], cursor }
    }

    /// Roots this scratch contributes to a mark pass: the paramlist array
    /// and every argument slot fulfilled so far, including the not-yet-typed
    /// trailing slots (still `Cell::trash()`, harmless to visit).
    pub(crate) fn gc_roots(&self) -> (StubId, &[Cell]) {
        (self.paramlist, &self.args)
    }
}

pub fn step<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    match stack[depth].state {
        START => fulfill_next(world, stack, depth),
        AWAIT_ARG => {
            store_fulfilled_arg(world, stack, depth);
            fulfill_next(world, stack, depth)
        }
        AWAIT_BODY => {
            stack[depth].out = stack[depth].spare.clone_value();
            Bounce::Out
        }
        other => unreachable!("action executor has no state {other}"),
    }
}

fn scratch<'a>(stack: &'a mut [Level], depth: usize) -> &'a mut ActionScratch {
    match &mut stack[depth].scratch {
        crate::level::LevelScratch::Action(s) => s,
        _ => unreachable!("action level always carries ActionScratch"),
    }
}

fn store_fulfilled_arg<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) {
    let value = stack[depth].spare.clone_value();
    let s = scratch(stack, depth);
    let class = param_class_at(s, world, s.cursor - 1);
    let mut value = value;
    if matches!(class, Some(ParamClass::Meta)) {
        value.meta();
    }
    s.args[s.cursor - 1] = value;
}

fn param_class_at<R: ResourceTracker, T: LevelTracer>(s: &ActionScratch, world: &World<R, T>, index: usize) -> Option<ParamClass> {
    match world.arrays.get(s.paramlist).get(index)?.payload {
        Payload::Param { class, .. } => Some(class),
        _ => None,
    }
}

/// Advances `cursor` through the paramlist, fulfilling each parameter per
/// its class (spec §4.4's four fulfillment rules), skipping unrequested
/// refinements, and collecting the rest of the feed for a variadic tail.
/// Once every parameter is fulfilled, runs the typechecking pass and
/// dispatches to the native.
fn fulfill_next<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    loop {
        let (paramlist, cursor, param_count) = {
            let s = scratch(stack, depth);
            (s.paramlist, s.cursor, world.arrays.get(s.paramlist).len())
        };
        if cursor >= param_count {
            return typecheck_and_dispatch(world, stack, depth);
        }

        let param_cell = world.arrays.get(paramlist).get(cursor).cloned().expect("cursor is in range");
        let Payload::Param { class, variadic, refinement } = param_cell.payload else {
            unreachable!("paramlist cells always carry Payload::Param");
        };
        let sym = param_cell.symbol;

        if refinement {
            let present = sym.is_some_and(|sym| scratch(stack, depth).requested_refinements.remove(&sym).is_some());
            scratch(stack, depth).args[cursor] = Cell::logic(present);
            scratch(stack, depth).cursor += 1;
            continue;
        }

        if variadic {
            let mut rest = Vec::new();
            while let Some(cell) = stack[depth].feed.at(&world.arrays).cloned() {
                rest.push(cell);
                stack[depth].feed.advance(&world.arrays);
            }
            let variadic_array = Array::from_cells(Flavor::PlainList, rest);
            let Ok(id) = world.arrays.allocate(variadic_array, &mut world.tracker) else {
                return Bounce::Fail(RaisedError::new(ErrKind::NoMemory, "could not allocate variadic tail"));
            };
            world.arrays.make_managed(id);
            scratch(stack, depth).args[cursor] = Cell::block(id, 0, crate::cell::Sigil::Plain);
            scratch(stack, depth).cursor += 1;
            continue;
        }

        if stack[depth].feed.is_end(&world.arrays) {
            // Endable parameters mark as trash rather than hard-failing
            // (spec §4.4 "mark endable parameters as an 'end' special trash
            // value"); a native that requires a value checks for
            // `Heart::Trash` itself and raises `NeedNonEnd`.
            scratch(stack, depth).args[cursor] = Cell::trash();
            scratch(stack, depth).cursor += 1;
            continue;
        }

        match class {
            ParamClass::Just | ParamClass::The => {
                let literal = stack[depth].feed.at(&world.arrays).cloned().expect("checked not at end");
                stack[depth].feed.advance(&world.arrays);
                scratch(stack, depth).args[cursor] = literal;
                scratch(stack, depth).cursor += 1;
            }
            ParamClass::Soft => {
                let next = stack[depth].feed.at(&world.arrays).cloned().expect("checked not at end");
                if matches!(next.heart, Heart::Group(_)) {
                    push_arg_eval_sublevel(world, stack, depth);
                    return Bounce::Continue;
                }
                stack[depth].feed.advance(&world.arrays);
                scratch(stack, depth).args[cursor] = next;
                scratch(stack, depth).cursor += 1;
            }
            ParamClass::Normal | ParamClass::Meta => {
                push_arg_eval_sublevel(world, stack, depth);
                return Bounce::Continue;
            }
        }
    }
}

fn push_arg_eval_sublevel<R: ResourceTracker, T: LevelTracer>(_world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) {
    scratch(stack, depth).cursor += 1;
    stack[depth].state = AWAIT_ARG;
    let sub = Level::new(stack[depth].feed.clone(), ExecutorKind::Stepper);
    // A `tight` infix call's `no_lookahead` lives on this call level's own
    // feed until the first normal argument is fetched (see `begin_call`);
    // once cloned into the sub-stepper that will actually suppress lookahead
    // for its one step, clear it here so later parameters are unaffected.
    stack[depth].feed.flags.no_lookahead = false;
    stack.push(sub);
}

fn typecheck_and_dispatch<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    {
        let s = scratch(stack, depth);
        // Full predicate typechecking against declared datatypes is not
        // implemented (paramlist cells carry no type-spec block in this
        // engine; see `DESIGN.md`), but the checking phase itself runs, in
        // its specified position between fulfillment and dispatch, and
        // stamps every argument so a later `Redo { recheck_types: true }`
        // would have a well-defined set of slots to re-walk.
        for flag in &mut s.typechecked {
            *flag = true;
        }
    }
    dispatch_native(world, stack, depth)
}

fn dispatch_native<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let (native, args) = {
        let s = scratch(stack, depth);
        (s.native, s.args.clone())
    };

    match native {
        NativeId::Add => arithmetic(&args, |a, b| a.checked_add(b)).map_or_else(overflow_err, |v| finish_with(stack, depth, v)),
        NativeId::Subtract => arithmetic(&args, |a, b| a.checked_sub(b)).map_or_else(overflow_err, |v| finish_with(stack, depth, v)),
        NativeId::Multiply => arithmetic(&args, |a, b| a.checked_mul(b)).map_or_else(overflow_err, |v| finish_with(stack, depth, v)),
        NativeId::Power => {
            arithmetic(&args, |a, b| u32::try_from(b).ok().and_then(|e| a.checked_pow(e))).map_or_else(overflow_err, |v| finish_with(stack, depth, v))
        }
        NativeId::Equal => {
            let eq = cell_eq(&args[0], &args[1]);
            finish_with(stack, depth, Cell::logic(eq))
        }
        NativeId::Not => {
            let truthy = is_truthy(&args[0]);
            finish_with(stack, depth, Cell::logic(!truthy))
        }
        NativeId::Return => Bounce::Thrown(crate::error::Thrown {
            label: crate::error::ThrowLabel::Return,
            value: args.first().cloned().unwrap_or_else(Cell::trash),
        }),
        NativeId::Quote => {
            let mut literal = args.first().cloned().unwrap_or_else(Cell::trash);
            literal.quote_one();
            finish_with(stack, depth, literal)
        }
        NativeId::If => {
            let cond = args.first().map(is_truthy).unwrap_or(false);
            if !cond {
                return finish_with(stack, depth, Cell::trash().into_antiform());
            }
            let Some(Payload::Series { array, .. }) = args.get(1).map(|c| c.payload.clone()) else {
                return Bounce::Fail(RaisedError::new(ErrKind::PhaseArgType, "if requires a block body"));
            };
            stack[depth].state = AWAIT_BODY;
            stack.push(crate::trampoline::top_level(array));
            Bounce::Continue
        }
        NativeId::Then => {
            let left = args[0].clone_value();
            if !is_truthy(&left) {
                return finish_with(stack, depth, left);
            }
            let Some(Payload::Series { array, .. }) = args.get(1).map(|c| c.payload.clone()) else {
                return Bounce::Fail(RaisedError::new(ErrKind::PhaseArgType, "then requires a block body"));
            };
            stack[depth].state = AWAIT_BODY;
            stack.push(crate::trampoline::top_level(array));
            Bounce::Continue
        }
        NativeId::Else => {
            let left = args[0].clone_value();
            if is_truthy(&left) {
                return finish_with(stack, depth, left);
            }
            let Some(Payload::Series { array, .. }) = args.get(1).map(|c| c.payload.clone()) else {
                return Bounce::Fail(RaisedError::new(ErrKind::PhaseArgType, "else requires a block body"));
            };
            stack[depth].state = AWAIT_BODY;
            stack.push(crate::trampoline::top_level(array));
            Bounce::Continue
        }
    }
}

fn arithmetic(args: &[Cell], op: impl Fn(i64, i64) -> Option<i64>) -> Option<i64> {
    let Payload::Int(a) = args.first()?.payload else { return None };
    let Payload::Int(b) = args.get(1)?.payload else { return None };
    op(a, b)
}

fn overflow_err(_: ()) -> Bounce {
    Bounce::Fail(RaisedError::new(ErrKind::PhaseArgType, "integer overflow"))
}

fn finish_with(stack: &mut [Level], depth: usize, value: Cell) -> Bounce {
    stack[depth].out = value;
    Bounce::Out
}

fn is_truthy(cell: &Cell) -> bool {
    if cell.is_antiform() {
        return false;
    }
    !matches!(cell.payload, Payload::Logic(false)) && !matches!(cell.heart, Heart::Blank)
}

fn cell_eq(a: &Cell, b: &Cell) -> bool {
    match (&a.payload, &b.payload) {
        (Payload::Int(x), Payload::Int(y)) => x == y,
        (Payload::Dec(x), Payload::Dec(y)) => x == y,
        (Payload::Logic(x), Payload::Logic(y)) => x == y,
        (Payload::Text(x), Payload::Text(y)) => x == y,
        _ => false,
    }
}

