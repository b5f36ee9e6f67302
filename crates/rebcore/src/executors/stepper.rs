//! Single-step dispatch (spec §4.3 "Stepper executor"): the state machine
//! that decides what one cell means and advances the feed past it.
//!
//! Grounded on `bytecode/vm/mod.rs`'s per-instruction dispatch (one match arm
//! per opcode, falling through to a handler that may itself push a new
//! frame); here the "opcode" is a cell's [`Heart`] rather than a byte, and
//! pushing a frame means pushing a [`Level`] for the trampoline to run next.

use crate::arena::StubId;
use crate::cell::{Cell, Heart, Payload, Sigil};
use crate::context::{Context, ContextKind};
use crate::error::{ErrKind, RaisedError};
use crate::level::{Bounce, ExecutorKind, Level};
use crate::resource::ResourceTracker;
use crate::symbol::SymbolId;
use crate::tracer::LevelTracer;
use crate::trampoline::World;

const START: u32 = 0;
const AFTER_GROUP: u32 = 1;
const AFTER_PRIMARY_ACTION: u32 = 2;
const AFTER_SETWORD_RHS: u32 = 3;
const AFTER_INFIX_ACTION: u32 = 4;
const AFTER_SETBLOCK_RHS: u32 = 5;

/// What a pending sub-dispatch should do with its result once the stepper is
/// re-entered (spec §3's "union for executor-specific scratch", instantiated
/// for the stepper's own bookkeeping between one `Continue` and the next
/// dispatch).
#[derive(Debug, Clone)]
pub struct StepperPending {
    /// Where a set-word/set-path/set-tuple's evaluated right side gets
    /// stored: the binding context and, for a path/tuple, the picker chain.
    pub target: Option<SetTarget>,
    /// Set while waiting on a `^(...)` meta-group's inner evaluation, so the
    /// result gets meta'd once the sublevel returns.
    pub meta_group: bool,
    /// Set-block targets (spec §4.3 "Set-block"), parsed up front so
    /// `resume_after_setblock_rhs` only has to walk a plain `Vec`.
    pub multi_targets: Option<Vec<MultiSetTarget>>,
}

#[derive(Debug, Clone)]
pub struct SetTarget {
    pub binding: StubId,
    /// One symbol for a plain set-word; two or more for a set-path/set-tuple,
    /// where every symbol but the last must already resolve (spec's Open
    /// Question resolution in `DESIGN.md`: intermediate segments are never
    /// auto-vivified, only the final key may be newly created).
    pub path: Vec<SymbolId>,
}

/// One target slot inside a set-block (spec §4.3 "parse the block into a
/// list of targets"). `_`/blank slots are skipped; every other slot stores
/// into `binding[symbol]` under `sigil`'s write policy (plain decays an
/// antiform before storing, meta stores the meta'd form, the-word stores the
/// value unevaluated-flagged without decay).
#[derive(Debug, Clone)]
pub enum MultiSetTarget {
    Skip,
    Store { binding: StubId, symbol: SymbolId, sigil: Sigil },
}

pub fn step<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    match stack[depth].state {
        START => dispatch_start(world, stack, depth),
        AFTER_GROUP => resume_after_group(world, stack, depth),
        AFTER_PRIMARY_ACTION => resume_after_primary_action(world, stack, depth),
        AFTER_SETWORD_RHS => resume_after_setword_rhs(world, stack, depth),
        AFTER_INFIX_ACTION => resume_after_infix_action(world, stack, depth),
        AFTER_SETBLOCK_RHS => resume_after_setblock_rhs(world, stack, depth),
        other => unreachable!("stepper has no state {other}"),
    }
}

fn dispatch_start<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let Some(cell) = super::current_cell(&stack[depth], &world.arrays) else {
        return Bounce::Out;
    };

    // Quoted cells decrement the quote depth by one and stop there, before
    // any dispatch on the underlying kind (spec §4.3 "Quoted cells decrement
    // the quote depth by one"; §8's quote round-trip invariant depends on
    // this running ahead of the heart match below, not instead of it for
    // rung zero).
    if cell.quote_depth() > 0 {
        stack[depth].feed.advance(&world.arrays);
        let mut out = cell;
        out.unquote_one();
        out.flags.unevaluated = true;
        stack[depth].out = out;
        return check_infix(world, stack, depth);
    }

    match cell.heart {
        Heart::Comma => {
            stack[depth].feed.advance(&world.arrays);
            stack[depth].out = Cell::trash();
            Bounce::Out
        }

        // Inert kinds copy straight through with the unevaluated flag set
        // (spec §4.3 "inert kinds... copy through").
        Heart::Integer
        | Heart::Decimal
        | Heart::Text
        | Heart::Blob
        | Heart::Bitset
        | Heart::Object
        | Heart::ErrorValue
        | Heart::Date
        | Heart::Time
        | Heart::Money
        | Heart::Logic
        | Heart::Blank
        | Heart::Tag
        | Heart::Trash
        | Heart::Block(Sigil::Plain | Sigil::Get | Sigil::The) => {
            stack[depth].feed.advance(&world.arrays);
            let mut out = cell;
            out.flags.unevaluated = true;
            stack[depth].out = out;
            check_infix(world, stack, depth)
        }

        // Meta-block: lift a literal block to its quoted form rather than
        // evaluating it (spec §4.3 "Meta-group / meta-block... lift a
        // literal block to its quoted form").
        Heart::Block(Sigil::Meta) => {
            stack[depth].feed.advance(&world.arrays);
            let mut out = cell;
            out.flags.unevaluated = true;
            out.meta();
            stack[depth].out = out;
            check_infix(world, stack, depth)
        }

        // Set-block: multi-return (spec §4.3 "Set-block"). Parses the block
        // into a list of targets, then evaluates the right-hand expression
        // exactly like a set-word before distributing the result.
        Heart::Block(Sigil::Set) => begin_setblock_rhs(world, stack, depth, cell),

        Heart::Word(sigil) => dispatch_word(world, stack, depth, cell, sigil),
        Heart::Tuple(sigil) | Heart::Path(sigil) => dispatch_sequence(world, stack, depth, cell, sigil),
        Heart::Group(sigil) => {
            stack[depth].feed.advance(&world.arrays);
            let Payload::Series { array, .. } = cell.payload else {
                unreachable!("Heart::Group always carries a Series payload");
            };
            stack[depth].state = AFTER_GROUP;
            stack[depth].scratch = crate::level::LevelScratch::Stepper(StepperPending {
                target: None,
                meta_group: sigil == Sigil::Meta,
                multi_targets: None,
            });
            stack.push(crate::trampoline::top_level(array));
            Bounce::Continue
        }
        Heart::Action => {
            let Payload::Action { .. } = cell.payload else { unreachable!() };
            stack[depth].feed.advance(&world.arrays);
            begin_call(world, stack, depth, cell, None, crate::cell::InfixMode::Normal);
            Bounce::Continue
        }
    }
}

fn dispatch_word<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    stack: &mut Vec<Level>,
    depth: usize,
    cell: Cell,
    sigil: Sigil,
) -> Bounce {
    let Some(binding) = cell.binding else {
        return Bounce::Fail(RaisedError::new(ErrKind::NotBound, format!("word has no binding: {:?}", cell.symbol)));
    };
    let sym = cell.symbol.expect("word cells always carry a symbol");
    let ctx = Context::from_varlist(binding, ContextKind::Object, &world.arrays);
    let Some(index) = ctx.find(sym, &world.arrays) else {
        return Bounce::Fail(RaisedError::new(ErrKind::NotBound, format!("unbound word: {}", world.interns.text(sym))));
    };
    let value = ctx.get(index, &world.arrays).clone_value();

    match sigil {
        Sigil::Get => {
            stack[depth].feed.advance(&world.arrays);
            if value.is_antiform() {
                return bad_word_get(world, sym);
            }
            stack[depth].out = value;
            check_infix(world, stack, depth)
        }
        Sigil::Meta => {
            stack[depth].feed.advance(&world.arrays);
            let mut out = value;
            out.meta();
            stack[depth].out = out;
            check_infix(world, stack, depth)
        }
        Sigil::The => {
            stack[depth].feed.advance(&world.arrays);
            let mut out = cell;
            out.flags.unevaluated = true;
            stack[depth].out = out;
            check_infix(world, stack, depth)
        }
        Sigil::Set => {
            stack[depth].feed.advance(&world.arrays);
            begin_setword_rhs(world, stack, depth, SetTarget { binding, path: vec![sym] });
            Bounce::Continue
        }
        Sigil::Plain => {
            stack[depth].feed.advance(&world.arrays);
            if matches!(value.heart, Heart::Action) {
                if let Payload::Action { quotes_left: true, .. } = value.payload {
                    // Reached directly from START, i.e. nothing preceded this
                    // word this step (spec §4.3 "Backward-quote lookahead":
                    // a left-quoting action invoked with nothing on its left
                    // is an error, not a plain prefix call).
                    return Bounce::Fail(
                        RaisedError::new(ErrKind::LiteralLeftPath, "left-quoting action invoked with nothing on its left")
                            .with_param("action", world.interns.text(sym)),
                    );
                }
                begin_call(world, stack, depth, value, None, crate::cell::InfixMode::Normal);
                stack[depth].state = AFTER_PRIMARY_ACTION;
                Bounce::Continue
            } else {
                if value.is_antiform() {
                    return bad_word_get(world, sym);
                }
                stack[depth].out = value;
                check_infix(world, stack, depth)
            }
        }
    }
}

/// Spec §4.3: "a plain `word!` resolved to an antiform and was fetched
/// without meta" raises `bad-word-get` ("unfriendly variable").
fn bad_word_get<R: ResourceTracker, T: LevelTracer>(world: &World<R, T>, sym: SymbolId) -> Bounce {
    Bounce::Fail(RaisedError::new(ErrKind::BadWordGet, format!("{}: unfriendly variable get of an antiform", world.interns.text(sym))))
}

/// Walks a path/tuple's picker chain. Only the plain-get case (read every
/// segment) and the set case (write the last segment) are implemented; both
/// share the "no auto-vivification of intermediate segments" rule recorded
/// in `DESIGN.md`.
fn dispatch_sequence<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    stack: &mut Vec<Level>,
    depth: usize,
    cell: Cell,
    sigil: Sigil,
) -> Bounce {
    let Payload::Series { array, .. } = cell.payload else {
        unreachable!("Heart::Tuple/Path always carry a Series payload");
    };
    let segments: Vec<SymbolId> = world.arrays.get(array).cells.iter().filter_map(|c| c.symbol).collect();
    let Some((&head, rest)) = segments.split_first() else {
        return Bounce::Fail(RaisedError::new(ErrKind::ParseSeries, "empty path/tuple"));
    };

    stack[depth].feed.advance(&world.arrays);

    let Some(head_binding) = cell.binding else {
        return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "path head has no binding"));
    };
    let mut ctx = Context::from_varlist(head_binding, ContextKind::Object, &world.arrays);
    let Some(mut index) = ctx.find(head, &world.arrays) else {
        return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "path head is unbound"));
    };

    if sigil == Sigil::Set {
        let Some((&last, middle)) = rest.split_last() else {
            return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "set-path needs at least one picker"));
        };
        for &step_sym in middle {
            let Payload::Series { array: next, .. } = ctx.get(index, &world.arrays).payload else {
                return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "intermediate path segment is not an object"));
            };
            let next_ctx = Context::from_varlist(next, ContextKind::Object, &world.arrays);
            let Some(next_index) = next_ctx.find(step_sym, &world.arrays) else {
                return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "set-path requires every intermediate segment to already exist"));
            };
            ctx = next_ctx;
            index = next_index;
        }
        let Payload::Series { array: target_array, .. } = ctx.get(index, &world.arrays).payload else {
            return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "set-path target is not an object"));
        };
        begin_setword_rhs(world, stack, depth, SetTarget { binding: target_array, path: vec![last] });
        return Bounce::Continue;
    }

    for &step_sym in rest {
        let Payload::Series { array: next, .. } = ctx.get(index, &world.arrays).payload else {
            return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "intermediate path segment is not an object"));
        };
        let next_ctx = Context::from_varlist(next, ContextKind::Object, &world.arrays);
        let Some(next_index) = next_ctx.find(step_sym, &world.arrays) else {
            return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "path segment unbound"));
        };
        ctx = next_ctx;
        index = next_index;
    }
    let value = ctx.get(index, &world.arrays).clone_value();
    if value.is_antiform() {
        return bad_word_get(world, segments.last().copied().unwrap_or(head));
    }
    stack[depth].out = value;
    check_infix(world, stack, depth)
}

fn begin_setword_rhs<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    stack: &mut Vec<Level>,
    depth: usize,
    target: SetTarget,
) {
    stack[depth].state = AFTER_SETWORD_RHS;
    stack[depth].scratch =
        crate::level::LevelScratch::Stepper(StepperPending { target: Some(target), meta_group: false, multi_targets: None });
    let array = stack[depth].feed.array();
    let index = stack[depth].feed.index() as u32;
    let sub_feed = crate::feed::Feed::new(array);
    let mut sub = Level::new(sub_feed, ExecutorKind::Stepper);
    // Position the sub-stepper at the same index by advancing a fresh feed
    // there; this avoids exposing `Feed`'s index field as publicly mutable.
    for _ in 0..index {
        sub.feed.advance(&world.arrays);
    }
    stack.push(sub);
}

fn resume_after_group<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let meta = matches!(&stack[depth].scratch, crate::level::LevelScratch::Stepper(StepperPending { meta_group: true, .. }));
    let mut out = stack[depth].spare.clone_value();
    if meta {
        out.meta();
    }
    stack[depth].out = out;
    stack[depth].scratch = crate::level::LevelScratch::None;
    check_infix(world, stack, depth)
}

fn resume_after_primary_action<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    stack[depth].out = stack[depth].spare.clone_value();
    check_infix(world, stack, depth)
}

fn resume_after_setword_rhs<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let crate::level::LevelScratch::Stepper(StepperPending { target: Some(target), .. }) = stack[depth].scratch.take() else {
        unreachable!("AFTER_SETWORD_RHS always carries a pending target");
    };
    // `trampoline::sync_shared_feed` already copied the sub-stepper's final
    // cursor back into this level's feed (same backing array) when it popped.
    let sub_result = stack[depth].spare.clone_value();

    let mut ctx = Context::from_varlist(target.binding, ContextKind::Object, &world.arrays);
    let Some((&last, middle)) = target.path.split_last() else {
        unreachable!("SetTarget::path is never empty");
    };
    for &step_sym in middle {
        let Some(index) = ctx.find(step_sym, &world.arrays) else {
            return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "set-path requires every intermediate segment to already exist"));
        };
        let Payload::Series { array: next, .. } = ctx.get(index, &world.arrays).payload else {
            return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "intermediate path segment is not an object"));
        };
        ctx = Context::from_varlist(next, ContextKind::Object, &world.arrays);
    }
    let (to_store, out_value) = decay_for_storage(sub_result);
    if let Err(resource_err) = ctx.set_or_append(last, to_store, &mut world.arrays, &mut world.tracker) {
        return Bounce::Fail(RaisedError::new(ErrKind::NoMemory, resource_err.to_string()));
    }
    stack[depth].out = out_value;
    check_infix(world, stack, depth)
}

/// Spec §4.3 set-word rule: "evaluate right-hand side; if result is void,
/// unset the variable and propagate a 'none' indicator; otherwise decay any
/// unstable antiform and store." Returns `(value to store, value to report
/// as the expression's result)`. "Unset" here means writing the same
/// `Cell::trash()` sentinel a freshly-created binding already holds (see
/// `Context::new`'s rootvar slot) rather than removing the keylist/varlist
/// slot outright, since deleting a slot would shift every later index and
/// this engine has no reindexing pass for bound words that outlive it.
fn decay_for_storage(value: Cell) -> (Cell, Cell) {
    if value.is_void() {
        return (Cell::trash(), Cell::blank());
    }
    let mut stored = value;
    if stored.is_antiform() {
        stored.decay_antiform();
    }
    (stored.clone_value(), stored)
}

/// Parses a set-block's target list (spec §4.3 "Set-block"), then pushes a
/// sub-stepper over the same feed position to evaluate the right-hand
/// expression, mirroring `begin_setword_rhs`.
fn begin_setblock_rhs<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize, cell: Cell) -> Bounce {
    stack[depth].feed.advance(&world.arrays);
    let Payload::Series { array, .. } = cell.payload else {
        unreachable!("Heart::Block always carries a Series payload");
    };
    let target_cells: Vec<Cell> = world.arrays.get(array).cells.clone();
    let mut targets = Vec::with_capacity(target_cells.len());
    for t in target_cells {
        match t.heart {
            Heart::Blank => targets.push(MultiSetTarget::Skip),
            Heart::Word(sigil @ (Sigil::Plain | Sigil::Meta | Sigil::The)) => {
                let Some(binding) = t.binding else {
                    return Bounce::Fail(RaisedError::new(ErrKind::NotBound, "set-block target has no binding"));
                };
                let symbol = t.symbol.expect("word cells always carry a symbol");
                targets.push(MultiSetTarget::Store { binding, symbol, sigil });
            }
            _ => return Bounce::Fail(RaisedError::new(ErrKind::BadParameter, "set-block targets must be words or `_`")),
        }
    }

    stack[depth].state = AFTER_SETBLOCK_RHS;
    stack[depth].scratch = crate::level::LevelScratch::Stepper(StepperPending { target: None, meta_group: false, multi_targets: Some(targets) });
    let source = stack[depth].feed.array();
    let index = stack[depth].feed.index() as u32;
    let mut sub = Level::new(crate::feed::Feed::new(source), ExecutorKind::Stepper);
    for _ in 0..index {
        sub.feed.advance(&world.arrays);
    }
    stack.push(sub);
    Bounce::Continue
}

/// Distributes the right-hand side's single result across a set-block's
/// targets (spec §4.3 "write results back with meta/decay policy per
/// target, selecting which return is the overall expression value"). This
/// engine's natives never produce more than one return value (see
/// `DESIGN.md`), so only the first non-skip target receives the real result
/// under its sigil's write policy; any further target gets the "none"
/// indicator, same as a target a multi-return action chose not to fill.
fn resume_after_setblock_rhs<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let crate::level::LevelScratch::Stepper(StepperPending { multi_targets: Some(targets), .. }) = stack[depth].scratch.take() else {
        unreachable!("AFTER_SETBLOCK_RHS always carries pending targets");
    };
    let sub_result = stack[depth].spare.clone_value();
    let is_void = sub_result.is_void();

    let mut overall = Cell::blank();
    let mut filled = false;
    for target in &targets {
        let MultiSetTarget::Store { binding, symbol, sigil } = target else { continue };
        let mut ctx = Context::from_varlist(*binding, ContextKind::Object, &world.arrays);
        let stored = if filled {
            Cell::blank()
        } else {
            filled = true;
            if is_void {
                overall = Cell::blank();
                Cell::trash()
            } else {
                let mut v = sub_result.clone_value();
                match sigil {
                    Sigil::Meta => v.meta(),
                    _ => {
                        if v.is_antiform() {
                            v.decay_antiform();
                        }
                    }
                }
                overall = v.clone_value();
                v
            }
        };
        if let Err(resource_err) = ctx.set_or_append(*symbol, stored, &mut world.arrays, &mut world.tracker) {
            return Bounce::Fail(RaisedError::new(ErrKind::NoMemory, resource_err.to_string()));
        }
    }
    stack[depth].out = overall;
    check_infix(world, stack, depth)
}

fn resume_after_infix_action<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    // The deferred infix that led here has now fully resolved; clear the flag
    // before chaining so a *later*, unrelated defer in the same sequence
    // isn't mistaken for a second simultaneous one (spec §4.3 "a second
    // deferral without resolving the first" is the only ambiguous case).
    stack[depth].feed.flags.deferring_infix = false;
    stack[depth].out = stack[depth].spare.clone_value();
    // A completed infix call is itself an expression result, and the next
    // token may be a further infix action (`1 + 2 + 3`, `1 then [x] else
    // [y]`) — chase lookahead again instead of stopping after one operator.
    check_infix(world, stack, depth)
}

/// Looks at the cell now under the feed's cursor; if it is a word bound to
/// an infix action and lookahead is not suppressed, begins that call (spec
/// §4.3 "right-side infix lookahead" and "Backward-quote lookahead"). An
/// ordinary infix action takes `out` (the just-evaluated result) as its left
/// argument; a `quotes_left` action instead takes the literal cell the feed
/// just passed over (`lookback()`), unevaluated — which is how a word like
/// `x` reaches a left-quoting op as itself rather than as its bound value.
fn check_infix<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    if stack[depth].feed.flags.no_lookahead {
        stack[depth].feed.flags.no_lookahead = false;
        return Bounce::Out;
    }
    let Some(peek) = super::current_cell(&stack[depth], &world.arrays) else {
        return Bounce::Out;
    };
    let Heart::Word(Sigil::Plain) = peek.heart else {
        return Bounce::Out;
    };
    let Some(binding) = peek.binding else {
        return Bounce::Out;
    };
    let sym = peek.symbol.expect("word cells carry a symbol");
    let ctx = Context::from_varlist(binding, ContextKind::Object, &world.arrays);
    let Some(index) = ctx.find(sym, &world.arrays) else {
        return Bounce::Out;
    };
    let value = ctx.get(index, &world.arrays).clone_value();
    let Payload::Action { infix: true, infix_mode, quotes_left, postpones, .. } = value.payload else {
        return Bounce::Out;
    };
    // `postpones` exempts an action from pre-empting lookahead at all (spec
    // §4.3 exception list); it is only ever dispatched as a plain prefix call.
    if quotes_left && postpones {
        return Bounce::Out;
    }

    if infix_mode == crate::cell::InfixMode::Defer {
        if stack[depth].feed.flags.deferring_infix {
            return Bounce::Fail(RaisedError::new(ErrKind::AmbiguousInfix, "two infix actions both requested deferral"));
        }
        stack[depth].feed.flags.deferring_infix = true;
    }

    let left_arg = if quotes_left {
        let Some(literal) = stack[depth].feed.lookback().cloned() else {
            return Bounce::Fail(RaisedError::new(ErrKind::LiteralLeftPath, "left-quoting action has nothing on its left").with_param("action", world.interns.text(sym)));
        };
        literal
    } else {
        stack[depth].out.clone_value()
    };
    stack[depth].feed.advance(&world.arrays);
    stack[depth].state = AFTER_INFIX_ACTION;
    begin_call(world, stack, depth, value, Some(left_arg), infix_mode);
    Bounce::Continue
}

fn begin_call<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    stack: &mut Vec<Level>,
    depth: usize,
    action: Cell,
    left_arg: Option<Cell>,
    infix_mode: crate::cell::InfixMode,
) {
    let mut call_level = Level::new(stack[depth].feed.clone(), ExecutorKind::Action);
    // `tight` suppresses lookahead for exactly the one step that fetches the
    // infix action's own right-hand argument (spec §4.3), giving `1 + 2 * 3`
    // strict left-to-right chaining instead of treating `*` as binding
    // tighter. A non-tight infix (e.g. a right-associative `**`) leaves
    // lookahead enabled so that argument fetch can itself chase further
    // infix and recurse to the right.
    if left_arg.is_some() && infix_mode == crate::cell::InfixMode::Tight {
        call_level.feed.flags.no_lookahead = true;
    }
    call_level.scratch = crate::level::LevelScratch::Action(crate::executors::action::ActionScratch::new(action, left_arg, world));
    stack.push(call_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Engine;
    use crate::array::{Array, Flavor};
    use crate::cell::{InfixMode, ParamClass};
    use crate::executors::action::NativeId;
    use crate::resource::NoLimitTracker;
    use crate::tracer::NoopTracer;
    use crate::trampoline::EngineStop;

    type E = Engine<NoLimitTracker, NoopTracer>;

    fn engine() -> E {
        Engine::default()
    }

    fn word(e: &mut E, name: &str) -> Cell {
        let sym = e.world_mut().interns.intern(name);
        let mut c = Cell::word(sym, Sigil::Plain);
        c.binding = Some(e.root().varlist);
        c
    }

    fn set_word(e: &mut E, name: &str) -> Cell {
        let sym = e.world_mut().interns.intern(name);
        let mut c = Cell::word(sym, Sigil::Set);
        c.binding = Some(e.root().varlist);
        c
    }

    fn run_seq(e: &mut E, cells: Vec<Cell>) -> Result<Cell, EngineStop> {
        let arr = Array::from_cells(Flavor::PlainList, cells);
        let id = {
            let w = e.world_mut();
            let id = w.arrays.allocate(arr, &mut w.tracker).unwrap();
            w.arrays.make_managed(id);
            id
        };
        crate::trampoline::run(e.world_mut(), crate::trampoline::top_level(id))
    }

    fn block_lit(e: &mut E, cells: Vec<Cell>) -> Cell {
        let arr = Array::from_cells(Flavor::PlainList, cells);
        let w = e.world_mut();
        let id = w.arrays.allocate(arr, &mut w.tracker).unwrap();
        w.arrays.make_managed(id);
        Cell::block(id, 0, Sigil::Plain)
    }

    fn run_int(e: &mut E, cells: Vec<Cell>) -> i64 {
        let arr = Array::from_cells(Flavor::PlainList, cells);
        let id = {
            let w = e.world_mut();
            let id = w.arrays.allocate(arr, &mut w.tracker).unwrap();
            w.arrays.make_managed(id);
            id
        };
        let handle = e.reb_value(id).unwrap();
        let v = e.reb_unbox_integer(handle).unwrap();
        e.reb_release(handle).unwrap();
        v
    }

    fn binary_params() -> [(&'static str, ParamClass, bool, bool); 2] {
        [("left", ParamClass::Normal, false, false), ("right", ParamClass::Normal, false, false)]
    }

    #[test]
    fn tight_infix_chains_left_to_right() {
        let mut e = engine();
        e.register_native("+", &binary_params(), NativeId::Add, true, InfixMode::Tight).unwrap();
        e.register_native("*", &binary_params(), NativeId::Multiply, true, InfixMode::Tight).unwrap();
        let plus = word(&mut e, "+");
        let star = word(&mut e, "*");
        let result = run_int(&mut e, vec![Cell::integer(1), plus, Cell::integer(2), star, Cell::integer(3)]);
        assert_eq!(result, 9, "tight infix must chain strictly left-to-right, not let `*` bind tighter");
    }

    #[test]
    fn non_tight_infix_is_right_associative() {
        let mut e = engine();
        e.register_native("**", &binary_params(), NativeId::Power, true, InfixMode::Normal).unwrap();
        let pow = word(&mut e, "**");
        let result = run_int(&mut e, vec![Cell::integer(2), pow.clone(), Cell::integer(3), pow, Cell::integer(2)]);
        assert_eq!(result, 512, "a non-tight infix's right argument must itself chase further infix, giving 2 ** (3 ** 2)");
    }

    fn then_else_params() -> [(&'static str, ParamClass, bool, bool); 2] {
        [("left", ParamClass::Normal, false, false), ("body", ParamClass::Just, false, false)]
    }

    #[test]
    fn defer_infix_then_else_truthy_left_runs_then_only() {
        let mut e = engine();
        e.register_native("then", &then_else_params(), NativeId::Then, true, InfixMode::Defer).unwrap();
        e.register_native("else", &then_else_params(), NativeId::Else, true, InfixMode::Defer).unwrap();
        let then_w = word(&mut e, "then");
        let else_w = word(&mut e, "else");
        let block10 = block_lit(&mut e, vec![Cell::integer(10)]);
        let block20 = block_lit(&mut e, vec![Cell::integer(20)]);
        let result = run_int(&mut e, vec![Cell::logic(true), then_w, block10, else_w, block20]);
        assert_eq!(result, 10);
    }

    #[test]
    fn defer_infix_then_else_falsy_left_runs_else_only() {
        let mut e = engine();
        e.register_native("then", &then_else_params(), NativeId::Then, true, InfixMode::Defer).unwrap();
        e.register_native("else", &then_else_params(), NativeId::Else, true, InfixMode::Defer).unwrap();
        let then_w = word(&mut e, "then");
        let else_w = word(&mut e, "else");
        let block10 = block_lit(&mut e, vec![Cell::integer(10)]);
        let block20 = block_lit(&mut e, vec![Cell::integer(20)]);
        let result = run_int(&mut e, vec![Cell::logic(false), then_w, block10, else_w, block20]);
        assert_eq!(result, 20);
    }

    #[test]
    fn second_simultaneous_defer_is_ambiguous() {
        let mut e = engine();
        e.register_native("then", &then_else_params(), NativeId::Then, true, InfixMode::Defer).unwrap();
        let then_w = word(&mut e, "then");
        let arr = Array::from_cells(Flavor::PlainList, vec![then_w]);
        let id = {
            let w = e.world_mut();
            let id = w.arrays.allocate(arr, &mut w.tracker).unwrap();
            w.arrays.make_managed(id);
            id
        };
        let mut level = Level::new(crate::feed::Feed::new(id), ExecutorKind::Stepper);
        level.feed.flags.deferring_infix = true;
        level.out = Cell::integer(1);
        let mut stack = vec![level];
        let bounce = check_infix(e.world_mut(), &mut stack, 0);
        assert!(matches!(bounce, Bounce::Fail(ref err) if err.kind == ErrKind::AmbiguousInfix), "a second defer before the first resolves must be rejected");
    }

    #[test]
    fn quoted_word_decrements_depth_without_resolving_it() {
        let mut e = engine();
        let mut qx = word(&mut e, "x");
        qx.quote_one();
        let result = run_seq(&mut e, vec![qx]).expect("a quoted word never looks up its binding");
        assert_eq!(result.quote_depth(), 0, "quote round-trip: one rung in, one rung off");
        assert!(matches!(result.heart, Heart::Word(Sigil::Plain)));
    }

    #[test]
    fn plain_word_get_of_antiform_raises_bad_word_get() {
        let mut e = engine();
        let mut root = e.root();
        let sym = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym, Cell::logic(true).into_antiform(), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let wx = word(&mut e, "x");
        let result = run_seq(&mut e, vec![wx]);
        assert!(matches!(result, Err(EngineStop::Raised(ref err)) if err.kind == ErrKind::BadWordGet));
    }

    #[test]
    fn get_word_get_of_antiform_raises_bad_word_get() {
        let mut e = engine();
        let mut root = e.root();
        let sym = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym, Cell::logic(true).into_antiform(), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let mut gx = Cell::word(sym, Sigil::Get);
        gx.binding = Some(e.root().varlist);
        let result = run_seq(&mut e, vec![gx]);
        assert!(matches!(result, Err(EngineStop::Raised(ref err)) if err.kind == ErrKind::BadWordGet));
    }

    #[test]
    fn meta_word_get_is_the_escape_hatch_for_antiforms() {
        let mut e = engine();
        let mut root = e.root();
        let sym = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym, Cell::logic(true).into_antiform(), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let mut mx = Cell::word(sym, Sigil::Meta);
        mx.binding = Some(e.root().varlist);
        let result = run_seq(&mut e, vec![mx]).expect("meta-get must bypass the antiform guard");
        assert_eq!(result.quote_depth(), 1);
        assert!(!result.is_antiform());
    }

    #[test]
    fn quoting_action_invoked_bare_raises_literal_left_path() {
        let mut e = engine();
        e.register_quoting_native("quote", &[("left", ParamClass::Normal, false, false)], NativeId::Quote, false).unwrap();
        let q = word(&mut e, "quote");
        let result = run_seq(&mut e, vec![q]);
        assert!(matches!(result, Err(EngineStop::Raised(ref err)) if err.kind == ErrKind::LiteralLeftPath));
    }

    #[test]
    fn check_infix_rejects_quoting_action_with_nothing_looked_back() {
        let mut e = engine();
        e.register_quoting_native("quote", &[("left", ParamClass::Normal, false, false)], NativeId::Quote, false).unwrap();
        let q = word(&mut e, "quote");
        let arr = Array::from_cells(Flavor::PlainList, vec![q]);
        let id = {
            let w = e.world_mut();
            let id = w.arrays.allocate(arr, &mut w.tracker).unwrap();
            w.arrays.make_managed(id);
            id
        };
        let level = Level::new(crate::feed::Feed::new(id), ExecutorKind::Stepper);
        let mut stack = vec![level];
        stack[0].out = Cell::integer(1);
        let bounce = check_infix(e.world_mut(), &mut stack, 0);
        assert!(
            matches!(bounce, Bounce::Fail(ref err) if err.kind == ErrKind::LiteralLeftPath),
            "a quoting action peeked with nothing looked-back must fail rather than silently fall back to `out`"
        );
    }

    #[test]
    fn backward_quote_lookahead_quotes_the_literal_left_cell() {
        let mut e = engine();
        e.register_quoting_native("quote", &[("left", ParamClass::Normal, false, false)], NativeId::Quote, false).unwrap();
        let mut root = e.root();
        let sym_x = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym_x, Cell::integer(5), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let x = word(&mut e, "x");
        let q = word(&mut e, "quote");
        let result = run_seq(&mut e, vec![x, q]).expect("quote applied to a preceding word must succeed");
        assert_eq!(result.quote_depth(), 1, "the literal word, not its evaluated value, is what gets quoted");
        assert!(matches!(result.heart, Heart::Word(Sigil::Plain)));
        assert_eq!(result.symbol, Some(sym_x));
    }

    #[test]
    fn postponing_action_never_preempts_lookahead() {
        let mut e = engine();
        e.register_quoting_native("quote", &[("left", ParamClass::Normal, false, false)], NativeId::Quote, true).unwrap();
        let mut root = e.root();
        let sym_x = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym_x, Cell::integer(5), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let x = word(&mut e, "x");
        let q = word(&mut e, "quote");
        // With `postpones`, `quote` never fires via lookahead after `x`; it is
        // instead dispatched as its own bare statement next, which fails the
        // same way a directly-invoked left-quoting action always does.
        let result = run_seq(&mut e, vec![x, q]);
        assert!(matches!(result, Err(EngineStop::Raised(ref err)) if err.kind == ErrKind::LiteralLeftPath));
    }

    #[test]
    fn meta_block_lifts_the_literal_block_without_evaluating_it() {
        let mut e = engine();
        let inner = block_lit(&mut e, vec![Cell::integer(1), Cell::integer(2)]);
        let Payload::Series { array, .. } = inner.payload else { unreachable!() };
        let meta_block = Cell::block(array, 0, Sigil::Meta);
        let result = run_seq(&mut e, vec![meta_block]).unwrap();
        assert_eq!(result.quote_depth(), 1, "meta-block lifts the block one rung rather than evaluating its contents");
        assert!(matches!(result.heart, Heart::Block(Sigil::Meta)));
    }

    #[test]
    fn set_block_stores_first_target_and_blanks_the_rest() {
        let mut e = engine();
        let a = word(&mut e, "a");
        let b = word(&mut e, "b");
        let sym_a = a.symbol.unwrap();
        let sym_b = b.symbol.unwrap();
        let targets = Array::from_cells(Flavor::PlainList, vec![a, Cell::blank(), b]);
        let targets_id = {
            let w = e.world_mut();
            let id = w.arrays.allocate(targets, &mut w.tracker).unwrap();
            w.arrays.make_managed(id);
            id
        };
        let set_block = Cell::block(targets_id, 0, Sigil::Set);
        let result = run_seq(&mut e, vec![set_block, Cell::integer(99)]).unwrap();
        assert!(matches!(result.payload, Payload::Int(99)));

        let root = e.root();
        let ia = root.find(sym_a, &e.world().arrays).unwrap();
        assert!(matches!(root.get(ia, &e.world().arrays).payload, Payload::Int(99)));
        let ib = root.find(sym_b, &e.world().arrays).unwrap();
        assert!(
            matches!(root.get(ib, &e.world().arrays).heart, Heart::Blank),
            "this engine's natives never produce more than one return value, so a second set-block target gets blank"
        );
    }

    #[test]
    fn set_word_void_rhs_unsets_variable_and_yields_blank() {
        let mut e = engine();
        e.register_native(
            "if",
            &[("cond", ParamClass::Normal, false, false), ("body", ParamClass::Just, false, false)],
            NativeId::If,
            false,
            InfixMode::Normal,
        )
        .unwrap();
        let mut root = e.root();
        let sym_x = e.world_mut().interns.intern("x");
        {
            let w = e.world_mut();
            root.set_or_append(sym_x, Cell::integer(42), &mut w.arrays, &mut w.tracker).unwrap();
        }
        let sx = set_word(&mut e, "x");
        let if_w = word(&mut e, "if");
        let body = block_lit(&mut e, vec![Cell::integer(1)]);
        let result = run_seq(&mut e, vec![sx, if_w, Cell::logic(false), body]).expect("a void set-word rhs must not itself error");
        assert!(matches!(result.heart, Heart::Blank), "void set-word result reports blank, not the stored sentinel");

        let index = root.find(sym_x, &e.world().arrays).expect("x keeps its slot even when unset");
        let stored = root.get(index, &e.world().arrays);
        assert!(matches!(stored.heart, Heart::Trash) && !stored.is_antiform(), "unset overwrites with a plain trash sentinel");
    }

    #[test]
    fn decay_for_storage_unsets_on_void() {
        let (stored, reported) = decay_for_storage(Cell::trash().into_antiform());
        assert!(matches!(stored.heart, Heart::Trash) && !stored.is_antiform());
        assert!(matches!(reported.heart, Heart::Blank));
    }

    #[test]
    fn decay_for_storage_decays_a_stable_antiform_before_storing() {
        let (stored, reported) = decay_for_storage(Cell::logic(true).into_antiform());
        assert!(!stored.is_antiform());
        assert!(matches!(stored.payload, Payload::Logic(true)));
        assert!(!reported.is_antiform());
    }

    #[test]
    fn decay_for_storage_passes_plain_values_through_unchanged() {
        let (stored, reported) = decay_for_storage(Cell::integer(7));
        assert!(matches!(stored.payload, Payload::Int(7)));
        assert!(matches!(reported.payload, Payload::Int(7)));
    }
}
