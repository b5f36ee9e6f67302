//! The parse dialect (spec §5 "Parse engine"): a recursive combinator
//! language matching rules against a series input.
//!
//! Grounded on `bytecode/vm/mod.rs`'s frame-per-call shape the way every
//! other executor in this engine is, but scoped down in one specific way,
//! documented here rather than silently: a real Ren-C subparse pushes a
//! fresh trampoline level for *every* nested rule block, so the parser's own
//! call stack is inspectable frame-by-frame in a debugger. This
//! implementation pushes exactly one [`crate::level::ExecutorKind::Subparse`]
//! level per [`parse3`] call and matches nested rule blocks by direct Rust
//! recursion inside that single level's dispatch -- still observable via
//! `LevelTracer::on_parse_rule`, just not via level-stack depth. A
//! parenthesized code group (`when (...)`, `accept (...)`, `seek (...)`)
//! *does* run through the real trampoline, via a nested [`crate::trampoline::run`]
//! call, since that code can itself invoke actions and must see the whole
//! evaluator.
//!
//! Only array-backed (list) series are matched; `text!`/`blob!` input is out
//! of scope for this engine (see `DESIGN.md`), since `Payload::Text`/`Blob`
//! are inline and carry no arena identity for a feed-style cursor to walk.

use crate::arena::StubId;
use crate::array::{Array, Flavor};
use crate::cell::{Cell, Heart, Payload, Sigil};
use crate::context::{Context, ContextKind};
use crate::error::{ErrKind, RaisedError, ThrowLabel, Thrown};
use crate::level::{Bounce, ExecutorKind, Level};
use crate::resource::ResourceTracker;
use crate::symbol::SymbolId;
use crate::tracer::LevelTracer;
use crate::trampoline::{EngineStop, World};

/// Subparse state (spec §5 "Subparse state lives in the level's argument
/// slots"): the input array and starting position, the rule array, and the
/// persistent find-mode flags established by [`parse3`].
#[derive(Debug, Clone)]
pub struct ParseScratch {
    pub input_array: StubId,
    pub start_index: u32,
    pub rules_array: StubId,
    pub case_sensitive: bool,
    /// `:relax` -- not consuming the whole input is not an error.
    pub relax: bool,
    /// `:match` -- the overall return is the input series on success, not
    /// the synthesized true/ACCEPT-value result.
    pub match_mode: bool,
}

/// Builds the one [`ExecutorKind::Subparse`] level `parse3` pushes (spec §5
/// "Parse surface").
#[must_use]
pub fn subparse_level(scratch: ParseScratch) -> Level {
    let mut level = Level::new(crate::feed::Feed::new(scratch.rules_array), ExecutorKind::Subparse);
    level.scratch = crate::level::LevelScratch::Parse(scratch);
    level
}

/// The `parse3 input rules` surface (spec §5 "Parse surface"), run to
/// completion via a fresh nested trampoline run.
pub fn parse3<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    input_array: StubId,
    rules_array: StubId,
    relax: bool,
    match_mode: bool,
    case_sensitive: bool,
) -> Result<Cell, EngineStop> {
    let scratch = ParseScratch { input_array, start_index: 0, rules_array, case_sensitive, relax, match_mode };
    crate::trampoline::run(world, subparse_level(scratch))
}

pub fn step<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    let scratch = match &stack[depth].scratch {
        crate::level::LevelScratch::Parse(s) => s.clone(),
        _ => unreachable!("subparse level always carries ParseScratch"),
    };
    let rules_len = world.arrays.get(scratch.rules_array).len();
    world.tracer.on_parse_rule("alternates", 0);
    match match_alternates(world, scratch.rules_array, 0, rules_len, scratch.input_array, scratch.start_index as usize, scratch.case_sensitive) {
        Ok(MatchOutcome::Matched(end_index)) => finish(world, stack, depth, &scratch, end_index, None),
        Ok(MatchOutcome::Failed) => {
            stack[depth].out = Cell::trash().into_antiform();
            Bounce::Out
        }
        Err(ParseFlow::Accept(value, end_index)) => finish(world, stack, depth, &scratch, end_index, Some(value)),
        Err(ParseFlow::Break(end_index)) => finish(world, stack, depth, &scratch, end_index, None),
        Err(ParseFlow::Reject) => {
            stack[depth].out = Cell::trash().into_antiform();
            Bounce::Out
        }
        Err(ParseFlow::Fail(err)) => Bounce::Fail(err),
    }
}

fn finish<R: ResourceTracker, T: LevelTracer>(
    world: &World<R, T>,
    stack: &mut [Level],
    depth: usize,
    scratch: &ParseScratch,
    end_index: usize,
    accepted: Option<Cell>,
) -> Bounce {
    let input_len = world.arrays.get(scratch.input_array).len();
    if end_index < input_len && !scratch.relax {
        return Bounce::Fail(RaisedError::new(ErrKind::ParseIncomplete, "parse did not consume the whole input"));
    }
    stack[depth].out = if scratch.match_mode {
        Cell::block(scratch.input_array, end_index as u32, Sigil::Plain)
    } else {
        accepted.unwrap_or_else(|| Cell::logic(true))
    };
    Bounce::Out
}

#[derive(Debug, Clone, Copy)]
enum MatchOutcome {
    Matched(usize),
    Failed,
}

/// A parse-local short-circuit (spec §5's ACCEPT/BREAK/REJECT "throws"). Kept
/// as a plain `Result` error rather than routed through [`Bounce::Thrown`]
/// since every site that can raise one is caught within this same
/// single-level match, not across a trampoline unwind (see the module doc
/// comment on why nested rule blocks are Rust recursion here, not levels).
enum ParseFlow {
    Accept(Cell, usize),
    Break(usize),
    Reject,
    Fail(RaisedError),
}

impl From<RaisedError> for ParseFlow {
    fn from(err: RaisedError) -> Self {
        Self::Fail(err)
    }
}

/// Converts an uncaught parse throw reaching all the way past [`step`] — used
/// only if a future caller wants `parse3` embedded inside a larger evaluator
/// throw rather than resolved locally (not exercised by this engine's own
/// `parse3`, which always resolves `ParseFlow` itself).
#[must_use]
pub fn flow_to_thrown(label: ThrowLabel, value: Cell) -> Thrown {
    Thrown { label, value }
}

/// Splits `[idx, end)` on top-level `|` alternates and tries each in order
/// (spec §5 "alternates"), returning the first that matches.
fn match_alternates<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    mut alt_start: usize,
    end: usize,
    input: StubId,
    pos: usize,
    case_sensitive: bool,
) -> Result<MatchOutcome, ParseFlow> {
    loop {
        let mut alt_end = alt_start;
        while alt_end < end && !is_bar(world, rules, alt_end) {
            alt_end += 1;
        }
        match match_sequence(world, rules, alt_start, alt_end, input, pos, case_sensitive)? {
            MatchOutcome::Matched(new_pos) => return Ok(MatchOutcome::Matched(new_pos)),
            MatchOutcome::Failed => {
                if alt_end >= end {
                    return Ok(MatchOutcome::Failed);
                }
                alt_start = alt_end + 1;
            }
        }
    }
}

fn is_bar<R: ResourceTracker, T: LevelTracer>(world: &World<R, T>, rules: StubId, index: usize) -> bool {
    let Some(cell) = world.arrays.get(rules).get(index) else { return false };
    matches!(cell.heart, Heart::Word(Sigil::Plain)) && cell.symbol.is_some_and(|s| world.interns.text(s) == "|")
}

/// Runs clauses `[idx, end)` in sequence against `input`, threading the match
/// position forward; fails the whole sequence as soon as one clause fails
/// (spec §5 "each iteration returns a new index or end-flag... the loop
/// stops on failure").
fn match_sequence<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    mut idx: usize,
    end: usize,
    input: StubId,
    mut pos: usize,
    case_sensitive: bool,
) -> Result<MatchOutcome, ParseFlow> {
    while idx < end {
        let (next_idx, outcome) = match_one_clause(world, rules, idx, end, input, pos, case_sensitive)?;
        match outcome {
            Some(new_pos) => {
                pos = new_pos;
                idx = next_idx;
            }
            None => return Ok(MatchOutcome::Failed),
        }
    }
    Ok(MatchOutcome::Matched(pos))
}

/// Matches exactly one rule clause starting at `idx`, which may itself
/// consume several rule-array cells (a keyword plus the rule it modifies).
/// Returns the index just past the clause and, if it matched, the new input
/// position; `None` signals the clause failed.
fn match_one_clause<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
    input: StubId,
    pos: usize,
    case_sensitive: bool,
) -> Result<(usize, Option<usize>), ParseFlow> {
    let cell = world.arrays.get(rules).get(idx).cloned().ok_or_else(|| RaisedError::new(ErrKind::ParseEnd, "parse rule ran out of input"))?;
    world.tracer.on_parse_rule(keyword_name(world, &cell).unwrap_or("clause"), pos as u64);

    if matches!(cell.heart, Heart::Tag) {
        let Payload::Text(text) = &cell.payload else { unreachable!("tags carry Payload::Text") };
        return match &**text {
            "here" => Ok((idx + 1, Some(pos))),
            "end" => Ok((idx + 1, (pos >= world.arrays.get(input).len()).then_some(pos))),
            other => Err(RaisedError::new(ErrKind::ParseCommand, format!("unknown tag rule <{other}>")).into()),
        };
    }

    if matches!(cell.heart, Heart::Word(Sigil::Set)) {
        let sym = cell.symbol.expect("set-word carries a symbol");
        let binding = cell.binding.ok_or_else(|| RaisedError::new(ErrKind::NotBound, "set-word capture target has no binding"))?;
        let mut sub_idx = idx + 1;
        if keyword_at(world, rules, sub_idx) == Some("across") {
            sub_idx += 1;
        }
        let (next_idx, outcome) = match_one_clause(world, rules, sub_idx, end, input, pos, case_sensitive)?;
        let Some(new_pos) = outcome else {
            return Ok((next_idx, None));
        };
        let captured = capture_span(world, input, pos, new_pos)?;
        let mut ctx = Context::from_varlist(binding, ContextKind::Object, &world.arrays);
        ctx.set_or_append(sym, captured, &mut world.arrays, &mut world.tracker)
            .map_err(|e| RaisedError::new(ErrKind::NoMemory, e.to_string()))?;
        return Ok((next_idx, Some(new_pos)));
    }

    if let Some(keyword) = keyword_name(world, &cell) {
        return match keyword {
            "let" => match_one_clause(world, rules, idx + 1, end, input, pos, case_sensitive),
            "some" => match_repeat(world, rules, idx + 1, end, input, pos, case_sensitive, 1, u32::MAX),
            "opt" | "optional" | "try" => match_repeat(world, rules, idx + 1, end, input, pos, case_sensitive, 0, 1),
            "repeat" => match_explicit_repeat(world, rules, idx + 1, end, input, pos, case_sensitive),
            "further" => match_further(world, rules, idx + 1, end, input, pos, case_sensitive),
            "not" => {
                let (next_idx, outcome) = match_one_clause(world, rules, idx + 1, end, input, pos, case_sensitive)?;
                Ok((next_idx, if outcome.is_none() { Some(pos) } else { None }))
            }
            "ahead" => {
                let (next_idx, outcome) = match_one_clause(world, rules, idx + 1, end, input, pos, case_sensitive)?;
                Ok((next_idx, outcome.map(|_| pos)))
            }
            "remove" => {
                let (next_idx, outcome) = match_one_clause(world, rules, idx + 1, end, input, pos, case_sensitive)?;
                let Some(new_pos) = outcome else { return Ok((next_idx, None)) };
                world.arrays.get_mut(input).cells.drain(pos..new_pos);
                Ok((next_idx, Some(pos)))
            }
            "insert" => {
                let (next_idx, cells) = read_value_rule(world, rules, idx + 1, end)?;
                let arr = world.arrays.get_mut(input);
                for (offset, c) in cells.into_iter().enumerate() {
                    arr.cells.insert(pos + offset, c);
                }
                Ok((next_idx, Some(pos)))
            }
            "change" => {
                let (after_target, outcome) = match_one_clause(world, rules, idx + 1, end, input, pos, case_sensitive)?;
                let Some(new_pos) = outcome else { return Ok((after_target, None)) };
                let (next_idx, cells) = read_value_rule(world, rules, after_target, end)?;
                let count = cells.len();
                {
                    let arr = world.arrays.get_mut(input);
                    arr.cells.drain(pos..new_pos);
                    for (offset, c) in cells.into_iter().enumerate() {
                        arr.cells.insert(pos + offset, c);
                    }
                }
                Ok((next_idx, Some(pos + count)))
            }
            "when" => {
                let (next_idx, group_array) = read_group(world, rules, idx + 1, end)?;
                let result = eval_group(world, group_array)?;
                Ok((next_idx, is_truthy(&result).then_some(pos)))
            }
            "accept" => {
                let (_, group_array) = read_group(world, rules, idx + 1, end)?;
                let value = eval_group(world, group_array)?;
                Err(ParseFlow::Accept(value, pos))
            }
            "break" => Err(ParseFlow::Break(pos)),
            "reject" => Err(ParseFlow::Reject),
            "bypass" => Ok((idx + 1, None)),
            "seek" => {
                let (next_idx, target) = read_seek_target(world, rules, idx + 1, end)?;
                let len = world.arrays.get(input).len();
                Ok((next_idx, Some(target.min(len))))
            }
            "one" => Ok((idx + 1, (pos < world.arrays.get(input).len()).then_some(pos + 1))),
            "to" | "thru" => {
                let consume = keyword == "thru";
                let (next_idx, found) = scan_to(world, rules, idx + 1, end, input, pos, case_sensitive, consume)?;
                Ok((next_idx, found))
            }
            "the" => {
                let Some(literal) = world.arrays.get(rules).get(idx + 1).cloned() else {
                    return Err(RaisedError::new(ErrKind::ParseRule, "`the` needs a following literal").into());
                };
                let matched = world.arrays.get(input).get(pos).is_some_and(|c| structural_eq(&literal, c, case_sensitive));
                Ok((idx + 2, matched.then_some(pos + 1)))
            }
            "into" => {
                let (next_idx, sub_rules) = resolve_block_rule(world, rules, idx + 1, end)?;
                let Some(nested) = world.arrays.get(input).get(pos).cloned() else { return Ok((next_idx, None)) };
                let Payload::Series { array: nested_array, .. } = nested.payload else {
                    return Ok((next_idx, None));
                };
                let nested_len = world.arrays.get(nested_array).len();
                match match_alternates(world, sub_rules, 0, world.arrays.get(sub_rules).len(), nested_array, 0, case_sensitive)? {
                    MatchOutcome::Matched(sub_end) if sub_end >= nested_len => Ok((next_idx, Some(pos + 1))),
                    _ => Ok((next_idx, None)),
                }
            }
            _ => Err(RaisedError::new(ErrKind::ParseCommand, format!("unknown parse keyword '{keyword}'")).into()),
        };
    }

    // A bare word (not a keyword) bound to a block is a named sub-rule
    // (spec §5 "word: variable"); anything else resolves through the
    // binding and falls through to literal matching below.
    if matches!(cell.heart, Heart::Word(Sigil::Plain)) {
        let value = resolve_word(world, &cell)?;
        if matches!(value.heart, Heart::Block(_)) {
            let Payload::Series { array: block_array, .. } = value.payload else {
                unreachable!("Heart::Block always carries a Series payload");
            };
            let sub_len = world.arrays.get(block_array).len();
            let outcome = match_alternates(world, block_array, 0, sub_len, input, pos, case_sensitive)?;
            return Ok((idx + 1, match outcome {
                MatchOutcome::Matched(new_pos) => Some(new_pos),
                MatchOutcome::Failed => None,
            }));
        }
        let matched = world.arrays.get(input).get(pos).is_some_and(|c| structural_eq(&value, c, case_sensitive));
        return Ok((idx + 1, matched.then_some(pos + 1)));
    }

    if matches!(cell.heart, Heart::Block(_)) {
        let Payload::Series { array: block_array, .. } = cell.payload else { unreachable!() };
        let sub_len = world.arrays.get(block_array).len();
        let outcome = match_alternates(world, block_array, 0, sub_len, input, pos, case_sensitive)?;
        return Ok((idx + 1, match outcome {
            MatchOutcome::Matched(new_pos) => Some(new_pos),
            MatchOutcome::Failed => None,
        }));
    }

    if matches!(cell.heart, Heart::Group(_)) {
        let Payload::Series { array: group_array, .. } = cell.payload else { unreachable!() };
        eval_group(world, group_array)?;
        return Ok((idx + 1, Some(pos)));
    }

    // Plain literal: match one input cell structurally.
    let matched = world.arrays.get(input).get(pos).is_some_and(|c| structural_eq(&cell, c, case_sensitive));
    Ok((idx + 1, matched.then_some(pos + 1)))
}

/// `some`/`opt`/`optional`/`try`: repeats the single clause at `idx`
/// `min..=max` times (spec §5 "Iterated rule application").
fn match_repeat<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
    input: StubId,
    mut pos: usize,
    case_sensitive: bool,
    min: u32,
    max: u32,
) -> Result<(usize, Option<usize>), ParseFlow> {
    let mut count = 0u32;
    let mut next_idx = idx;
    loop {
        if count >= max {
            break;
        }
        let (after, outcome) = match_one_clause(world, rules, idx, end, input, pos, case_sensitive)?;
        next_idx = after;
        match outcome {
            Some(new_pos) if new_pos != pos || count == 0 => {
                pos = new_pos;
                count += 1;
            }
            _ => break,
        }
    }
    Ok((next_idx, (count >= min).then_some(pos)))
}

/// `repeat (n) rule` / `repeat [min max] rule` (spec §5 reserved keywords).
fn match_explicit_repeat<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
    input: StubId,
    pos: usize,
    case_sensitive: bool,
) -> Result<(usize, Option<usize>), ParseFlow> {
    let Some(count_cell) = world.arrays.get(rules).get(idx).cloned() else {
        return Err(RaisedError::new(ErrKind::ParseRule, "`repeat` needs a count").into());
    };
    let (min, max) = match count_cell.payload.clone() {
        Payload::Series { array, .. } if matches!(count_cell.heart, Heart::Group(_)) => {
            let n = eval_group(world, array)?;
            let Payload::Int(n) = n.payload else { return Err(RaisedError::new(ErrKind::ParseRule, "repeat count must be an integer").into()) };
            (n as u32, n as u32)
        }
        Payload::Series { array, .. } if matches!(count_cell.heart, Heart::Block(_)) => {
            let cells = &world.arrays.get(array).cells;
            let nums: Vec<i64> = cells.iter().filter_map(|c| if let Payload::Int(n) = c.payload { Some(n) } else { None }).collect();
            match nums.as_slice() {
                [one] => (*one as u32, *one as u32),
                [lo, hi, ..] => (*lo as u32, *hi as u32),
                [] => return Err(RaisedError::new(ErrKind::ParseRule, "repeat [min max] needs at least one integer").into()),
            }
        }
        _ => return Err(RaisedError::new(ErrKind::ParseRule, "`repeat` needs (n) or [min max]").into()),
    };
    match_repeat(world, rules, idx + 1, end, input, pos, case_sensitive, min, max)
}

/// `further rule`: the wrapped rule must advance the input position, else
/// this clause fails (spec §5 "further (require advancement per iteration)",
/// used to guard against zero-width loops).
fn match_further<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
    input: StubId,
    pos: usize,
    case_sensitive: bool,
) -> Result<(usize, Option<usize>), ParseFlow> {
    let (next_idx, outcome) = match_one_clause(world, rules, idx, end, input, pos, case_sensitive)?;
    Ok((next_idx, outcome.filter(|&new_pos| new_pos > pos)))
}

/// Scans forward from `pos` until the rule at `idx` matches (spec §5
/// "to/thru: scan forward until rule matches"). `to` stops just before the
/// match; `thru` consumes through it.
fn scan_to<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
    input: StubId,
    mut pos: usize,
    case_sensitive: bool,
    consume: bool,
) -> Result<(usize, Option<usize>), ParseFlow> {
    let input_len = world.arrays.get(input).len();
    loop {
        let (next_idx, outcome) = match_one_clause(world, rules, idx, end, input, pos, case_sensitive)?;
        if let Some(new_pos) = outcome {
            return Ok((next_idx, Some(if consume { new_pos } else { pos })));
        }
        if pos >= input_len {
            return Ok((next_idx, None));
        }
        pos += 1;
    }
}

fn capture_span<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, input: StubId, start: usize, end: usize) -> Result<Cell, RaisedError> {
    let cells: Vec<Cell> = world.arrays.get(input).cells[start..end].iter().map(Cell::clone_value).collect();
    let array = Array::from_cells(Flavor::PlainList, cells);
    let id = world.arrays.allocate(array, &mut world.tracker).map_err(|e| RaisedError::new(ErrKind::NoMemory, e.to_string()))?;
    world.arrays.make_managed(id);
    Ok(Cell::block(id, 0, Sigil::Plain))
}

/// Reads a value-producing rule fragment for `insert`/`change`: a
/// parenthesized code group (evaluated) or a bare literal block/value
/// (spliced/used verbatim).
fn read_value_rule<R: ResourceTracker, T: LevelTracer>(
    world: &mut World<R, T>,
    rules: StubId,
    idx: usize,
    end: usize,
) -> Result<(usize, Vec<Cell>), ParseFlow> {
    let Some(cell) = world.arrays.get(rules).get(idx).cloned() else {
        return Err(RaisedError::new(ErrKind::ParseRule, "insert/change needs a value").into());
    };
    if let Payload::Series { array, .. } = &cell.payload {
        let array = *array;
        if matches!(cell.heart, Heart::Group(_)) {
            let value = eval_group(world, array)?;
            return Ok((idx + 1, vec![value]));
        }
        if matches!(cell.heart, Heart::Block(_)) {
            let cells = world.arrays.get(array).cells.iter().map(Cell::clone_value).collect();
            return Ok((idx + 1, cells));
        }
    }
    let _ = end;
    Ok((idx + 1, vec![cell]))
}

fn read_group<R: ResourceTracker, T: LevelTracer>(world: &World<R, T>, rules: StubId, idx: usize, end: usize) -> Result<(usize, StubId), ParseFlow> {
    let Some(cell) = world.arrays.get(rules).get(idx).cloned() else {
        return Err(RaisedError::new(ErrKind::ParseRule, "expected a (...) code group").into());
    };
    let _ = end;
    let Payload::Series { array, .. } = cell.payload else {
        return Err(RaisedError::new(ErrKind::ParseRule, "expected a (...) code group").into());
    };
    if !matches!(cell.heart, Heart::Group(_)) {
        return Err(RaisedError::new(ErrKind::ParseRule, "expected a (...) code group").into());
    }
    Ok((idx + 1, array))
}

fn read_seek_target<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, rules: StubId, idx: usize, end: usize) -> Result<(usize, usize), ParseFlow> {
    let Some(cell) = world.arrays.get(rules).get(idx).cloned() else {
        return Err(RaisedError::new(ErrKind::ParseRule, "`seek` needs a target").into());
    };
    match &cell.payload {
        Payload::Int(n) => Ok((idx + 1, (*n).max(0) as usize)),
        Payload::Series { array, .. } if matches!(cell.heart, Heart::Group(_)) => {
            let array = *array;
            let value = eval_group(world, array)?;
            let Payload::Int(n) = value.payload else {
                return Err(RaisedError::new(ErrKind::ParseRule, "`seek` group must evaluate to an integer").into());
            };
            Ok((idx + 1, n.max(0) as usize))
        }
        _ => {
            let _ = end;
            Err(RaisedError::new(ErrKind::ParseRule, "`seek` needs an integer or (group)").into())
        }
    }
}

fn resolve_block_rule<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, rules: StubId, idx: usize, end: usize) -> Result<(usize, StubId), ParseFlow> {
    let Some(cell) = world.arrays.get(rules).get(idx).cloned() else {
        return Err(RaisedError::new(ErrKind::ParseRule, "`into` needs a following rule").into());
    };
    let _ = end;
    let resolved = if matches!(cell.heart, Heart::Word(Sigil::Plain)) { resolve_word(world, &cell)? } else { cell };
    let Payload::Series { array, .. } = resolved.payload else {
        return Err(RaisedError::new(ErrKind::ParseRule, "`into` needs a block rule").into());
    };
    Ok((idx + 1, array))
}

fn eval_group<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, group_array: StubId) -> Result<Cell, ParseFlow> {
    match crate::trampoline::run(world, crate::trampoline::top_level(group_array)) {
        Ok(value) => Ok(value),
        Err(EngineStop::Raised(e)) => Err(ParseFlow::Fail(e)),
        Err(EngineStop::Resource(e)) => Err(ParseFlow::Fail(RaisedError::new(ErrKind::NoMemory, e.to_string()))),
        Err(EngineStop::Suspended) => Err(ParseFlow::Fail(RaisedError::new(ErrKind::ParseRule, "parse code group suspended"))),
    }
}

fn resolve_word<R: ResourceTracker, T: LevelTracer>(world: &World<R, T>, cell: &Cell) -> Result<Cell, RaisedError> {
    let binding = cell.binding.ok_or_else(|| RaisedError::new(ErrKind::NotBound, "parse rule word has no binding"))?;
    let sym = cell.symbol.expect("word cells always carry a symbol");
    let ctx = Context::from_varlist(binding, ContextKind::Object, &world.arrays);
    let index = ctx.find(sym, &world.arrays).ok_or_else(|| RaisedError::new(ErrKind::NotBound, format!("unbound parse variable: {}", world.interns.text(sym))))?;
    Ok(ctx.get(index, &world.arrays).clone_value())
}

fn keyword_name<'a, R: ResourceTracker, T: LevelTracer>(world: &'a World<R, T>, cell: &Cell) -> Option<&'a str> {
    if !matches!(cell.heart, Heart::Word(Sigil::Plain)) {
        return None;
    }
    let text = world.interns.text(cell.symbol?);
    RESERVED.iter().find(|&&k| k == text).copied()
}

fn keyword_at<R: ResourceTracker, T: LevelTracer>(world: &World<R, T>, rules: StubId, idx: usize) -> Option<&'static str> {
    let cell = world.arrays.get(rules).get(idx)?;
    keyword_name(world, cell)
}

const RESERVED: &[&str] = &[
    "some", "opt", "optional", "try", "repeat", "further", "let", "not", "ahead", "remove", "insert", "change", "when",
    "accept", "break", "reject", "bypass", "seek", "one", "to", "thru", "the", "into", "across",
];

fn is_truthy(cell: &Cell) -> bool {
    if cell.is_antiform() {
        return false;
    }
    !matches!(cell.payload, Payload::Logic(false)) && !matches!(cell.heart, Heart::Blank)
}

/// Structural equality for literal-match rules: same kind, same immediate
/// payload. `Text` compares case-insensitively unless `case_sensitive`.
fn structural_eq(a: &Cell, b: &Cell, case_sensitive: bool) -> bool {
    match (&a.payload, &b.payload) {
        (Payload::Int(x), Payload::Int(y)) => x == y,
        (Payload::Dec(x), Payload::Dec(y)) => x == y,
        (Payload::Logic(x), Payload::Logic(y)) => x == y,
        (Payload::Text(x), Payload::Text(y)) => {
            if case_sensitive {
                x == y
            } else {
                x.eq_ignore_ascii_case(y)
            }
        }
        _ => match (a.heart, b.heart) {
            (Heart::Word(_), Heart::Word(_)) => a.symbol == b.symbol,
            _ => false,
        },
    }
}
