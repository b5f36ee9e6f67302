//! Per-activation records and the trampoline's sum-typed return value (spec
//! §3 "Frame/Activation (Level)", §4.2 "Bounce").
//!
//! Grounded on `bytecode/vm/call.rs`'s `CallResult` (a small enum telling the
//! VM's run loop what to do after a call: keep going, a new frame was pushed,
//! the call finished, propagate an exception) — `Bounce` generalizes that one
//! call site's return value into the uniform contract every executor in this
//! engine returns.

use crate::cell::Cell;
use crate::context::Context;
use crate::error::{RaisedError, ThrowLabel};
use crate::executors::action::ActionScratch;
use crate::executors::evaluator::EvaluatorScratch;
use crate::executors::stepper::StepperPending;
use crate::feed::Feed;
use crate::parse::ParseScratch;

/// Which state machine drives a level's dispatch (spec §4.2 point 1:
/// "Invokes `top.executor(top)`"). A closed enum rather than a function
/// pointer, per spec §9's design note preferring "a dense table... or an enum
/// with exhaustive match" over replicating a switch-on-function-pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Stepper,
    Evaluator,
    Action,
    Subparse,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LevelFlags {
    /// Re-entered after an unwind so the executor can run cleanup (spec §4.2
    /// "dispatcher-catches").
    pub catches_throws: bool,
    pub throwing: bool,
    /// Left-quote-path flag kept across an action and an ensuing infix (spec
    /// §4.4 "Cleanup").
    pub left_quote_path: bool,
}

/// Executor-specific scratch, freed when its phase ends (spec §3: "Union for
/// executor-specific scratch"). Modeled as an enum rather than a raw union —
/// Rust has no unsafe union-of-non-Copy-types need here since each executor
/// owns this level exclusively while it runs.
#[derive(Debug)]
pub enum LevelScratch {
    None,
    Stepper(StepperPending),
    Action(ActionScratch),
    Evaluator(EvaluatorScratch),
    Parse(ParseScratch),
}

impl LevelScratch {
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::None)
    }
}

/// One activation record on the trampoline's level stack (spec §3 "Level").
#[derive(Debug)]
pub struct Level {
    pub feed: Feed,
    /// Output cell: where this level's result lands for its caller to read.
    pub out: Cell,
    pub spare: Cell,
    pub scratch_cell: Cell,
    /// Present while this level is an action call's frame.
    pub varlist: Option<Context>,
    pub executor: ExecutorKind,
    pub state: u32,
    pub flags: LevelFlags,
    pub label: Option<crate::symbol::SymbolId>,
    pub scratch: LevelScratch,
}

impl Level {
    #[must_use]
    pub fn new(feed: Feed, executor: ExecutorKind) -> Self {
        Self {
            feed,
            out: Cell::trash(),
            spare: Cell::trash(),
            scratch_cell: Cell::trash(),
            varlist: None,
            executor,
            state: 0,
            flags: LevelFlags::default(),
            label: None,
            scratch: LevelScratch::None,
        }
    }
}

/// The trampoline's sum-typed return value (spec §4.2 "Bounce").
pub enum Bounce {
    /// This level completed; pop it and hand control to its caller.
    Out,
    /// A sublevel was pushed; keep executing (the sublevel is now on top).
    Continue,
    /// Like `Continue`, but this level's output *is* the sublevel's output,
    /// and this level will not be re-entered except for cleanup.
    Delegate,
    /// This level yields; control returns to the host.
    Suspend,
    /// Unwind until a level with `catches_throws` set handles this.
    Thrown(crate::error::Thrown),
    /// Re-run this level's dispatch. `recheck_types` re-runs typechecking first.
    Redo { recheck_types: bool },
    /// Convert to a `Thrown` carrying an error label.
    Fail(RaisedError),
}

impl Bounce {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::Continue => "continue",
            Self::Delegate => "delegate",
            Self::Suspend => "suspend",
            Self::Thrown(_) => "thrown",
            Self::Redo { .. } => "redo",
            Self::Fail(_) => "fail",
        }
    }
}

impl From<RaisedError> for Bounce {
    fn from(err: RaisedError) -> Self {
        Self::Fail(err)
    }
}

#[must_use]
pub fn throw(label: ThrowLabel, value: Cell) -> Bounce {
    Bounce::Thrown(crate::error::Thrown { label, value })
}
