//! The three executors that drive dispatch on the level stack (spec §4.3,
//! §4.4, §4.5): single-step evaluation, action calls, and whole-array
//! evaluation. Each exposes a `step` function with the uniform signature the
//! [`crate::trampoline::dispatch`] switch expects.

pub mod action;
pub mod evaluator;
pub mod stepper;

use crate::cell::Cell;
use crate::level::Level;

/// Reads the cell the feed currently points at, cloning it into `level.spare`
/// so the borrow on the feed's backing array ends before dispatch mutates
/// other parts of the level (spec §4.1: feed reads are by-value snapshots,
/// the array itself is never mutated by ordinary evaluation).
pub(crate) fn current_cell(level: &Level, arrays: &crate::arena::Arena<crate::array::Array>) -> Option<Cell> {
    level.feed.at(arrays).cloned()
}
