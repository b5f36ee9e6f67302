//! Whole-array evaluation (spec §4.5 "Evaluator executor"): repeatedly steps
//! until the feed is exhausted, threading a "primed" holding cell so an
//! invisible (ghost) result never clobbers the last real value.
//!
//! Grounded on `bytecode/vm/mod.rs`'s top-level `run` loop, which iterates
//! its frame's instruction stream to completion and returns the last
//! meaningful value -- the same shape as DO'ing a block to its final result.

use crate::cell::{Cell, Heart};
use crate::level::{Bounce, ExecutorKind, Level};
use crate::resource::ResourceTracker;
use crate::tracer::LevelTracer;
use crate::trampoline::World;

const START: u32 = 0;
const AFTER_STEP: u32 = 1;

/// Holds the "primed" result across steps, preserving a real value through
/// any number of trailing invisible (comma/ghost) steps (spec §4.5: "an
/// invisible result leaves the prior primed value untouched").
#[derive(Debug, Clone, Default)]
pub struct EvaluatorScratch {
    pub primed: Option<Cell>,
}

pub fn step<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    match stack[depth].state {
        START => begin_step(world, stack, depth),
        AFTER_STEP => {
            absorb_step_result(stack, depth);
            begin_step(world, stack, depth)
        }
        other => unreachable!("evaluator has no state {other}"),
    }
}

fn begin_step<R: ResourceTracker, T: LevelTracer>(world: &mut World<R, T>, stack: &mut Vec<Level>, depth: usize) -> Bounce {
    if stack[depth].feed.is_end(&world.arrays) {
        let primed = match &stack[depth].scratch {
            crate::level::LevelScratch::Evaluator(s) => s.primed.clone(),
            _ => None,
        };
        stack[depth].out = primed.unwrap_or_else(|| Cell::trash().into_antiform());
        return Bounce::Out;
    }
    stack[depth].state = AFTER_STEP;
    let sub = Level::new(stack[depth].feed.clone(), ExecutorKind::Stepper);
    stack.push(sub);
    Bounce::Continue
}

/// Folds one completed step's result into the held "primed" value, skipping
/// over ghost (invisible) results -- a bare comma's output is
/// `Heart::Trash`, which never overwrites an already-primed real value
/// (spec §4.5 "ghost preservation").
fn absorb_step_result(stack: &mut Vec<Level>, depth: usize) {
    let result = stack[depth].spare.clone_value();
    let is_ghost = matches!(result.heart, Heart::Trash) && !result.is_antiform();
    let scratch = match &mut stack[depth].scratch {
        crate::level::LevelScratch::Evaluator(s) => s,
        _ => {
            stack[depth].scratch = crate::level::LevelScratch::Evaluator(EvaluatorScratch::default());
            match &mut stack[depth].scratch {
                crate::level::LevelScratch::Evaluator(s) => s,
                _ => unreachable!(),
            }
        }
    };
    if !is_ghost {
        scratch.primed = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_step_does_not_clobber_primed_value() {
        let mut stack = vec![Level::new(crate::feed::Feed::new(crate::arena::StubId(0)), ExecutorKind::Evaluator)];
        stack[0].scratch = crate::level::LevelScratch::Evaluator(EvaluatorScratch { primed: Some(Cell::integer(5)) });
        stack[0].spare = Cell::trash();
        absorb_step_result(&mut stack, 0);
        match &stack[0].scratch {
            crate::level::LevelScratch::Evaluator(s) => {
                assert!(matches!(s.primed.as_ref().unwrap().payload, crate::cell::Payload::Int(5)));
            }
            _ => panic!("expected evaluator scratch"),
        }
    }

    #[test]
    fn real_step_overwrites_primed_value() {
        let mut stack = vec![Level::new(crate::feed::Feed::new(crate::arena::StubId(0)), ExecutorKind::Evaluator)];
        stack[0].scratch = crate::level::LevelScratch::Evaluator(EvaluatorScratch { primed: Some(Cell::integer(5)) });
        stack[0].spare = Cell::integer(9);
        absorb_step_result(&mut stack, 0);
        match &stack[0].scratch {
            crate::level::LevelScratch::Evaluator(s) => {
                assert!(matches!(s.primed.as_ref().unwrap().payload, crate::cell::Payload::Int(9)));
            }
            _ => panic!("expected evaluator scratch"),
        }
    }
}
