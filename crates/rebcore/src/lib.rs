//! A trampoline-driven evaluator for a homoiconic symbolic language: a cell
//! model with a quote/antiform ladder, a non-recursive level-stack trampoline,
//! stepper/action/evaluator/subparse executors, a mark-and-sweep collector,
//! and a parse combinator dialect.

pub mod api;
pub mod arena;
pub mod array;
pub mod cell;
pub mod context;
pub mod error;
pub mod executors;
pub mod feed;
pub mod gc;
pub mod level;
pub mod parse;
pub mod resource;
pub mod symbol;
pub mod tracer;
pub mod trampoline;

pub use crate::{
    arena::{Arena, StubId, StubPoolDiff, StubPoolStats},
    array::{Array, Flavor},
    cell::{Cell, CellFlags, Heart, InfixMode, ParamClass, Payload, Sigil},
    context::{Context, ContextKind},
    error::{EmbedError, ErrKind, RaisedError, RunResult, ThrowLabel, Thrown},
    feed::Feed,
    level::{Bounce, ExecutorKind, Level, LevelFlags, LevelScratch},
    resource::{GcConfig, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    symbol::{Interns, SymbolId},
    tracer::{LevelTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    trampoline::{EngineStop, World},
};
