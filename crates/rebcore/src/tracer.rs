//! Trampoline execution tracing — ambient observability, zero-cost when unused.
//!
//! Mirrors the teacher's `VmTracer` trait: hook points at dispatch, push/pop,
//! throw, and GC boundaries, with `NoopTracer` compiling away entirely through
//! monomorphization. See spec §4.2 ("Ticks") and §4.6 ("Fuzzing mode").

use crate::error::ThrowLabel;

/// One recorded execution event, used by [`RecordingTracer`] for deterministic
/// replay or post-mortem inspection.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Dispatch { tick: u64, executor: &'static str, state: u32 },
    Push { tick: u64, executor: &'static str },
    Pop { tick: u64, bounce_kind: &'static str },
    Throw { tick: u64, label: String },
    GcStart { tick: u64 },
    GcEnd { tick: u64, freed: usize },
    ParseRule { rule_kind: &'static str, position: u64 },
}

/// Hook points a tracer implementation may observe.
pub trait LevelTracer {
    fn on_dispatch(&mut self, _tick: u64, _executor: &'static str, _state: u32) {}
    fn on_push(&mut self, _tick: u64, _executor: &'static str) {}
    fn on_pop(&mut self, _tick: u64, _bounce_kind: &'static str) {}
    fn on_throw(&mut self, _tick: u64, _label: &ThrowLabel) {}
    fn on_gc_start(&mut self, _tick: u64) {}
    fn on_gc_end(&mut self, _tick: u64, _freed: usize) {}
    /// A parse clause was entered (spec §5's call-stack observability,
    /// `rule_kind` names the keyword or "clause" for a plain literal match).
    fn on_parse_rule(&mut self, _rule_kind: &'static str, _position: u64) {}
}

/// Production default: every hook is an empty inline function the optimizer removes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl LevelTracer for NoopTracer {}

/// Human-readable dispatch log to stderr, for interactive debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl LevelTracer for StderrTracer {
    fn on_dispatch(&mut self, tick: u64, executor: &'static str, state: u32) {
        eprintln!("[{tick}] dispatch {executor} state={state}");
    }

    fn on_throw(&mut self, tick: u64, label: &ThrowLabel) {
        eprintln!("[{tick}] throw {label:?}");
    }

    fn on_gc_start(&mut self, tick: u64) {
        eprintln!("[{tick}] gc start");
    }

    fn on_gc_end(&mut self, tick: u64, freed: usize) {
        eprintln!("[{tick}] gc end, freed={freed}");
    }

    fn on_parse_rule(&mut self, rule_kind: &'static str, position: u64) {
        eprintln!("[parse] {rule_kind} @ {position}");
    }
}

/// Records every event for later inspection — used by fuzzing and §8's
/// deterministic-debugging scenarios (spec §4.2 "Ticks").
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl LevelTracer for RecordingTracer {
    fn on_dispatch(&mut self, tick: u64, executor: &'static str, state: u32) {
        self.events.push(TraceEvent::Dispatch { tick, executor, state });
    }

    fn on_push(&mut self, tick: u64, executor: &'static str) {
        self.events.push(TraceEvent::Push { tick, executor });
    }

    fn on_pop(&mut self, tick: u64, bounce_kind: &'static str) {
        self.events.push(TraceEvent::Pop { tick, bounce_kind });
    }

    fn on_throw(&mut self, tick: u64, label: &ThrowLabel) {
        self.events.push(TraceEvent::Throw { tick, label: format!("{label:?}") });
    }

    fn on_gc_start(&mut self, tick: u64) {
        self.events.push(TraceEvent::GcStart { tick });
    }

    fn on_gc_end(&mut self, tick: u64, freed: usize) {
        self.events.push(TraceEvent::GcEnd { tick, freed });
    }

    fn on_parse_rule(&mut self, rule_kind: &'static str, position: u64) {
        self.events.push(TraceEvent::ParseRule { rule_kind, position });
    }
}
