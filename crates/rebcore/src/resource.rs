//! Resource limits, countdown/ballast bookkeeping, and cancellation polling.
//!
//! Mirrors the teacher's `ResourceTracker` split (`NoLimitTracker` / `LimitedTracker`)
//! so the trampoline can be parameterized over either with zero overhead in the
//! common case. See spec §4.2 ("Ordering & cancellation") and §4.6 ("Ballast").

use std::time::{Duration, Instant};

/// Error returned when a configured resource limit is exceeded.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// GC ballast depleted under a hard stub-count cap.
    Stubs { limit: usize, count: usize },
    /// The trampoline's tick countdown reached zero under a hard cap.
    Ticks { limit: u64, count: u64 },
    /// Wall-clock execution budget exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Level-stack depth exceeded (unbounded recursion guard).
    Recursion { limit: usize, depth: usize },
    /// A cooperative cancellation request arrived via signal polling.
    Cancelled,
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stubs { limit, count } => write!(f, "stub limit exceeded: {count} > {limit}"),
            Self::Ticks { limit, count } => write!(f, "tick limit exceeded: {count} > {limit}"),
            Self::Time { limit, elapsed } => write!(f, "time limit exceeded: {elapsed:?} > {limit:?}"),
            Self::Recursion { limit, depth } => write!(f, "level stack depth {depth} exceeds limit {limit}"),
            Self::Cancelled => f.write_str("execution cancelled"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Configuration for the GC ballast and fuzz-injection cadence (spec §4.6).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct GcConfig {
    /// Stubs allocatable before a cycle is triggered; reset after each cycle.
    pub ballast: usize,
    /// When set, force a collection every N ticks regardless of ballast (fuzzing).
    pub fuzz_every_n_ticks: Option<u32>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { ballast: 64 * 1024, fuzz_every_n_ticks: None }
    }
}

/// Soft limits a `LimitedTracker` enforces; all `None` by default (unrestricted).
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    pub max_stubs: Option<usize>,
    pub max_ticks: Option<u64>,
    pub max_duration: Option<Duration>,
    pub max_recursion_depth: Option<usize>,
}

/// Parameterizes the trampoline over how aggressively it checks limits.
///
/// `NoLimitTracker::check_*` are `#[inline]` no-ops that the optimizer removes
/// entirely, so embedding without limits costs nothing on the hot dispatch path —
/// the same zero-cost-abstraction argument the teacher makes for `NoLimitTracker`.
pub trait ResourceTracker {
    fn on_allocate(&mut self) -> Result<(), ResourceError>;
    fn on_free(&mut self);
    fn check_time(&mut self) -> Result<(), ResourceError>;
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;
    fn tick(&mut self) -> Result<(), ResourceError>;

    fn allocation_count(&self) -> Option<usize> {
        None
    }
}

/// Default tracker: no limits, minimal bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
    #[inline]
    fn on_free(&mut self) {}
    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
    #[inline]
    fn check_recursion_depth(&self, _current_depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }
    #[inline]
    fn tick(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Tracker enforcing configured soft limits — for sandboxed embedding hosts.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    stub_count: usize,
    tick_count: u64,
    started: Instant,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits, stub_count: 0, tick_count: 0, started: Instant::now() }
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        self.stub_count += 1;
        if let Some(limit) = self.limits.max_stubs
            && self.stub_count > limit
        {
            return Err(ResourceError::Stubs { limit, count: self.stub_count });
        }
        Ok(())
    }

    fn on_free(&mut self) {
        self.stub_count = self.stub_count.saturating_sub(1);
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(limit) = self.limits.max_duration {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(ResourceError::Time { limit, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.limits.max_recursion_depth
            && current_depth >= limit
        {
            return Err(ResourceError::Recursion { limit, depth: current_depth });
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), ResourceError> {
        self.tick_count += 1;
        if let Some(limit) = self.limits.max_ticks
            && self.tick_count > limit
        {
            return Err(ResourceError::Ticks { limit, count: self.tick_count });
        }
        self.check_time()
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.stub_count)
    }
}
