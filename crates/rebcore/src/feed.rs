//! Forward-only cursor over a cell sequence (spec §3, §4.1 "Feed").
//!
//! Grounded on the per-frame instruction cursor pattern in
//! `bytecode/vm/mod.rs` (each running frame caches its own position and the
//! VM's main loop reloads that cache after a call returns); here the cursor
//! walks an [`Array`] of cells rather than a byte-coded instruction stream.

use crate::arena::{Arena, StubId};
use crate::array::Array;
use crate::cell::Cell;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedFlags {
    /// Suppresses backward-quote and infix lookahead for exactly one step
    /// (spec §4.3 "tight" infix and "no-lookahead" under soft/meta deferral).
    pub no_lookahead: bool,
    /// Set by a `defer`-flagged infix action until the next step resolves it.
    pub deferring_infix: bool,
    /// The feed has taken a hold on its backing array (spec §5 "took-hold").
    pub took_hold: bool,
}

/// A forward cursor over an array-backed cell sequence.
///
/// Invariants (spec §4.1): after `advance`, `at()` reflects the next element;
/// `lookback()` holds the cell that was at the position before the most
/// recent `advance` and stays valid until the next `advance`; advancing
/// clears the cached `gotten` binding.
#[derive(Debug, Clone)]
pub struct Feed {
    array: StubId,
    index: usize,
    lookback: Option<Cell>,
    /// Cached binding lookup of the cell currently at `index`, invalidated by
    /// every `advance` (spec §4.1 "invalidate_cache").
    gotten: Option<StubId>,
    pub flags: FeedFlags,
}

impl Feed {
    #[must_use]
    pub fn new(array: StubId) -> Self {
        Self { array, index: 0, lookback: None, gotten: None, flags: FeedFlags::default() }
    }

    #[must_use]
    pub fn at<'a>(&self, arrays: &'a Arena<Array>) -> Option<&'a Cell> {
        arrays.get(self.array).get(self.index)
    }

    /// Reads one cell beyond the current position without advancing, used by
    /// backward-quote lookahead (spec §4.1 invariant: "a single step may read
    /// one cell beyond current position").
    #[must_use]
    pub fn peek_next<'a>(&self, arrays: &'a Arena<Array>) -> Option<&'a Cell> {
        arrays.get(self.array).get(self.index + 1)
    }

    #[must_use]
    pub fn is_end(&self, arrays: &Arena<Array>) -> bool {
        self.index >= arrays.get(self.array).len()
    }

    pub fn advance(&mut self, arrays: &Arena<Array>) {
        self.lookback = self.at(arrays).cloned();
        self.index += 1;
        self.invalidate_cache();
    }

    #[must_use]
    pub fn lookback(&self) -> Option<&Cell> {
        self.lookback.as_ref()
    }

    #[must_use]
    pub fn cached_binding(&self) -> Option<StubId> {
        self.gotten
    }

    pub fn set_cached_binding(&mut self, binding: StubId) {
        self.gotten = Some(binding);
    }

    pub fn invalidate_cache(&mut self) {
        self.gotten = None;
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn array(&self) -> StubId {
        self.array
    }

    /// Builds a feed for a variadic (inline) cell sequence by first
    /// materializing it into an array (spec §4.1: "the GC requires variadic
    /// sources be materialised into array form before any collection cycle").
    #[must_use]
    pub fn from_variadic(
        cells: impl IntoIterator<Item = Cell>,
        arrays: &mut Arena<Array>,
        tracker: &mut impl crate::resource::ResourceTracker,
    ) -> Self {
        let array = Array::from_cells(crate::array::Flavor::PlainList, cells);
        let id = arrays.allocate(array, tracker).expect("variadic materialization under NoLimitTracker cannot fail");
        arrays.make_managed(id);
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn advance_updates_lookback_and_clears_cache() {
        let mut arrays = Arena::new();
        let mut tracker = NoLimitTracker;
        let array = Array::from_cells(crate::array::Flavor::PlainList, [Cell::integer(1), Cell::integer(2)]);
        let id = arrays.allocate(array, &mut tracker).unwrap();
        let mut feed = Feed::new(id);
        feed.set_cached_binding(id);
        assert!(feed.cached_binding().is_some());
        feed.advance(&arrays);
        assert!(feed.cached_binding().is_none(), "advance must invalidate the cache");
        assert!(matches!(feed.lookback().unwrap().payload, crate::cell::Payload::Int(1)));
        assert!(matches!(feed.at(&arrays).unwrap().payload, crate::cell::Payload::Int(2)));
    }
}
