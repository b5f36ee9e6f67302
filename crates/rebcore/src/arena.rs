//! Uniform stub pool: the single allocator backing arrays, pairings, contexts,
//! and API cells (spec §4.6 "Allocation invariants").
//!
//! Every stub is either *unmanaged* (its allocating site must free it explicitly),
//! *managed* (the GC owns it and will sweep it when unmarked), or *free* (recycled,
//! available for reuse). This is a deliberate departure from the teacher's
//! refcounted `Heap` (`heap.rs`): spec §4.6 calls for a tracing mark-and-sweep
//! collector, so stubs carry a mark bit and an ownership tri-state instead of a
//! reference count. The slot-pool shape — index-stable handles, a free list, and
//! `HeapStats`-style accounting — is reused directly.

use ahash::AHashMap;

use crate::resource::{ResourceError, ResourceTracker};

/// Stable index into an [`Arena`]. Never reused while the slot it names is live;
/// once freed the slot is recycled but the generation counter changes, so a stale
/// `StubId` captured before a free is detected rather than silently aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Owning site must call `Arena::free` explicitly.
    Unmanaged,
    /// The GC owns this stub; unmarked stubs are reclaimed on sweep.
    Managed,
}

struct Slot<T> {
    data: Option<T>,
    ownership: Ownership,
    marked: bool,
    generation: u32,
}

/// A pool of uniformly-sized stubs of type `T`, addressed by [`StubId`].
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live_count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free_list: Vec::new(), live_count: 0 }
    }
}

impl<T> Arena<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new stub, returning its id. Starts unmanaged; call
    /// [`Arena::make_managed`] once the stub becomes reachable from a root other
    /// than its allocating site (spec §4.6: "Arrays are owned by their allocating
    /// site until explicitly managed; once managed, the GC becomes owner").
    pub fn allocate(&mut self, data: T, tracker: &mut impl ResourceTracker) -> Result<StubId, ResourceError> {
        tracker.on_allocate()?;
        self.live_count += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            slot.ownership = Ownership::Unmanaged;
            slot.marked = false;
            slot.generation = slot.generation.wrapping_add(1);
            return Ok(StubId(index));
        }
        self.slots.push(Slot { data: Some(data), ownership: Ownership::Unmanaged, marked: false, generation: 0 });
        Ok(StubId((self.slots.len() - 1) as u32))
    }

    pub fn make_managed(&mut self, id: StubId) {
        self.slots[id.0 as usize].ownership = Ownership::Managed;
    }

    #[must_use]
    pub fn ownership(&self, id: StubId) -> Ownership {
        self.slots[id.0 as usize].ownership
    }

    #[must_use]
    pub fn get(&self, id: StubId) -> &T {
        self.slots[id.0 as usize].data.as_ref().expect("stub id does not name a live slot")
    }

    pub fn get_mut(&mut self, id: StubId) -> &mut T {
        self.slots[id.0 as usize].data.as_mut().expect("stub id does not name a live slot")
    }

    #[must_use]
    pub fn is_marked(&self, id: StubId) -> bool {
        self.slots[id.0 as usize].marked
    }

    /// Marks `id`; returns `true` if it was previously unmarked (i.e. this call
    /// should enqueue the stub's children for further marking).
    pub fn mark(&mut self, id: StubId) -> bool {
        let slot = &mut self.slots[id.0 as usize];
        let was_marked = slot.marked;
        slot.marked = true;
        !was_marked
    }

    /// Frees an unmanaged stub explicitly (owner-directed deallocation).
    pub fn free(&mut self, id: StubId, tracker: &mut impl ResourceTracker) {
        let slot = &mut self.slots[id.0 as usize];
        debug_assert_eq!(slot.ownership, Ownership::Unmanaged, "managed stubs are freed only by sweep");
        slot.data = None;
        self.free_list.push(id.0);
        self.live_count -= 1;
        tracker.on_free();
    }

    /// Sweep pass (spec §4.6): reclaim every managed, unmarked slot; clear the
    /// mark bit on everything else managed; leave unmanaged slots untouched.
    /// Returns the number of stubs reclaimed.
    pub fn sweep(&mut self, tracker: &mut impl ResourceTracker) -> usize {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.data.is_none() {
                continue;
            }
            match slot.ownership {
                Ownership::Unmanaged => {}
                Ownership::Managed if slot.marked => slot.marked = false,
                Ownership::Managed => {
                    slot.data = None;
                    self.free_list.push(index as u32);
                    self.live_count -= 1;
                    tracker.on_free();
                    freed += 1;
                }
            }
        }
        freed
    }

    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn live_ids(&self) -> impl Iterator<Item = StubId> + '_ {
        self.slots.iter().enumerate().filter(|(_, s)| s.data.is_some()).map(|(i, _)| StubId(i as u32))
    }
}

/// Snapshot of arena state, grouped by a caller-chosen type tag — the analogue of
/// the teacher's `HeapStats` (spec §8 scenario 6, "`recycle recycle` returns zero").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubPoolStats {
    pub live: usize,
    pub free: usize,
    pub total: usize,
    pub by_flavor: AHashMap<&'static str, usize>,
}

/// Difference between two [`StubPoolStats`] snapshots; positive means growth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubPoolDiff {
    pub live_delta: isize,
    pub free_delta: isize,
    pub by_flavor_delta: AHashMap<&'static str, isize>,
}

impl StubPoolStats {
    #[must_use]
    pub fn diff(&self, after: &Self) -> StubPoolDiff {
        let mut by_flavor_delta = AHashMap::new();
        for (&flavor, &before_count) in &self.by_flavor {
            let after_count = after.by_flavor.get(flavor).copied().unwrap_or(0);
            by_flavor_delta.insert(flavor, after_count as isize - before_count as isize);
        }
        for (&flavor, &after_count) in &after.by_flavor {
            by_flavor_delta.entry(flavor).or_insert(after_count as isize);
        }
        StubPoolDiff {
            live_delta: after.live as isize - self.live as isize,
            free_delta: after.free as isize - self.free as isize,
            by_flavor_delta,
        }
    }
}
