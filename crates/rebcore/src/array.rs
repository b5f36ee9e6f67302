//! Dynamic cell sequences and the flavors built on top of them (spec §3
//! "Array"): plain lists, keylists, varlists, and paramlists share one
//! growable-vector-of-cells representation distinguished by a [`Flavor`] tag,
//! the way the teacher's `heap.rs` `HeapData` variants share one node shape
//! distinguished by a discriminant.

use smallvec::SmallVec;

use crate::arena::StubId;
use crate::cell::Cell;

/// What an [`Array`]'s cells mean. Spec §3: "a header node carrying flavor
/// (plain list, keylist, varlist, details, paramlist, patch, pairlist,
/// node-list, etc.)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// An ordinary block/group/path/tuple body.
    PlainList,
    /// A context's parallel key array: `keylist[0]` is the rootkey.
    Keylist,
    /// A context's parallel value array: `varlist[0]` is the rootvar archetype.
    Varlist,
    /// An action's compiled body / dispatcher record.
    Details,
    /// An action's parameter list (names + type predicates).
    Paramlist,
    /// A module-scope hitch-ring link (spec §4.6 "Module iteration").
    Patch,
    /// Alternating key/value pairs (used by `namedtuple`-like structures).
    Pairlist,
}

/// A growable sequence of cells with one flavor tag and two GC-traced link
/// slots (spec §3: "a shared 'bonus' slot..., link/misc slots optionally
/// holding node references"). Grounded on `heap.rs`'s node shape, generalized
/// from refcounted ownership to arena/mark-sweep ownership (see
/// `DESIGN.md`'s Open-Question resolution).
#[derive(Debug, Clone)]
pub struct Array {
    pub flavor: Flavor,
    pub cells: SmallVec<[Cell; 4]>,
    /// E.g. a varlist's back-pointer to its keylist, or a keylist's shared-flag
    /// ancestor link for copy-on-write forking (spec §9 "Shared keylists").
    pub bonus: Option<StubId>,
    /// E.g. a patch's next-in-hitch-ring link.
    pub link: Option<StubId>,
    pub misc: Option<StubId>,
    /// True once expansion would require forking (copy-on-write sharing flag).
    pub shared: bool,
}

impl Array {
    #[must_use]
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor, cells: SmallVec::new(), bonus: None, link: None, misc: None, shared: false }
    }

    #[must_use]
    pub fn from_cells(flavor: Flavor, cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut array = Self::new(flavor);
        array.cells.extend(cells);
        array
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    /// Forks a copy-on-write keylist before mutation if it's shared, returning
    /// whether a fork happened (spec §9 "Shared keylists with copy-on-write").
    /// The forked copy carries an `ancestor` link back via `bonus` so derived
    /// operations can still find the lineage.
    pub fn fork_if_shared(this: StubId, arena: &mut crate::arena::Arena<Array>) -> StubId {
        if !arena.get(this).shared {
            return this;
        }
        let mut forked = arena.get(this).clone();
        forked.shared = false;
        forked.bonus = Some(this);
        let mut tracker = crate::resource::NoLimitTracker;
        arena.allocate(forked, &mut tracker).expect("fork allocation under NoLimitTracker cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cells_preserves_order() {
        let array = Array::from_cells(Flavor::PlainList, [Cell::integer(1), Cell::integer(2)]);
        assert_eq!(array.len(), 2);
        assert!(matches!(array.get(0).unwrap().payload, crate::cell::Payload::Int(1)));
    }
}
