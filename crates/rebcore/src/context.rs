//! Contexts: paired keylist + varlist representing objects, frames, modules,
//! errors, and ports (spec §3 "Context").
//!
//! Grounded on `namespace.rs`'s parallel key/value namespace layout, adapted
//! from Python's flat name→slot namespace to the spec's explicit
//! keylist[i]/varlist[i] pairing with a rootkey/rootvar archetype at index 0.

use crate::arena::{Arena, StubId};
use crate::array::{Array, Flavor};
use crate::cell::Cell;
use crate::resource::ResourceTracker;
use crate::symbol::SymbolId;

/// What kind of archetype a context's `varlist[0]` (rootvar) represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Object,
    Frame,
    Module,
    Error,
    Port,
}

/// A context handle: the keylist/varlist pair plus its archetype kind.
/// `keylist[0]` (the rootkey) is a tombstone for ordinary contexts, or a
/// back-reference to the running [`crate::level::Level`] when this context is
/// a live activation's frame (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub kind: ContextKind,
    pub keylist: StubId,
    pub varlist: StubId,
}

impl Context {
    /// Reconstructs a `Context` handle from a bare varlist id, the way a
    /// bound word's cached `binding` slot stores only the varlist (spec §3
    /// "cached 'gotten' binding"). The keylist is recovered via the
    /// varlist's `bonus` link set up by [`Context::new`]/[`Context::append`].
    /// `kind` is not recoverable from the varlist alone, so callers that
    /// only need `find`/`get`/`get_mut`/`append` may pass a nominal kind.
    #[must_use]
    pub fn from_varlist(varlist: StubId, kind: ContextKind, arrays: &Arena<Array>) -> Self {
        let keylist = arrays.get(varlist).bonus.expect("varlist must carry a keylist bonus link");
        Self { kind, keylist, varlist }
    }

    /// Sets an existing binding's value, or appends a new one if `sym` is
    /// unbound in this context (spec §4.3 "set-word: evaluates the right
    /// side and stores it").
    pub fn set_or_append(
        &mut self,
        sym: SymbolId,
        value: Cell,
        arrays: &mut Arena<Array>,
        tracker: &mut impl ResourceTracker,
    ) -> Result<usize, crate::resource::ResourceError> {
        if let Some(index) = self.find(sym, arrays) {
            *self.get_mut(index, arrays) = value;
            Ok(index)
        } else {
            self.append(sym, value, arrays, tracker)
        }
    }

    /// Builds an empty context (just the rootvar/rootkey slot at index 0).
    pub fn new(
        kind: ContextKind,
        arrays: &mut Arena<Array>,
        tracker: &mut impl ResourceTracker,
    ) -> Result<Self, crate::resource::ResourceError> {
        let mut keylist = Array::new(Flavor::Keylist);
        keylist.cells.push(Cell::trash()); // rootkey tombstone
        let mut varlist = Array::new(Flavor::Varlist);
        varlist.cells.push(Cell::trash()); // rootvar archetype, filled in by caller

        let keylist_id = arrays.allocate(keylist, tracker)?;
        let varlist_id = arrays.allocate(varlist, tracker)?;
        arrays.get_mut(varlist_id).bonus = Some(keylist_id);
        arrays.make_managed(keylist_id);
        arrays.make_managed(varlist_id);
        Ok(Self { kind, keylist: keylist_id, varlist: varlist_id })
    }

    /// Number of key/value pairs, excluding the rootkey/rootvar slot.
    #[must_use]
    pub fn len(&self, arrays: &Arena<Array>) -> usize {
        arrays.get(self.varlist).len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self, arrays: &Arena<Array>) -> bool {
        self.len(arrays) == 0
    }

    /// Finds the slot index (1-based, matching spec's "index i>=1") of `sym`,
    /// or `None` if unbound in this context.
    #[must_use]
    pub fn find(&self, sym: SymbolId, arrays: &Arena<Array>) -> Option<usize> {
        let keylist = arrays.get(self.keylist);
        keylist.cells.iter().enumerate().skip(1).find_map(|(i, cell)| (cell.symbol == Some(sym)).then_some(i))
    }

    #[must_use]
    pub fn get(&self, index: usize, arrays: &Arena<Array>) -> &Cell {
        arrays.get(self.varlist).get(index).expect("context slot index out of range")
    }

    pub fn get_mut(&mut self, index: usize, arrays: &mut Arena<Array>) -> &mut Cell {
        arrays.get_mut(self.varlist).get_mut(index).expect("context slot index out of range")
    }

    /// Appends a new key/value pair, forking the keylist first if it is
    /// shared with another context (spec §9 copy-on-write).
    pub fn append(
        &mut self,
        sym: SymbolId,
        value: Cell,
        arrays: &mut Arena<Array>,
        tracker: &mut impl ResourceTracker,
    ) -> Result<usize, crate::resource::ResourceError> {
        self.keylist = Array::fork_if_shared(self.keylist, arrays);
        arrays.get_mut(self.varlist).bonus = Some(self.keylist);

        let mut key_cell = Cell::trash();
        key_cell.symbol = Some(sym);
        tracker.on_allocate()?;
        arrays.get_mut(self.keylist).cells.push(key_cell);
        arrays.get_mut(self.varlist).cells.push(value);
        Ok(arrays.get(self.varlist).len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn append_then_find_round_trips() {
        let mut arrays = Arena::new();
        let mut tracker = NoLimitTracker;
        let mut interns = crate::symbol::Interns::new();
        let sym = interns.intern("x");
        let mut ctx = Context::new(ContextKind::Object, &mut arrays, &mut tracker).unwrap();
        let idx = ctx.append(sym, Cell::integer(10), &mut arrays, &mut tracker).unwrap();
        assert_eq!(ctx.find(sym, &arrays), Some(idx));
        assert!(matches!(ctx.get(idx, &arrays).payload, crate::cell::Payload::Int(10)));
    }
}
