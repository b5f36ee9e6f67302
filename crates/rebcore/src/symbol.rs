//! Interned symbol table with per-symbol "hitch" rings (spec §3, §4.6).
//!
//! Grounded on `intern.rs`'s `StringId`/`Interns` canonicalization table, adapted
//! from "interned string payloads" to "interned identifiers with module-scoped
//! binding chains". A symbol's hitch ring is a singly-linked chain of patches
//! (one per module the symbol is declared in); the GC walks it to fixpoint
//! (spec §4.6 "Module iteration").

use ahash::AHashMap;

/// Index into the symbol table. Stable for the table's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

/// One interned identifier: canonical text plus its module-declaration chain.
#[derive(Debug)]
struct SymbolEntry {
    text: Box<str>,
    /// Head of the hitch ring: the most recently declared module patch, if any.
    hitch_head: Option<crate::arena::StubId>,
    /// GC mark bit, separate from cell/array mark bits (spec §3 "has its own mark bit").
    marked: bool,
}

/// Append-only interning table (spec §5: "the global symbol table is append-only
/// during execution; symbols must be interned before being observed by another
/// path"). Interning a new symbol is a GC safe point.
#[derive(Debug, Default)]
pub struct Interns {
    by_text: AHashMap<Box<str>, SymbolId>,
    entries: Vec<SymbolEntry>,
}

impl Interns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning the existing id if already interned.
    pub fn intern(&mut self, text: &str) -> SymbolId {
        if let Some(&id) = self.by_text.get(text) {
            return id;
        }
        let id = SymbolId(self.entries.len() as u32);
        self.entries.push(SymbolEntry { text: text.into(), hitch_head: None, marked: false });
        self.by_text.insert(text.into(), id);
        id
    }

    #[must_use]
    pub fn text(&self, id: SymbolId) -> &str {
        &self.entries[id.0 as usize].text
    }

    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<SymbolId> {
        self.by_text.get(text).copied()
    }

    /// Pushes a new module-patch onto `id`'s hitch ring, returning the prior head
    /// so the patch stub can link back to it (spec §4.6 "per-symbol hitch rings").
    pub fn push_hitch(&mut self, id: SymbolId, patch: crate::arena::StubId) -> Option<crate::arena::StubId> {
        let entry = &mut self.entries[id.0 as usize];
        let prior = entry.hitch_head.replace(patch);
        prior
    }

    #[must_use]
    pub fn hitch_head(&self, id: SymbolId) -> Option<crate::arena::StubId> {
        self.entries[id.0 as usize].hitch_head
    }

    pub fn mark(&mut self, id: SymbolId) -> bool {
        let entry = &mut self.entries[id.0 as usize];
        let was_marked = entry.marked;
        entry.marked = true;
        !was_marked
    }

    pub fn clear_marks(&mut self) {
        for entry in &mut self.entries {
            entry.marked = false;
        }
    }

    pub fn unmarked_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.iter().enumerate().filter(|(_, e)| !e.marked).map(|(i, _)| SymbolId(i as u32))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.intern("foo");
        let b = interns.intern("foo");
        assert_eq!(a, b);
        assert_eq!(interns.text(a), "foo");
    }

    #[test]
    fn hitch_ring_links_back() {
        let mut interns = Interns::new();
        let sym = interns.intern("bar");
        assert_eq!(interns.hitch_head(sym), None);
        let prior = interns.push_hitch(sym, crate::arena::StubId(1));
        assert_eq!(prior, None);
        assert_eq!(interns.hitch_head(sym), Some(crate::arena::StubId(1)));
        let prior2 = interns.push_hitch(sym, crate::arena::StubId(2));
        assert_eq!(prior2, Some(crate::arena::StubId(1)));
    }
}
