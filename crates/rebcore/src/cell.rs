//! The cell model (spec §3, §4.1): a fixed-size tagged value with a header
//! encoding kind, quote depth, antiform state, and GC/mutation flags.
//!
//! Grounded on `value.rs`'s `Value` enum — the split there between immediate
//! variants (`Int`, `Bool`, `None`, ...) and `Ref(HeapId)` is reused here as the
//! split between [`Payload`]'s immediate variants and its `Series`/`Binding`
//! node-reference variants. Unlike `Value`, a `Cell` is a plain value with no
//! heap identity of its own (spec §3: "Cells are plain values (no heap
//! identity)") — arrays of cells get identity from the arena, not cells
//! themselves, which is why `Cell` derives `Clone` freely where `Value`
//! deliberately does not.

use crate::arena::StubId;
use crate::symbol::SymbolId;

/// The underlying kind of a cell, independent of its position on the
/// quote/antiform ladder (spec §9: "The same underlying kind appears at
/// multiple rungs"). Word-like and sequence-like kinds carry a [`Sigil`]
/// distinguishing `word`/`set-word`/`get-word`/`meta-word`/`the-word` forms
/// (and their tuple/path/group/block analogues) as the spec's §4.3 dispatch
/// table requires, without multiplying out a separate enum variant per form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heart {
    // --- inert kinds (spec §4.3 "copy through with the unevaluated flag set") ---
    Integer,
    Decimal,
    Text,
    Blob,
    Bitset,
    Object,
    ErrorValue,
    Date,
    Time,
    Money,
    Logic,
    Blank,
    Tag,
    Comma,
    /// End-of-feed / trash sentinel used for endable-parameter fulfillment
    /// (spec §4.4 "mark endable parameters as an 'end' special trash value").
    Trash,
    /// A callable action value (spec §4.4). Not inert: the stepper invokes it.
    Action,

    // --- word-like and sequence-like kinds, parameterized by sigil ---
    Word(Sigil),
    Tuple(Sigil),
    Path(Sigil),
    Group(Sigil),
    Block(Sigil),
}

/// How an infix action's right-hand lookahead behaves (spec §4.3 "tight" and
/// "defer"). `Normal` chases further infix without restriction, which is what
/// gives a right-associative chain like repeated `**` its shape; `Tight`
/// suppresses lookahead for exactly one step while fetching the action's own
/// right argument, giving strict left-to-right chaining for e.g. `+`/`*`;
/// `Defer` lets one further expression resolve before the infix is allowed to
/// take its left argument, and a second deferral before the first resolves is
/// `ErrKind::AmbiguousInfix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfixMode {
    #[default]
    Normal,
    Tight,
    Defer,
}

/// Which syntactic form a word or sequence cell takes. Plain evaluates
/// normally; the others change stepper dispatch per spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    Plain,
    /// `word:` — evaluates the right side and stores it.
    Set,
    /// `:word` — fetches without invoking actions.
    Get,
    /// `^word` — fetches and wraps antiforms into quasiform.
    Meta,
    /// `@word` — copies the next cell verbatim with its source binding.
    The,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CellFlags {
    pub newline_before: bool,
    pub mark: bool,
    pub unevaluated: bool,
    pub protected: bool,
}

/// The two payload slots plus extra, collapsed into one enum since Rust's
/// enum layout already gives us a tagged union without needing the teacher's
/// discriminant-plus-raw-words approach (`value.rs`'s hand-rolled variants
/// play the same role this plays structurally).
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Int(i64),
    Dec(f64),
    Logic(bool),
    /// Owned inline text. Does not need GC tracing (owns no cells), so unlike
    /// `Series` it is not routed through the arena.
    Text(Box<str>),
    Blob(Box<[u8]>),
    /// A position within an array-backed series: block, group, path, tuple,
    /// or an object's varlist (spec §3 "Array"). `index` is the feed-visible
    /// head position, matching the teacher's per-frame index-into-series idea.
    Series { array: StubId, index: u32 },
    /// A callable action: a paramlist describing its parameters plus a tag
    /// naming which native implements its body (spec §4.4 "Action"). A real
    /// Ren-C action's body can itself be interpreted Rebol code; this engine
    /// only implements the native-dispatch path, the call protocol being the
    /// part spec §4.4 actually specifies.
    Action {
        paramlist: StubId,
        native: crate::executors::action::NativeId,
        infix: bool,
        infix_mode: InfixMode,
        /// Backward-quote lookahead (spec §4.3): this infix action's first
        /// argument is the literal, unevaluated cell to its left rather than
        /// that cell's evaluated result (the `'` / lambda-arrow family, as
        /// opposed to ordinary infix like `+`).
        quotes_left: bool,
        /// Spec §4.3's lookahead exception: a `postpones`-flagged action
        /// never pre-empts backward-quote lookahead, even if `quotes_left`.
        postpones: bool,
    },
    /// One parameter slot inside a paramlist array (spec §4.4's four
    /// argument-fulfillment classes, plus the orthogonal variadic/refinement
    /// bits). Lives in `Array::cells` under `Flavor::Paramlist`; `symbol` on
    /// the owning cell carries the parameter's name.
    Param { class: ParamClass, variadic: bool, refinement: bool },
}

/// Which of spec §4.4's four argument-fulfillment classes a parameter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Evaluate the next step normally.
    Normal,
    /// Evaluate normally, then meta the result (antiforms become quasiforms).
    Meta,
    /// Take the next cell completely unevaluated ("just").
    Just,
    /// Take the next cell unevaluated but bound ("the").
    The,
    /// Take unevaluated unless the next cell is itself a group, in which case
    /// evaluate it (soft-quoted escape hatch).
    Soft,
}

/// A cell: kind + quote/antiform ladder position + flags + payload, plus the
/// word-family's symbol and cached binding (spec §3's "extra" slot).
#[derive(Debug, Clone)]
pub struct Cell {
    pub heart: Heart,
    quote_depth: u8,
    antiform: bool,
    pub flags: CellFlags,
    /// Set only for `Heart::Word`-family cells.
    pub symbol: Option<SymbolId>,
    /// Cached binding context for word-family cells (spec §3 "Feed... cached
    /// 'gotten' binding", and the cell-level analogue for a bound word).
    pub binding: Option<StubId>,
    pub payload: Payload,
}

impl Cell {
    #[must_use]
    pub fn new(heart: Heart, payload: Payload) -> Self {
        Self { heart, quote_depth: 0, antiform: false, flags: CellFlags::default(), symbol: None, binding: None, payload }
    }

    #[must_use]
    pub fn integer(v: i64) -> Self {
        Self::new(Heart::Integer, Payload::Int(v))
    }

    #[must_use]
    pub fn logic(v: bool) -> Self {
        Self::new(Heart::Logic, Payload::Logic(v))
    }

    #[must_use]
    pub fn blank() -> Self {
        Self::new(Heart::Blank, Payload::None)
    }

    #[must_use]
    pub fn comma() -> Self {
        Self::new(Heart::Comma, Payload::None)
    }

    #[must_use]
    pub fn trash() -> Self {
        Self::new(Heart::Trash, Payload::None)
    }

    #[must_use]
    pub fn text(s: impl Into<Box<str>>) -> Self {
        Self::new(Heart::Text, Payload::Text(s.into()))
    }

    #[must_use]
    pub fn tag(s: impl Into<Box<str>>) -> Self {
        Self::new(Heart::Tag, Payload::Text(s.into()))
    }

    #[must_use]
    pub fn word(symbol: SymbolId, sigil: Sigil) -> Self {
        let mut cell = Self::new(Heart::Word(sigil), Payload::None);
        cell.symbol = Some(symbol);
        cell
    }

    #[must_use]
    pub fn block(array: StubId, index: u32, sigil: Sigil) -> Self {
        Self::new(Heart::Block(sigil), Payload::Series { array, index })
    }

    #[must_use]
    pub fn group(array: StubId, index: u32, sigil: Sigil) -> Self {
        Self::new(Heart::Group(sigil), Payload::Series { array, index })
    }

    #[must_use]
    pub fn action(paramlist: StubId, native: crate::executors::action::NativeId, infix: bool) -> Self {
        Self::action_with_mode(paramlist, native, infix, InfixMode::Normal)
    }

    #[must_use]
    pub fn action_with_mode(paramlist: StubId, native: crate::executors::action::NativeId, infix: bool, infix_mode: InfixMode) -> Self {
        Self::new(Heart::Action, Payload::Action { paramlist, native, infix, infix_mode, quotes_left: false, postpones: false })
    }

    /// A backward-quote-lookahead action (spec §4.3): always infix, always
    /// takes its left argument literally rather than evaluated.
    #[must_use]
    pub fn action_quoting(paramlist: StubId, native: crate::executors::action::NativeId, postpones: bool) -> Self {
        Self::new(
            Heart::Action,
            Payload::Action { paramlist, native, infix: true, infix_mode: InfixMode::Normal, quotes_left: true, postpones },
        )
    }

    #[must_use]
    pub fn param(symbol: SymbolId, class: ParamClass, variadic: bool, refinement: bool) -> Self {
        let mut cell = Self::new(Heart::Word(Sigil::Plain), Payload::Param { class, variadic, refinement });
        cell.symbol = Some(symbol);
        cell
    }

    /// Quote depth (0 = unquoted). Spec §3's ladder rung count.
    #[must_use]
    pub fn quote_depth(&self) -> u8 {
        self.quote_depth
    }

    #[must_use]
    pub fn is_antiform(&self) -> bool {
        self.antiform
    }

    /// True when this is an ordinary, unquoted, non-antiform value — the only
    /// state legal inside an array (spec §3 invariant: "antiform cells must
    /// not appear inside ordinary lists").
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.quote_depth == 0 && !self.antiform
    }

    /// Decrements quote depth by one (spec §4.3 "Quoted cells decrement the
    /// quote depth by one"). Panics if already at rung zero; callers dispatch
    /// on `quote_depth() > 0` first.
    pub fn unquote_one(&mut self) {
        assert!(self.quote_depth > 0, "cannot unquote an already-unquoted cell");
        self.quote_depth -= 1;
    }

    pub fn quote_one(&mut self) {
        self.quote_depth += 1;
    }

    /// Meta: raises a value one rung (spec glossary "Meta"). Plain → quoted(1);
    /// antiform → quasiform (modeled as quoted(1) with `antiform` cleared, the
    /// "tilde-decorated stable form" per the glossary). Branch-free arithmetic
    /// on the ladder per spec §9's design note.
    pub fn meta(&mut self) {
        if self.antiform {
            self.antiform = false;
            self.quote_depth = 1;
        } else {
            self.quote_depth += 1;
        }
    }

    /// Unmeta: the inverse of [`Cell::meta`]. Quasiform (quoted(1), was
    /// antiform) → antiform; quoted(n>0) → quoted(n-1).
    pub fn unmeta(&mut self) {
        assert!(self.quote_depth > 0, "cannot unmeta a cell already at rung zero");
        self.quote_depth -= 1;
        if self.quote_depth == 0 {
            self.antiform = true;
        }
    }

    /// Demotes a plain cell straight to antiform at rung zero (used to produce
    /// e.g. a raised-error or null antiform from scratch, not via meta).
    pub fn into_antiform(mut self) -> Self {
        assert_eq!(self.quote_depth, 0, "antiform state is only meaningful at rung zero");
        self.antiform = true;
        self
    }

    /// True for the engine's "no value at all" result (spec §4.3 set-word
    /// rule "if result is void"): a trash antiform, the same sentinel the
    /// evaluator primes a wholly-invisible program with and `if`/`then`'s
    /// falsy branch produces.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.heart, Heart::Trash) && self.antiform
    }

    /// Strips the antiform bit in place, leaving kind/payload/quote depth
    /// untouched (spec §4.3 set-word rule "decay any unstable antiform");
    /// antiforms are illegal inside an ordinary array (spec §3), and a
    /// context's varlist is exactly such an array, so anything stored there
    /// must be decayed first.
    pub fn decay_antiform(&mut self) {
        self.antiform = false;
    }

    /// Value-level clone: no GC identity is duplicated, only the handle is
    /// copied (spec §3 "Cells are plain values"). Named distinctly from
    /// `Clone::clone` (which this simply forwards to) to mirror the teacher's
    /// `clone_immediate`/`clone_with_heap` split and flag that cloning a cell
    /// whose payload is `Series` does not deep-copy the array.
    #[must_use]
    pub fn clone_value(&self) -> Self {
        self.clone()
    }

    /// Copies `self` into a fresh cell, preserving only the flags selected by
    /// `keep` (spec §4.1 "mask-copy (preserving specific flags)").
    #[must_use]
    pub fn mask_copy(&self, keep: CellFlags) -> Self {
        let mut out = self.clone();
        out.flags = keep;
        out
    }

    /// Resets to a prepared-uninitialized state (spec §4.1 "erase").
    pub fn erase(&mut self) {
        *self = Self::trash();
    }

    pub fn mark_typechecked(&mut self) {
        // Typechecked state piggybacks on `protected`-adjacent bookkeeping in
        // the level, not the cell itself in this design; see
        // `executors::action::ParamCursor::typechecked`.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_round_trip() {
        let mut c = Cell::integer(42);
        c.quote_one();
        c.quote_one();
        assert_eq!(c.quote_depth(), 2);
        c.unquote_one();
        c.unquote_one();
        assert_eq!(c.quote_depth(), 0);
        match c.payload {
            Payload::Int(v) => assert_eq!(v, 42),
            _ => panic!("payload must survive quote round-trip"),
        }
    }

    #[test]
    fn meta_round_trip_on_antiform() {
        let mut c = Cell::logic(true).into_antiform();
        assert!(c.is_antiform());
        c.meta();
        assert!(!c.is_antiform());
        assert_eq!(c.quote_depth(), 1);
        c.unmeta();
        assert!(c.is_antiform());
        assert_eq!(c.quote_depth(), 0);
    }

    #[test]
    fn trash_antiform_is_void_but_plain_trash_is_not() {
        assert!(Cell::trash().into_antiform().is_void());
        assert!(!Cell::trash().is_void());
        assert!(!Cell::logic(false).into_antiform().is_void());
    }

    #[test]
    fn decay_antiform_clears_the_bit_in_place() {
        let mut c = Cell::logic(true).into_antiform();
        c.decay_antiform();
        assert!(!c.is_antiform());
        assert!(matches!(c.payload, Payload::Logic(true)));
    }

    #[test]
    fn meta_on_plain_increments_quote_depth() {
        let mut c = Cell::integer(7);
        assert!(c.is_plain());
        c.meta();
        assert_eq!(c.quote_depth(), 1);
        assert!(!c.is_antiform());
    }
}
