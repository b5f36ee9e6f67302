//! Error taxonomy and the raised-error / thrown-value split described in spec §7.
//!
//! Three kinds of failure participate in this engine: raised errors (first-class
//! antiform values produced by `fail`), throws (labeled control-flow exits), and
//! panics (invariant violations, not represented here — they abort).

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a raised error.
pub type RunResult<T> = Result<T, RaisedError>;

/// The closed set of error symbols exposed at the embedding boundary (spec §6).
///
/// Deriving `strum::Display`/`EnumString`/`IntoStaticStr` gives each variant a
/// canonical symbol string for free, the way `ExcType` does in the teacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrKind {
    /// No argument was available to fulfill a required parameter.
    NoArg,
    /// A parameter expected an argument but the feed was at end.
    ExpectArg,
    /// An argument failed typechecking against its parameter's predicate.
    PhaseArgType,
    /// A left-quoting action was invoked with nothing on its left.
    LiteralLeftPath,
    /// Two infix actions both requested deferral without the first resolving.
    AmbiguousInfix,
    /// A plain `word!` resolved to an antiform and was fetched without meta.
    BadWordGet,
    /// An operation produced or required a value where none was present.
    NoValue,
    /// `parse3` did not consume the whole input and `:relax` was not given.
    ParseIncomplete,
    /// A parse rule's shape is malformed (e.g. a bar adjacent to a bar).
    ParseRule,
    /// A parse rule ran out of input where it required more.
    ParseEnd,
    /// An unrecognized parse keyword was used in command position.
    ParseCommand,
    /// A parse rule referenced an unbound variable.
    ParseVariable,
    /// A parse rule was applied to an input series of the wrong kind.
    ParseSeries,
    /// The same capture variable was used twice in one rule.
    DupVars,
    /// A non-endable parameter hit the end of the feed.
    NeedNonEnd,
    /// Allocation could not be satisfied (arena exhausted under a hard limit).
    NoMemory,
    /// A word has no binding in the current context.
    NotBound,
    /// A refinement was pushed twice for the same parameter.
    BadParameter,
    /// An unknown or duplicate refinement name was used in a call.
    BadRefinement,
}

/// A raised error: the antiform error value of spec §7.1.
///
/// Carries a symbol id (`kind`) and template parameters, matching "each error
/// carries a symbol id and template parameters; the surface converts to a
/// textual message" (spec §7).
#[derive(Debug, Clone)]
pub struct RaisedError {
    pub kind: ErrKind,
    pub message: String,
    pub template: Vec<(&'static str, String)>,
}

impl RaisedError {
    #[must_use]
    pub fn new(kind: ErrKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), template: Vec::new() }
    }

    #[must_use]
    pub fn with_param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.template.push((name, value.to_string()));
        self
    }
}

impl fmt::Display for RaisedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", <&'static str>::from(self.kind), self.message)?;
        for (name, value) in &self.template {
            write!(f, " ({name}={value})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RaisedError {}

/// A labeled control-flow throw (spec §7.2): `return`, `parse-accept`,
/// `parse-break`, `parse-reject`, or a user-defined label.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub label: ThrowLabel,
    pub value: crate::cell::Cell,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThrowLabel {
    Return,
    ParseAccept,
    ParseBreak,
    ParseReject,
    Named(crate::symbol::SymbolId),
}

/// Outermost-level policy: an uncaught throw becomes an error (spec §7.2).
#[must_use]
pub fn uncaught_throw_to_error(thrown: &Thrown) -> RaisedError {
    let label = match &thrown.label {
        ThrowLabel::Return => "return",
        ThrowLabel::ParseAccept => "parse-accept",
        ThrowLabel::ParseBreak => "parse-break",
        ThrowLabel::ParseReject => "parse-reject",
        ThrowLabel::Named(_) => "named",
    };
    RaisedError::new(ErrKind::NoValue, format!("uncaught throw: {label}"))
}

/// Textual report for embedding-API callers (spec §6's "persisted state: none... only
/// library entry points" boundary). Grounded on the teacher's `ReplError`.
#[derive(Debug, Clone)]
pub struct EmbedError {
    pub summary: String,
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

impl std::error::Error for EmbedError {}

impl From<RaisedError> for EmbedError {
    fn from(err: RaisedError) -> Self {
        Self { summary: err.to_string() }
    }
}

impl From<Thrown> for EmbedError {
    fn from(thrown: Thrown) -> Self {
        Self { summary: uncaught_throw_to_error(&thrown).to_string() }
    }
}
