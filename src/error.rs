//! Error kinds raised while replaying a trace.
//!
//! Every variant is fatal for the current run; the binary reports it and
//! exits non-zero, leaving already written per-step files in place.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    /// The topology string could not be parsed, or its tips are not
    /// uniquely named.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("tree has {tips} tip(s), need at least 2")]
    EmptyTree { tips: usize },

    #[error("unknown tip name '{0}'")]
    UnknownTip(String),

    /// No edge of the current tree induces the requested tip set.
    #[error("split not found for tips ({})", .0.join(" "))]
    SplitNotFound(Vec<String>),

    #[error("reader holds a {found} record, {expected} was requested")]
    StateMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("end of trace stream")]
    EndOfStream,

    /// A topology edit was attempted on a node that does not satisfy its
    /// structural precondition.
    #[error("internal consistency failure: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReplayError>;
