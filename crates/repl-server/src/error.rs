//! Construction-time and session errors.

use thiserror::Error;

/// Errors raised while registering extensions or composing the chain.
/// Any of these aborts startup; no partial chain is ever built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("op {op:?} is handled by both {existing:?} and {extension:?}")]
    DuplicateOperation {
        op: String,
        existing: String,
        extension: String,
    },

    #[error("extension {0:?} is already registered")]
    DuplicateExtension(String),

    #[error("extension {required_by:?} requires op {op:?}, which no extension handles")]
    MissingDependency { op: String, required_by: String },

    #[error("cyclic dependency between extensions: {}", extensions.join(" -> "))]
    CyclicDependency { extensions: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
}
