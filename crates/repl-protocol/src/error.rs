//! Protocol-level error types.

use thiserror::Error;

/// Precondition violations of [`combine`](crate::combine). These indicate a
/// caller bug, not a runtime or network condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombineError {
    #[error("cannot combine responses with different ids: expected {expected:?}, found {found:?}")]
    MismatchedId { expected: String, found: String },

    #[error("cannot combine an empty set of responses")]
    Empty,
}
