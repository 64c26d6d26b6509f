//! Error handling for the portable runtime core.
//!
//! The core keeps its error surface small: call-site rejections (bad
//! processor ids, unknown registrations, out-of-range windows) and the
//! collective failure states a backend can report. Anything a processor
//! cannot reject locally is fatal to the collective run.

use thiserror::Error;

/// Convenience result alias for fallible core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the runtime core and its backends.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A communication primitive named a processor outside `[0, P)`.
    #[error("processor {processor} is out of range for a world of {count} processors")]
    InvalidProcessor { processor: usize, count: usize },

    /// A one-sided transfer referenced a variable id with no registration.
    #[error("variable id {0} is not registered")]
    UnknownVariable(usize),

    /// A send referenced a queue id with no registration.
    #[error("queue id {0} is not registered")]
    UnknownQueue(usize),

    /// A transfer window does not fit the registered extent of its target.
    #[error("window [{offset}, {offset}+{len}) exceeds the registered extent of {extent} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        extent: usize,
    },

    /// A slice put supplied a value count different from the slice width.
    #[error("slice put of {got} elements into a window of {expected} elements")]
    CountMismatch { expected: usize, got: usize },

    /// A payload could not be decoded back into its message type.
    #[error("decode error: {0}")]
    Decode(String),

    /// An array send was issued on a message type without an array payload.
    #[error("message type does not carry an array payload")]
    NotAnArray,

    /// Processors disagreed on the id of a collectively created object.
    #[error(
        "collective registration mismatch: processor {processor} allocated id {got}, processor 0 allocated id {expected}"
    )]
    RegistrationMismatch {
        processor: usize,
        got: usize,
        expected: usize,
    },

    /// The collective run has been aborted; no further barrier can complete.
    #[error("collective run aborted")]
    Aborted,
}

impl CoreError {
    pub fn decode(msg: impl Into<String>) -> Self {
        CoreError::Decode(msg.into())
    }
}
