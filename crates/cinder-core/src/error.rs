//! Error types shared across the engine.

use thiserror::Error;

/// Error returned when a command is used against a key holding the wrong type.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
pub struct WrongType;

/// Errors that can occur during INCR/DECR operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IncrError {
    /// Key holds a non-string type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// Value is not a valid integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    /// Increment or decrement would overflow i64.
    #[error("increment or decrement would overflow")]
    Overflow,
}

impl From<WrongType> for IncrError {
    fn from(_: WrongType) -> Self {
        IncrError::WrongType
    }
}
