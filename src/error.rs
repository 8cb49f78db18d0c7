//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Element digest must be {expected} bytes, found {found}")]
    InvalidElement { expected: usize, found: usize },

    #[error("Root anchor must be {expected} bytes, found {found}")]
    InvalidAnchor { expected: usize, found: usize },

    #[error("Invalid group parameters: {0}")]
    InvalidParams(&'static str),

    #[error("Accumulator value must be {expected} bytes, found {found}")]
    InvalidValueLength { expected: usize, found: usize },

    #[error("Sequence counter overflow")]
    SequenceOverflow,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No element at sequence {0}")]
    UnknownSequence(u64),
}

pub type Result<T> = core::result::Result<T, KernelError>;
