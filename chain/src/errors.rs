// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use scar_kernel::error::KernelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    /// Malformed caller input. Reported immediately; no state change.
    #[error("Invalid element: digest must be {expected} bytes, found {found}")]
    InvalidElement { expected: usize, found: usize },

    /// Durability-medium failure. The mutation was aborted, state is
    /// unchanged, and the whole call is safe to retry.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid durable history. Fatal to startup; routed
    /// straight to the integrity guard, never retried.
    #[error("Corrupt log: {0}")]
    CorruptLog(String),

    /// Mutation attempted after the chain froze. Deterministic and
    /// side-effect free until rebirth.
    #[error("Chain is frozen: {0}")]
    Frozen(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("Kernel error: {0}")]
    Kernel(KernelError),
}

impl From<KernelError> for ChainError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::InvalidElement { expected, found } => {
                ChainError::InvalidElement { expected, found }
            }
            other => ChainError::Kernel(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
