//! Central error types for the decode queue (thiserror-based).

use thiserror::Error;

use crate::types::{OsStatus, Pts};

/// Decoder session errors.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Platform decoder creation failed with status {status}")]
    DecoderCreate { status: OsStatus },

    #[error("Platform decoder rejected frame pts={pts} with status {status}")]
    DecoderSubmit { pts: Pts, status: OsStatus },

    #[error("Platform decoder teardown failed with status {status}")]
    DecoderDestroy { status: OsStatus },

    #[error("Cannot {op} while session is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("Lock manager error: {0}")]
    LockManager(#[from] LockError),
}

/// Errors from the process-wide lock capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock manager registration failed: {0}")]
    Registration(String),

    #[error("Lock operation {op} failed: {reason}")]
    Operation { op: &'static str, reason: String },
}

/// Convenience Result type for session operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
