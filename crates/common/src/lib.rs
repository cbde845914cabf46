//! `vdq-common` — Shared types, configuration, and errors for the vdq decode queue.
//!
//! This crate is the foundation the decoder crate and the replay helper
//! depend on:
//!
//! - **Types**: `Pts`, `OsStatus` and the status check helper
//! - **Color**: `FourCc`, `PixelFormat`
//! - **Config**: `DecoderConfig`, `PlatformConfig`
//! - **Errors**: `DecodeError`, `LockError` (thiserror-based)

pub mod color;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use color::{FourCc, PixelFormat};
pub use config::{DecoderConfig, PlatformConfig};
pub use error::{DecodeError, DecodeResult, LockError};
pub use types::{
    check_status, status_name, OsStatus, Pts, DECODER_CONFIGURATION_ERR, DECODER_FAILED,
    DECODER_FORMAT_NOT_SUPPORTED, DECODER_HARDWARE_NOT_SUPPORTED, DECODER_NO_ERR,
};
