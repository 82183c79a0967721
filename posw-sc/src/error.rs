//! Error types for posw-sc
//!
//! Only transport and session faults surface as errors. Capture filtering,
//! classification ambiguity and resolver misses are typed `ScanResult`
//! outcomes, not errors.

use posw_common::scan::ScannerState;
use thiserror::Error;

/// Main error type for the scanner capture service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport open/read/close failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport read exceeded its deadline
    #[error("Transport read timed out after {0}ms")]
    Timeout(u64),

    /// Operation not valid in the current session state
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ScannerState,
    },

    /// Product resolver failure (network, decode)
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from posw-common
    #[error(transparent)]
    Common(#[from] posw_common::Error),
}

/// Convenience Result type using posw-sc Error
pub type Result<T> = std::result::Result<T, Error>;
