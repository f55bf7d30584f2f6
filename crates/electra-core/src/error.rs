//! Unified error types for the Electra crates
//!
//! [`ElectraError`] is the common currency between the engine, the store and
//! the HTTP layer. Crate-specific errors convert into it at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use electra_core::{ElectraError, ElectraResult};
//!
//! fn load(path: &str) -> ElectraResult<Circuit> {
//!     let circuit = engine.open_file(path.as_ref())?;
//!     Ok(circuit)
//! }
//! ```

use thiserror::Error;

/// Unified error type for all Electra operations.
#[derive(Error, Debug)]
pub enum ElectraError {
    /// I/O errors (file access, temporary files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced grid or element does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Failures inside the grid-analysis engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using ElectraError.
pub type ElectraResult<T> = Result<T, ElectraError>;

impl From<anyhow::Error> for ElectraError {
    fn from(err: anyhow::Error) -> Self {
        ElectraError::Other(format!("{err:#}"))
    }
}

impl From<String> for ElectraError {
    fn from(s: String) -> Self {
        ElectraError::Other(s)
    }
}

impl From<&str> for ElectraError {
    fn from(s: &str) -> Self {
        ElectraError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for ElectraError {
    fn from(err: serde_json::Error) -> Self {
        ElectraError::Parse(err.to_string())
    }
}
