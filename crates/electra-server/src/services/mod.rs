//! Request logic behind the routes: storage, circuit files and the engine.

pub mod elements;
pub mod grid;
pub mod health;

use std::path::PathBuf;

use electra_core::ElectraResult;
use tokio::task::JoinError;

use crate::error::ApiError;

/// Flatten a blocking engine task into the engine's own result.
pub(crate) fn joined<T>(
    outcome: Result<ElectraResult<T>, JoinError>,
) -> Result<ElectraResult<T>, ApiError> {
    outcome.map_err(|e| ApiError::Internal(format!("engine task failed: {e}")))
}

/// `path` if it names a regular file.
pub(crate) async fn existing_file(path: Option<PathBuf>) -> Option<PathBuf> {
    let path = path?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}
