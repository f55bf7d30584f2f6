use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use electra_core::{ElementKind, ElectraResult};
use electra_engine::{BranchResult, BusResult};
use electra_store::IngestSummary;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{existing_file, joined};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_EXTENSION: &str = "json";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub summary: IngestSummary,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub grid_id: i32,
}

#[derive(Debug, Serialize)]
pub struct PowerFlowReport {
    pub grid_id: i32,
    pub grid_name: Option<String>,
    pub converged: bool,
    pub error: f64,
    pub iterations: usize,
    pub bus_results: Vec<BusResult>,
    pub branch_results: Vec<BranchResult>,
}

/// Extension of the uploaded file name, if it is a plain alphanumeric one.
fn extension(filename: Option<&str>) -> &str {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_EXTENSION)
}

async fn remove_circuit(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "circuit file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "circuit file already gone")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove circuit file"),
    }
}

/// Store an uploaded circuit file and ingest its model.
pub async fn upload_grid(
    state: &AppState,
    filename: Option<&str>,
    content: Bytes,
) -> ApiResult<UploadResponse> {
    if content.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    let dir = &state.config.storage.circuit_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::Internal(format!("cannot create circuit directory: {e}")))?;
    let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension(filename)));
    tokio::fs::write(&path, &content)
        .await
        .map_err(|e| ApiError::Internal(format!("cannot store circuit file: {e}")))?;

    match ingest(state, &path).await {
        Ok(summary) => {
            info!(
                grid_id = summary.grid_id,
                buses = summary.buses_saved,
                lines = summary.lines_saved,
                path = %path.display(),
                "grid saved"
            );
            Ok(UploadResponse {
                message: "Grid saved",
                summary,
            })
        }
        Err(e) => {
            remove_circuit(&path).await;
            Err(e)
        }
    }
}

async fn ingest(state: &AppState, path: &Path) -> ApiResult<IngestSummary> {
    let engine = state.engine.clone();
    let file = path.to_path_buf();
    let model = joined(
        tokio::task::spawn_blocking(move || -> ElectraResult<_> {
            let circuit = engine.open_file(&file)?;
            Ok(engine.gather_model(&circuit))
        })
        .await,
    )??;

    let summary = state
        .repo
        .save_grid(&model, Some(&path.to_string_lossy()))
        .await?;
    Ok(summary)
}

pub async fn list_grid_ids(state: &AppState) -> ApiResult<Vec<i32>> {
    Ok(state.repo.list_grid_ids().await?)
}

pub async fn delete_grid(state: &AppState, grid_id: i32) -> ApiResult<DeleteResponse> {
    let grid = state
        .repo
        .get_grid(grid_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Grid not found".into()))?;

    state.repo.delete_grid(grid_id).await?;
    info!(grid_id, "grid deleted");

    if let Some(path) = grid.tmp_file_path {
        remove_circuit(Path::new(&path)).await;
    }
    Ok(DeleteResponse {
        deleted: true,
        grid_id,
    })
}

/// Bring the stored circuit in line with the database flags and solve it.
pub async fn run_power_flow(state: &AppState, grid_id: i32) -> ApiResult<PowerFlowReport> {
    let grid = state
        .repo
        .get_grid(grid_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Grid not found".into()))?;
    let path = existing_file(grid.tmp_file_path.as_deref().map(PathBuf::from))
        .await
        .ok_or_else(|| ApiError::NotFound("Circuit file not found".into()))?;

    let mut flags = HashMap::new();
    for kind in ElementKind::ALL {
        let pairs = state.repo.active_flags(kind, grid_id).await?;
        flags.insert(kind, pairs.into_iter().collect::<HashMap<_, _>>());
    }

    let engine = state.engine.clone();
    let options = state.config.power_flow_options();
    let outcome: ElectraResult<_> = joined(
        tokio::task::spawn_blocking(move || -> ElectraResult<_> {
            let mut circuit = engine.open_file(&path)?;
            let changed: usize = flags
                .iter()
                .map(|(kind, flags)| circuit.sync_active(*kind, flags))
                .sum();
            debug!(changed, "circuit flags synchronised");
            engine.save_file(&circuit, &path)?;
            let results = engine.power_flow(&circuit, &options)?;
            Ok((circuit.name().map(str::to_string), results))
        })
        .await,
    )?;
    let (circuit_name, results) = outcome
        .map_err(|e| ApiError::Internal(format!("Power flow calculation failed: {e}")))?;

    info!(
        grid_id,
        converged = results.converged,
        iterations = results.iterations,
        "power flow served"
    );
    Ok(PowerFlowReport {
        grid_id,
        grid_name: circuit_name.or(grid.name),
        converged: results.converged,
        error: results.error,
        iterations: results.iterations,
        bus_results: results.bus_results,
        branch_results: results.branch_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension(Some("ieee14.gridcal")), "gridcal");
        assert_eq!(extension(Some("grid.JSON")), "JSON");
        assert_eq!(extension(Some("noext")), "json");
        assert_eq!(extension(Some("evil.j/s")), "json");
        assert_eq!(extension(None), "json");
    }
}
