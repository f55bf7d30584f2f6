use std::path::PathBuf;

use electra_core::{ElementKind, ElementRef, ElectraResult};
use electra_store::ElementRow;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, error, info, warn};

use super::{existing_file, joined};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Reply to a status change, keyed the way each element family names its id.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub kind: ElementKind,
    pub id: i32,
    pub active: bool,
}

impl Serialize for StatusUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("message", &self.kind.status_updated_message())?;
        map.serialize_entry(self.kind.id_key(), &self.id)?;
        map.serialize_entry("active", &self.active)?;
        map.end()
    }
}

pub async fn list_elements(
    state: &AppState,
    kind: ElementKind,
    grid_id: Option<i32>,
) -> ApiResult<Vec<ElementRow>> {
    Ok(state.repo.list_elements(kind, grid_id).await?)
}

pub async fn get_element(state: &AppState, kind: ElementKind, id: i32) -> ApiResult<ElementRow> {
    state
        .repo
        .get_element(kind, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(kind.not_found_message()))
}

/// Flip an element's flag in the database, then mirror it into the circuit
/// file. Switching a bus off also switches off what hangs on it.
pub async fn update_status(
    state: &AppState,
    kind: ElementKind,
    id: i32,
    active: bool,
) -> ApiResult<StatusUpdate> {
    let cascade = kind == ElementKind::Bus && !active;
    let element = if cascade {
        let (element, summary) = state
            .repo
            .deactivate_bus(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(kind.not_found_message()))?;
        info!(
            bus = %element.idtag,
            generators = summary.generators,
            loads = summary.loads,
            shunts = summary.shunts,
            "bus attachments deactivated"
        );
        element
    } else {
        state
            .repo
            .set_active(kind, id, active)
            .await?
            .ok_or_else(|| ApiError::NotFound(kind.not_found_message()))?
    };
    info!(%kind, id, active, grid_id = element.grid_id, "status updated");

    sync_circuit(state, kind, &element, active, cascade).await;
    Ok(StatusUpdate { kind, id, active })
}

/// Best effort: nothing here fails the request.
async fn sync_circuit(
    state: &AppState,
    kind: ElementKind,
    element: &ElementRef,
    active: bool,
    cascade: bool,
) {
    let path = match state.repo.get_grid(element.grid_id).await {
        Ok(grid) => grid.and_then(|g| g.tmp_file_path).map(PathBuf::from),
        Err(e) => {
            error!(grid_id = element.grid_id, error = %e, "could not look up circuit file");
            return;
        }
    };
    let Some(path) = existing_file(path).await else {
        debug!(grid_id = element.grid_id, "no circuit file to update");
        return;
    };

    let engine = state.engine.clone();
    let idtag = element.idtag.clone();
    let outcome = joined(
        tokio::task::spawn_blocking(move || -> ElectraResult<bool> {
            let mut circuit = engine.open_file(&path)?;
            let found = circuit.set_active(kind, &idtag, active);
            if found {
                if cascade {
                    circuit.deactivate_attached(&idtag);
                }
                engine.save_file(&circuit, &path)?;
            }
            Ok(found)
        })
        .await,
    );

    match outcome {
        Ok(Ok(true)) => debug!(%kind, idtag = %element.idtag, "circuit file updated"),
        Ok(Ok(false)) => warn!(
            %kind,
            idtag = %element.idtag,
            grid_id = element.grid_id,
            "element not present in circuit file"
        ),
        Ok(Err(e)) => error!(%kind, idtag = %element.idtag, error = %e, "circuit update failed"),
        Err(e) => error!(%kind, idtag = %element.idtag, error = %e, "circuit update failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_keys() {
        let body = serde_json::to_value(StatusUpdate {
            kind: ElementKind::Transformer2W,
            id: 7,
            active: false,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "message": "Transformer2W status updated",
                "transformer_id": 7,
                "active": false,
            })
        );
    }
}
