use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use electra_core::{ElementKind, ElementRef, GridModel};
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::repository::{CascadeSummary, GridRepository, IngestSummary, INGEST_ORDER};
use crate::rows::{ingestible_count, rows_for, ElementRow, GridRow};

#[derive(Debug, Default)]
struct MemoryState {
    last_grid_id: i32,
    last_row_id: HashMap<ElementKind, i32>,
    grids: BTreeMap<i32, GridRow>,
    elements: HashMap<ElementKind, Vec<ElementRow>>,
}

impl MemoryState {
    fn rows(&self, kind: ElementKind) -> &[ElementRow] {
        self.elements.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn upsert(&mut self, row: ElementRow) {
        let kind = row.kind();
        let rows = self.elements.entry(kind).or_default();
        if let Some(existing) = rows
            .iter_mut()
            .find(|r| r.grid_id() == row.grid_id() && r.idtag() == row.idtag())
        {
            let id = existing.id();
            *existing = row;
            existing.set_id(id);
            return;
        }
        let next = self.last_row_id.entry(kind).or_insert(0);
        *next += 1;
        let mut row = row;
        row.set_id(*next);
        rows.push(row);
    }

    fn cascade_from_bus(&mut self, grid_id: i32, bus_idtag: &str) -> CascadeSummary {
        let mut summary = CascadeSummary::default();
        for kind in ElementKind::BUS_ATTACHED {
            let Some(rows) = self.elements.get_mut(&kind) else {
                continue;
            };
            let mut affected = 0;
            for row in rows
                .iter_mut()
                .filter(|r| r.grid_id() == grid_id && r.bus_idtag() == Some(bus_idtag))
            {
                row.set_active(false);
                affected += 1;
            }
            summary.add(kind, affected);
        }
        summary
    }
}

/// In-process repository with the same semantics as the Postgres one.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every element must reference buses that exist in the same payload.
fn check_references(staged: &[(ElementKind, Vec<ElementRow>)]) -> StoreResult<()> {
    let buses: HashSet<&str> = staged
        .iter()
        .filter(|(kind, _)| *kind == ElementKind::Bus)
        .flat_map(|(_, rows)| rows.iter().map(ElementRow::idtag))
        .collect();

    for (kind, rows) in staged {
        for row in rows {
            if let Some(missing) = row
                .referenced_buses()
                .into_iter()
                .find(|bus| !buses.contains(bus))
            {
                return Err(StoreError::Constraint(format!(
                    "{kind} `{}` references unknown bus `{missing}`",
                    row.idtag()
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl GridRepository for MemoryRepository {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn save_grid(
        &self,
        model: &GridModel,
        circuit_path: Option<&str>,
    ) -> StoreResult<IngestSummary> {
        let raw_json = serde_json::to_value(model)?;
        let mut state = self.state.write();
        let grid_id = state.last_grid_id + 1;

        let staged: Vec<_> = INGEST_ORDER
            .iter()
            .map(|&kind| (kind, rows_for(kind, grid_id, &model.model_data)))
            .collect();
        check_references(&staged)?;

        state.last_grid_id = grid_id;
        state.grids.insert(
            grid_id,
            GridRow {
                id: grid_id,
                name: model.name.clone(),
                base_mva: model.base_mva,
                raw_json: Some(raw_json),
                created_at: Utc::now(),
                tmp_file_path: circuit_path.map(str::to_string),
            },
        );

        let mut summary = IngestSummary {
            grid_id,
            ..Default::default()
        };
        for (kind, rows) in staged {
            for row in rows {
                state.upsert(row);
            }
            summary.record(kind, ingestible_count(kind, &model.model_data));
        }
        Ok(summary)
    }

    async fn list_grid_ids(&self) -> StoreResult<Vec<i32>> {
        let state = self.state.read();
        let mut grids: Vec<_> = state.grids.values().collect();
        grids.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(grids.into_iter().map(|g| g.id).collect())
    }

    async fn get_grid(&self, grid_id: i32) -> StoreResult<Option<GridRow>> {
        Ok(self.state.read().grids.get(&grid_id).cloned())
    }

    async fn delete_grid(&self, grid_id: i32) -> StoreResult<bool> {
        let mut state = self.state.write();
        if state.grids.remove(&grid_id).is_none() {
            return Ok(false);
        }
        for rows in state.elements.values_mut() {
            rows.retain(|r| r.grid_id() != grid_id);
        }
        Ok(true)
    }

    async fn list_elements(
        &self,
        kind: ElementKind,
        grid_id: Option<i32>,
    ) -> StoreResult<Vec<ElementRow>> {
        let state = self.state.read();
        let rows = state
            .rows(kind)
            .iter()
            .filter(|r| grid_id.map_or(true, |g| r.grid_id() == g))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn get_element(&self, kind: ElementKind, id: i32) -> StoreResult<Option<ElementRow>> {
        let state = self.state.read();
        Ok(state.rows(kind).iter().find(|r| r.id() == id).cloned())
    }

    async fn set_active(
        &self,
        kind: ElementKind,
        id: i32,
        active: bool,
    ) -> StoreResult<Option<ElementRef>> {
        let mut state = self.state.write();
        let Some(row) = state
            .elements
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| r.id() == id))
        else {
            return Ok(None);
        };
        row.set_active(active);
        Ok(Some(row.element_ref()))
    }

    async fn deactivate_bus_attachments(
        &self,
        grid_id: i32,
        bus_idtag: &str,
    ) -> StoreResult<CascadeSummary> {
        Ok(self.state.write().cascade_from_bus(grid_id, bus_idtag))
    }

    async fn deactivate_bus(
        &self,
        bus_id: i32,
    ) -> StoreResult<Option<(ElementRef, CascadeSummary)>> {
        let mut state = self.state.write();
        let Some(bus) = state
            .elements
            .get_mut(&ElementKind::Bus)
            .and_then(|rows| rows.iter_mut().find(|r| r.id() == bus_id))
        else {
            return Ok(None);
        };
        bus.set_active(false);
        let bus = bus.element_ref();
        let summary = state.cascade_from_bus(bus.grid_id, &bus.idtag);
        Ok(Some((bus, summary)))
    }

    async fn active_flags(
        &self,
        kind: ElementKind,
        grid_id: i32,
    ) -> StoreResult<Vec<(String, bool)>> {
        let state = self.state.read();
        Ok(state
            .rows(kind)
            .iter()
            .filter(|r| r.grid_id() == grid_id)
            .map(|r| (r.idtag().to_string(), r.active().unwrap_or(true)))
            .collect())
    }
}
