use async_trait::async_trait;
use electra_core::{ElementKind, ElementRef, GridModel};
use serde::Serialize;

use crate::error::StoreResult;
use crate::rows::{ElementRow, GridRow};

/// Order in which element tables are written; buses first so references
/// resolve.
pub const INGEST_ORDER: [ElementKind; 6] = [
    ElementKind::Bus,
    ElementKind::Load,
    ElementKind::Generator,
    ElementKind::Shunt,
    ElementKind::Transformer2W,
    ElementKind::Line,
];

/// Counts reported after a grid has been ingested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub grid_id: i32,
    pub buses_saved: usize,
    pub lines_saved: usize,
    pub generators_saved: usize,
    pub loads_saved: usize,
    pub shunts_saved: usize,
    pub transformers2w_saved: usize,
}

impl IngestSummary {
    pub fn record(&mut self, kind: ElementKind, saved: usize) {
        match kind {
            ElementKind::Bus => self.buses_saved = saved,
            ElementKind::Load => self.loads_saved = saved,
            ElementKind::Generator => self.generators_saved = saved,
            ElementKind::Shunt => self.shunts_saved = saved,
            ElementKind::Line => self.lines_saved = saved,
            ElementKind::Transformer2W => self.transformers2w_saved = saved,
        }
    }
}

/// Rows switched off when a bus is deactivated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub generators: u64,
    pub loads: u64,
    pub shunts: u64,
}

impl CascadeSummary {
    pub fn add(&mut self, kind: ElementKind, affected: u64) {
        match kind {
            ElementKind::Generator => self.generators += affected,
            ElementKind::Load => self.loads += affected,
            ElementKind::Shunt => self.shunts += affected,
            _ => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.generators + self.loads + self.shunts
    }
}

/// Persistence operations behind the HTTP services.
///
/// Implementations must honor the same rules: element rows are keyed by
/// `(grid_id, idtag)`, deleting a grid removes its elements, and bus-attached
/// elements must reference an existing bus of the same grid.
#[async_trait]
pub trait GridRepository: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> StoreResult<()>;

    /// Insert a grid row and upsert all of its elements atomically.
    async fn save_grid(
        &self,
        model: &GridModel,
        circuit_path: Option<&str>,
    ) -> StoreResult<IngestSummary>;

    /// Newest grid first.
    async fn list_grid_ids(&self) -> StoreResult<Vec<i32>>;

    async fn get_grid(&self, grid_id: i32) -> StoreResult<Option<GridRow>>;

    /// Returns false when no such grid existed.
    async fn delete_grid(&self, grid_id: i32) -> StoreResult<bool>;

    /// Rows of one kind ordered by id, optionally restricted to a grid.
    async fn list_elements(
        &self,
        kind: ElementKind,
        grid_id: Option<i32>,
    ) -> StoreResult<Vec<ElementRow>>;

    async fn get_element(&self, kind: ElementKind, id: i32) -> StoreResult<Option<ElementRow>>;

    /// Update one row's flag, returning its grid and idtag.
    async fn set_active(
        &self,
        kind: ElementKind,
        id: i32,
        active: bool,
    ) -> StoreResult<Option<ElementRef>>;

    /// Switch off generators, loads and shunts on a bus.
    async fn deactivate_bus_attachments(
        &self,
        grid_id: i32,
        bus_idtag: &str,
    ) -> StoreResult<CascadeSummary>;

    /// Switch a bus off together with its attachments, atomically. Returns
    /// `None` when no bus has this id.
    async fn deactivate_bus(
        &self,
        bus_id: i32,
    ) -> StoreResult<Option<(ElementRef, CascadeSummary)>>;

    /// `(idtag, active)` pairs of one kind in a grid; unset flags read as true.
    async fn active_flags(
        &self,
        kind: ElementKind,
        grid_id: i32,
    ) -> StoreResult<Vec<(String, bool)>>;
}
