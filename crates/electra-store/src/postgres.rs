use std::time::Duration;

use async_trait::async_trait;
use electra_core::{ElementKind, ElementRef, GridModel};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    query_builder::Separated,
    FromRow, PgPool, Postgres, QueryBuilder, Transaction,
};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::repository::{CascadeSummary, GridRepository, IngestSummary, INGEST_ORDER};
use crate::rows::{
    ingestible_count, rows_for, BusRow, ElementRow, GeneratorRow, GridRow, LineRow, LoadRow,
    ShuntRow, Transformer2WRow,
};

/// Postgres caps a statement at 65535 bind parameters.
const BIND_LIMIT: usize = 65_535;

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

enum Filter {
    All,
    Grid(i32),
    Id(i32),
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select<T>(&self, kind: ElementKind, filter: Filter) -> StoreResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT * FROM {}", kind.table()));
        match filter {
            Filter::All => {}
            Filter::Grid(grid_id) => {
                qb.push(" WHERE grid_id = ").push_bind(grid_id);
            }
            Filter::Id(id) => {
                qb.push(" WHERE id = ").push_bind(id);
            }
        }
        qb.push(" ORDER BY id");
        Ok(qb.build_query_as::<T>().fetch_all(&self.pool).await?)
    }

    async fn select_rows(&self, kind: ElementKind, filter: Filter) -> StoreResult<Vec<ElementRow>> {
        let rows = match kind {
            ElementKind::Bus => wrap(self.select::<BusRow>(kind, filter).await?, ElementRow::Bus),
            ElementKind::Load => wrap(self.select::<LoadRow>(kind, filter).await?, ElementRow::Load),
            ElementKind::Generator => wrap(
                self.select::<GeneratorRow>(kind, filter).await?,
                ElementRow::Generator,
            ),
            ElementKind::Shunt => {
                wrap(self.select::<ShuntRow>(kind, filter).await?, ElementRow::Shunt)
            }
            ElementKind::Line => wrap(self.select::<LineRow>(kind, filter).await?, ElementRow::Line),
            ElementKind::Transformer2W => wrap(
                self.select::<Transformer2WRow>(kind, filter).await?,
                ElementRow::Transformer2W,
            ),
        };
        Ok(rows)
    }
}

fn wrap<T>(rows: Vec<T>, variant: fn(T) -> ElementRow) -> Vec<ElementRow> {
    rows.into_iter().map(variant).collect()
}

/// Key and reference violations are reported as constraint errors.
fn classify(err: sqlx::Error) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|c| c.into_owned());
    match code.as_deref() {
        Some("23503") | Some("23505") => StoreError::Constraint(err.to_string()),
        _ => StoreError::Database(err),
    }
}

fn columns(kind: ElementKind) -> &'static [&'static str] {
    match kind {
        ElementKind::Bus => &[
            "grid_id", "idtag", "name", "code", "vnom", "vm0", "va0", "vmin", "vmax", "vm_cost",
            "angle_min", "angle_max", "angle_cost", "r_fault", "x_fault", "x", "y", "longitude",
            "latitude", "is_slack", "active", "is_dc", "graphic_type", "h", "w", "country", "area",
            "zone", "substation", "voltage_level", "bus_bar", "ph_a", "ph_b", "ph_c", "ph_n",
            "is_grounded", "active_prof", "vmin_prof", "vmax_prof",
        ],
        ElementKind::Load => &[
            "grid_id", "idtag", "name", "code", "bus_idtag", "active", "p", "q", "conn",
            "longitude", "latitude",
        ],
        ElementKind::Generator => &[
            "grid_id", "idtag", "name", "code", "bus_idtag", "active", "p", "vset", "qmin", "qmax",
            "pf",
        ],
        ElementKind::Shunt => &["grid_id", "idtag", "name", "code", "bus_idtag", "active", "b"],
        ElementKind::Line => &[
            "grid_id", "idtag", "name", "code", "bus_from_idtag", "bus_to_idtag", "active", "r",
            "x", "b", "length",
        ],
        ElementKind::Transformer2W => &[
            "grid_id", "idtag", "name", "code", "bus_from_idtag", "bus_to_idtag", "active", "r",
            "x", "g", "b", "hv", "lv", "sn",
        ],
    }
}

/// Push one row's values in the order given by [`columns`].
fn bind_row(mut b: Separated<'_, '_, Postgres, &'static str>, row: &ElementRow) {
    match row.clone() {
        ElementRow::Bus(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.vnom)
                .push_bind(r.vm0)
                .push_bind(r.va0)
                .push_bind(r.vmin)
                .push_bind(r.vmax)
                .push_bind(r.vm_cost)
                .push_bind(r.angle_min)
                .push_bind(r.angle_max)
                .push_bind(r.angle_cost)
                .push_bind(r.r_fault)
                .push_bind(r.x_fault)
                .push_bind(r.x)
                .push_bind(r.y)
                .push_bind(r.longitude)
                .push_bind(r.latitude)
                .push_bind(r.is_slack)
                .push_bind(r.active)
                .push_bind(r.is_dc)
                .push_bind(r.graphic_type)
                .push_bind(r.h)
                .push_bind(r.w)
                .push_bind(r.country)
                .push_bind(r.area)
                .push_bind(r.zone)
                .push_bind(r.substation)
                .push_bind(r.voltage_level)
                .push_bind(r.bus_bar)
                .push_bind(r.ph_a)
                .push_bind(r.ph_b)
                .push_bind(r.ph_c)
                .push_bind(r.ph_n)
                .push_bind(r.is_grounded)
                .push_bind(r.active_prof)
                .push_bind(r.vmin_prof)
                .push_bind(r.vmax_prof);
        }
        ElementRow::Load(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.bus_idtag)
                .push_bind(r.active)
                .push_bind(r.p)
                .push_bind(r.q)
                .push_bind(r.conn)
                .push_bind(r.longitude)
                .push_bind(r.latitude);
        }
        ElementRow::Generator(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.bus_idtag)
                .push_bind(r.active)
                .push_bind(r.p)
                .push_bind(r.vset)
                .push_bind(r.qmin)
                .push_bind(r.qmax)
                .push_bind(r.pf);
        }
        ElementRow::Shunt(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.bus_idtag)
                .push_bind(r.active)
                .push_bind(r.b);
        }
        ElementRow::Line(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.bus_from_idtag)
                .push_bind(r.bus_to_idtag)
                .push_bind(r.active)
                .push_bind(r.r)
                .push_bind(r.x)
                .push_bind(r.b)
                .push_bind(r.length);
        }
        ElementRow::Transformer2W(r) => {
            b.push_bind(r.grid_id)
                .push_bind(r.idtag)
                .push_bind(r.name)
                .push_bind(r.code)
                .push_bind(r.bus_from_idtag)
                .push_bind(r.bus_to_idtag)
                .push_bind(r.active)
                .push_bind(r.r)
                .push_bind(r.x)
                .push_bind(r.g)
                .push_bind(r.b)
                .push_bind(r.hv)
                .push_bind(r.lv)
                .push_bind(r.sn);
        }
    }
}

/// `INSERT .. ON CONFLICT (grid_id, idtag) DO UPDATE` in batches that stay
/// under the bind limit.
async fn upsert_rows(
    tx: &mut Transaction<'_, Postgres>,
    kind: ElementKind,
    rows: &[ElementRow],
) -> StoreResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let cols = columns(kind);
    let update = cols
        .iter()
        .filter(|c| !matches!(**c, "grid_id" | "idtag"))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    for batch in rows.chunks(BIND_LIMIT / cols.len()) {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            kind.table(),
            cols.join(", ")
        ));
        qb.push_values(batch, |b, row| bind_row(b, row));
        qb.push(format!(" ON CONFLICT (grid_id, idtag) DO UPDATE SET {update}"));
        qb.build().execute(&mut **tx).await.map_err(classify)?;
    }
    debug!(table = kind.table(), rows = rows.len(), "upserted");
    Ok(())
}

/// Switch off the generators, loads and shunts on a bus inside `tx`.
async fn cascade_from_bus(
    tx: &mut Transaction<'_, Postgres>,
    grid_id: i32,
    bus_idtag: &str,
) -> StoreResult<CascadeSummary> {
    let mut summary = CascadeSummary::default();
    for kind in ElementKind::BUS_ATTACHED {
        let sql = format!(
            "UPDATE {} SET active = FALSE WHERE grid_id = $1 AND bus_idtag = $2",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(grid_id)
            .bind(bus_idtag)
            .execute(&mut **tx)
            .await?;
        summary.add(kind, result.rows_affected());
    }
    Ok(summary)
}

#[async_trait]
impl GridRepository for PgRepository {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn save_grid(
        &self,
        model: &GridModel,
        circuit_path: Option<&str>,
    ) -> StoreResult<IngestSummary> {
        let raw_json = serde_json::to_value(model)?;
        let mut tx = self.pool.begin().await?;

        let grid_id: i32 = sqlx::query_scalar(
            "INSERT INTO grids (name, base_mva, raw_json, tmp_file_path) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(model.name.as_deref())
        .bind(model.base_mva)
        .bind(raw_json)
        .bind(circuit_path)
        .fetch_one(&mut *tx)
        .await?;

        let mut summary = IngestSummary {
            grid_id,
            ..Default::default()
        };
        for kind in INGEST_ORDER {
            let rows = rows_for(kind, grid_id, &model.model_data);
            upsert_rows(&mut tx, kind, &rows).await?;
            summary.record(kind, ingestible_count(kind, &model.model_data));
        }

        // dropping `tx` on any earlier `?` rolls the whole grid back
        tx.commit().await?;
        info!(grid_id, buses = summary.buses_saved, "grid saved");
        Ok(summary)
    }

    async fn list_grid_ids(&self) -> StoreResult<Vec<i32>> {
        let ids = sqlx::query_scalar("SELECT id FROM grids ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn get_grid(&self, grid_id: i32) -> StoreResult<Option<GridRow>> {
        let row = sqlx::query_as::<_, GridRow>(
            "SELECT id, name, base_mva, raw_json, created_at, tmp_file_path FROM grids WHERE id = $1",
        )
        .bind(grid_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_grid(&self, grid_id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM grids WHERE id = $1")
            .bind(grid_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_elements(
        &self,
        kind: ElementKind,
        grid_id: Option<i32>,
    ) -> StoreResult<Vec<ElementRow>> {
        let filter = grid_id.map_or(Filter::All, Filter::Grid);
        self.select_rows(kind, filter).await
    }

    async fn get_element(&self, kind: ElementKind, id: i32) -> StoreResult<Option<ElementRow>> {
        Ok(self.select_rows(kind, Filter::Id(id)).await?.into_iter().next())
    }

    async fn set_active(
        &self,
        kind: ElementKind,
        id: i32,
        active: bool,
    ) -> StoreResult<Option<ElementRef>> {
        let sql = format!(
            "UPDATE {} SET active = $1 WHERE id = $2 RETURNING grid_id, idtag",
            kind.table()
        );
        let row = sqlx::query_as::<_, (i32, String)>(&sql)
            .bind(active)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(grid_id, idtag)| ElementRef { grid_id, idtag }))
    }

    async fn deactivate_bus_attachments(
        &self,
        grid_id: i32,
        bus_idtag: &str,
    ) -> StoreResult<CascadeSummary> {
        let mut tx = self.pool.begin().await?;
        let summary = cascade_from_bus(&mut tx, grid_id, bus_idtag).await?;
        tx.commit().await?;
        Ok(summary)
    }

    async fn deactivate_bus(
        &self,
        bus_id: i32,
    ) -> StoreResult<Option<(ElementRef, CascadeSummary)>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, (i32, String)>(
            "UPDATE buses SET active = FALSE WHERE id = $1 RETURNING grid_id, idtag",
        )
        .bind(bus_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((grid_id, idtag)) = row else {
            return Ok(None);
        };
        let summary = cascade_from_bus(&mut tx, grid_id, &idtag).await?;
        tx.commit().await?;
        Ok(Some((ElementRef { grid_id, idtag }, summary)))
    }

    async fn active_flags(
        &self,
        kind: ElementKind,
        grid_id: i32,
    ) -> StoreResult<Vec<(String, bool)>> {
        let sql = format!(
            "SELECT idtag, COALESCE(active, TRUE) FROM {} WHERE grid_id = $1 ORDER BY id",
            kind.table()
        );
        let flags = sqlx::query_as::<_, (String, bool)>(&sql)
            .bind(grid_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lists_start_with_key() {
        for kind in ElementKind::ALL {
            let cols = columns(kind);
            assert_eq!(&cols[..2], &["grid_id", "idtag"], "{kind}");
            assert!(cols.contains(&"active"), "{kind}");
        }
    }

    #[test]
    fn test_branch_tables_reference_both_ends() {
        for kind in [ElementKind::Line, ElementKind::Transformer2W] {
            let cols = columns(kind);
            assert!(cols.contains(&"bus_from_idtag") && cols.contains(&"bus_to_idtag"));
        }
        for kind in ElementKind::BUS_ATTACHED {
            assert!(columns(kind).contains(&"bus_idtag"));
        }
    }

    #[test]
    fn test_batches_fit_bind_limit() {
        let cols = columns(ElementKind::Bus).len();
        assert!(BIND_LIMIT / cols * cols <= BIND_LIMIT);
        assert!(BIND_LIMIT / cols > 1000);
    }
}
