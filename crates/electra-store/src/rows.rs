//! Row types, one per table, shared by every repository implementation.

use chrono::{DateTime, Utc};
use electra_core::{
    BusRecord, ElementKind, ElementRef, GeneratorRecord, LineRecord, LoadRecord, ModelData,
    ShuntRecord, Transformer2WRecord, WireRecord,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct GridRow {
    pub id: i32,
    pub name: Option<String>,
    pub base_mva: Option<f64>,
    #[serde(skip_serializing)]
    pub raw_json: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub tmp_file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct BusRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub vnom: Option<f64>,
    pub vm0: Option<f64>,
    pub va0: Option<f64>,
    pub vmin: Option<f64>,
    pub vmax: Option<f64>,
    pub vm_cost: Option<f64>,
    pub angle_min: Option<f64>,
    pub angle_max: Option<f64>,
    pub angle_cost: Option<f64>,
    pub r_fault: Option<f64>,
    pub x_fault: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub is_slack: Option<bool>,
    pub active: Option<bool>,
    pub is_dc: Option<bool>,
    pub graphic_type: Option<String>,
    pub h: Option<f64>,
    pub w: Option<f64>,
    pub country: Option<String>,
    pub area: Option<String>,
    pub zone: Option<String>,
    pub substation: Option<String>,
    pub voltage_level: Option<String>,
    pub bus_bar: Option<String>,
    pub ph_a: Option<bool>,
    pub ph_b: Option<bool>,
    pub ph_c: Option<bool>,
    pub ph_n: Option<bool>,
    pub is_grounded: Option<bool>,
    pub active_prof: Option<Value>,
    pub vmin_prof: Option<Value>,
    pub vmax_prof: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct LoadRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub bus_idtag: String,
    pub active: Option<bool>,
    pub p: Option<f64>,
    pub q: Option<f64>,
    pub conn: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct GeneratorRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub bus_idtag: String,
    pub active: Option<bool>,
    pub p: Option<f64>,
    pub vset: Option<f64>,
    pub qmin: Option<f64>,
    pub qmax: Option<f64>,
    pub pf: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct ShuntRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub bus_idtag: String,
    pub active: Option<bool>,
    pub b: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct LineRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub bus_from_idtag: String,
    pub bus_to_idtag: String,
    pub active: Option<bool>,
    pub r: Option<f64>,
    pub x: Option<f64>,
    pub b: Option<f64>,
    pub length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct Transformer2WRow {
    pub id: i32,
    pub grid_id: i32,
    pub idtag: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub bus_from_idtag: String,
    pub bus_to_idtag: String,
    pub active: Option<bool>,
    pub r: Option<f64>,
    pub x: Option<f64>,
    pub g: Option<f64>,
    pub b: Option<f64>,
    pub hv: Option<f64>,
    pub lv: Option<f64>,
    pub sn: Option<f64>,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl BusRow {
    pub fn from_record(grid_id: i32, r: &BusRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            vnom: r.vnom,
            vm0: r.vm0,
            va0: r.va0,
            vmin: r.vmin,
            vmax: r.vmax,
            vm_cost: r.vm_cost,
            angle_min: r.angle_min,
            angle_max: r.angle_max,
            angle_cost: r.angle_cost,
            r_fault: r.r_fault,
            x_fault: r.x_fault,
            x: r.x,
            y: r.y,
            longitude: r.longitude,
            latitude: r.latitude,
            is_slack: Some(r.is_slack()),
            active: Some(r.is_active()),
            is_dc: r.is_dc,
            graphic_type: r.graphic_type.clone(),
            h: r.h,
            w: r.w,
            country: r.country.clone(),
            area: r.area.clone(),
            zone: r.zone.clone(),
            substation: r.substation.clone(),
            voltage_level: r.voltage_level.clone(),
            bus_bar: r.bus_bar.clone(),
            ph_a: r.ph_a,
            ph_b: r.ph_b,
            ph_c: r.ph_c,
            ph_n: r.ph_n,
            is_grounded: r.is_grounded,
            active_prof: r.active_prof.clone(),
            vmin_prof: r.vmin_prof.clone(),
            vmax_prof: r.vmax_prof.clone(),
        }
    }
}

impl LoadRow {
    pub fn from_record(grid_id: i32, r: &LoadRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            bus_idtag: text(&r.bus),
            active: Some(r.is_active()),
            p: r.p,
            q: r.q,
            conn: r.conn.clone(),
            longitude: r.longitude,
            latitude: r.latitude,
        }
    }
}

impl GeneratorRow {
    pub fn from_record(grid_id: i32, r: &GeneratorRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            bus_idtag: text(&r.bus),
            active: Some(r.is_active()),
            p: r.p,
            vset: r.vset,
            qmin: r.qmin,
            qmax: r.qmax,
            pf: r.pf,
        }
    }
}

impl ShuntRow {
    pub fn from_record(grid_id: i32, r: &ShuntRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            bus_idtag: text(&r.bus),
            active: Some(r.is_active()),
            b: r.b,
        }
    }
}

impl LineRow {
    pub fn from_record(grid_id: i32, r: &LineRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            bus_from_idtag: text(&r.bus_from),
            bus_to_idtag: text(&r.bus_to),
            active: Some(r.is_active()),
            r: r.r,
            x: r.x,
            b: r.b,
            length: r.length,
        }
    }
}

impl Transformer2WRow {
    pub fn from_record(grid_id: i32, r: &Transformer2WRecord) -> Self {
        Self {
            id: 0,
            grid_id,
            idtag: text(&r.idtag),
            name: r.name.clone(),
            code: r.code.clone(),
            bus_from_idtag: text(&r.bus_from),
            bus_to_idtag: text(&r.bus_to),
            active: Some(r.is_active()),
            r: r.r,
            x: r.x,
            g: r.g,
            b: r.b,
            hv: r.hv,
            lv: r.lv,
            sn: r.sn,
        }
    }
}

/// A persisted element of any kind, serialized as its bare row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ElementRow {
    Bus(BusRow),
    Load(LoadRow),
    Generator(GeneratorRow),
    Shunt(ShuntRow),
    Line(LineRow),
    Transformer2W(Transformer2WRow),
}

macro_rules! element_row_field {
    ($self:ident, $row:ident => $expr:expr) => {
        match $self {
            ElementRow::Bus($row) => $expr,
            ElementRow::Load($row) => $expr,
            ElementRow::Generator($row) => $expr,
            ElementRow::Shunt($row) => $expr,
            ElementRow::Line($row) => $expr,
            ElementRow::Transformer2W($row) => $expr,
        }
    };
}

impl ElementRow {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementRow::Bus(_) => ElementKind::Bus,
            ElementRow::Load(_) => ElementKind::Load,
            ElementRow::Generator(_) => ElementKind::Generator,
            ElementRow::Shunt(_) => ElementKind::Shunt,
            ElementRow::Line(_) => ElementKind::Line,
            ElementRow::Transformer2W(_) => ElementKind::Transformer2W,
        }
    }

    pub fn id(&self) -> i32 {
        element_row_field!(self, r => r.id)
    }

    pub fn grid_id(&self) -> i32 {
        element_row_field!(self, r => r.grid_id)
    }

    pub fn idtag(&self) -> &str {
        element_row_field!(self, r => r.idtag.as_str())
    }

    pub fn active(&self) -> Option<bool> {
        element_row_field!(self, r => r.active)
    }

    pub fn set_active(&mut self, active: bool) {
        element_row_field!(self, r => r.active = Some(active))
    }

    pub(crate) fn set_id(&mut self, id: i32) {
        element_row_field!(self, r => r.id = id)
    }

    pub fn element_ref(&self) -> ElementRef {
        ElementRef {
            grid_id: self.grid_id(),
            idtag: self.idtag().to_string(),
        }
    }

    /// The bus this element hangs off, for bus-attached kinds.
    pub fn bus_idtag(&self) -> Option<&str> {
        match self {
            ElementRow::Load(r) => Some(&r.bus_idtag),
            ElementRow::Generator(r) => Some(&r.bus_idtag),
            ElementRow::Shunt(r) => Some(&r.bus_idtag),
            _ => None,
        }
    }

    /// Bus idtags this element references.
    pub fn referenced_buses(&self) -> Vec<&str> {
        match self {
            ElementRow::Line(r) => vec![r.bus_from_idtag.as_str(), r.bus_to_idtag.as_str()],
            ElementRow::Transformer2W(r) => vec![r.bus_from_idtag.as_str(), r.bus_to_idtag.as_str()],
            other => other.bus_idtag().into_iter().collect(),
        }
    }
}

/// Rows for every ingestible record of `kind`, keeping the last record when
/// an idtag repeats.
pub fn rows_for(kind: ElementKind, grid_id: i32, model: &ModelData) -> Vec<ElementRow> {
    fn collect<R: WireRecord>(records: &[R], to_row: impl Fn(&R) -> ElementRow) -> Vec<ElementRow> {
        let mut rows: Vec<ElementRow> = Vec::new();
        for record in records.iter().filter(|r| r.is_ingestible()) {
            let row = to_row(record);
            match rows.iter_mut().find(|existing| existing.idtag() == row.idtag()) {
                Some(existing) => *existing = row,
                None => rows.push(row),
            }
        }
        rows
    }

    match kind {
        ElementKind::Bus => collect(&model.bus, |r| ElementRow::Bus(BusRow::from_record(grid_id, r))),
        ElementKind::Load => collect(&model.load, |r| ElementRow::Load(LoadRow::from_record(grid_id, r))),
        ElementKind::Generator => collect(&model.generator, |r| {
            ElementRow::Generator(GeneratorRow::from_record(grid_id, r))
        }),
        ElementKind::Shunt => {
            collect(&model.shunt, |r| ElementRow::Shunt(ShuntRow::from_record(grid_id, r)))
        }
        ElementKind::Line => collect(&model.line, |r| ElementRow::Line(LineRow::from_record(grid_id, r))),
        ElementKind::Transformer2W => collect(&model.transformer2w, |r| {
            ElementRow::Transformer2W(Transformer2WRow::from_record(grid_id, r))
        }),
    }
}

/// Number of records of `kind` that qualify for persistence.
pub fn ingestible_count(kind: ElementKind, model: &ModelData) -> usize {
    fn count<R: WireRecord>(records: &[R]) -> usize {
        records.iter().filter(|r| r.is_ingestible()).count()
    }
    match kind {
        ElementKind::Bus => count(&model.bus),
        ElementKind::Load => count(&model.load),
        ElementKind::Generator => count(&model.generator),
        ElementKind::Shunt => count(&model.shunt),
        ElementKind::Line => count(&model.line),
        ElementKind::Transformer2W => count(&model.transformer2w),
    }
}
