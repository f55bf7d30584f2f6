//! Wire format exchanged with the grid-analysis engine.
//!
//! Field names follow the engine's own spelling (`Vnom`, `P`, `bus_from`, ...)
//! so payloads round-trip without translation. Anything this crate does not
//! model explicitly is kept in `extra` maps and written back unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default system base when neither the model nor its circuit carries one.
pub const DEFAULT_BASE_MVA: f64 = 100.0;

/// Common surface of every element record.
pub trait WireRecord {
    fn idtag(&self) -> Option<&str>;
    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool);

    /// Whether the record carries every key required to persist it.
    fn is_ingestible(&self) -> bool;
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Accepts strings, numbers and booleans for text columns; engines are not
/// consistent about quoting taxonomy references.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridModel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(rename = "baseMVA", default, skip_serializing_if = "Option::is_none")]
    pub base_mva: Option<f64>,
    #[serde(rename = "Comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(rename = "ModelVersion", default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<i64>,
    #[serde(rename = "UserName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Value>,
    #[serde(default)]
    pub model_data: ModelData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagrams: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GridModel {
    /// Name reported for the grid: the model's own, else its circuit's.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.model_data
                    .circuit
                    .as_ref()
                    .and_then(|c| c.name.as_deref())
            })
    }

    /// System MVA base used for per-unit conversion.
    pub fn system_base_mva(&self) -> f64 {
        self.base_mva
            .or_else(|| self.model_data.circuit.as_ref().and_then(|c| c.sbase))
            .filter(|b| *b > 0.0)
            .unwrap_or(DEFAULT_BASE_MVA)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    #[serde(default)]
    pub bus: Vec<BusRecord>,
    #[serde(default)]
    pub load: Vec<LoadRecord>,
    #[serde(default)]
    pub generator: Vec<GeneratorRecord>,
    #[serde(default)]
    pub shunt: Vec<ShuntRecord>,
    #[serde(default)]
    pub transformer2w: Vec<Transformer2WRecord>,
    #[serde(default)]
    pub line: Vec<LineRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitInfo>,
    /// Collections the service does not persist (contingencies, HVDC, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(rename = "Sbase", default, skip_serializing_if = "Option::is_none")]
    pub sbase: Option<f64>,
    #[serde(rename = "fBase", default, skip_serializing_if = "Option::is_none")]
    pub fbase: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_slack: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dc: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub graphic_type: Option<String>,
    #[serde(rename = "Vnom", default, skip_serializing_if = "Option::is_none")]
    pub vnom: Option<f64>,
    #[serde(rename = "Vm0", default, skip_serializing_if = "Option::is_none")]
    pub vm0: Option<f64>,
    #[serde(rename = "Va0", default, skip_serializing_if = "Option::is_none")]
    pub va0: Option<f64>,
    #[serde(rename = "Vmin", default, skip_serializing_if = "Option::is_none")]
    pub vmin: Option<f64>,
    #[serde(rename = "Vmax", default, skip_serializing_if = "Option::is_none")]
    pub vmax: Option<f64>,
    #[serde(rename = "Vm_cost", default, skip_serializing_if = "Option::is_none")]
    pub vm_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_fault: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_fault: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub area: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub substation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub voltage_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus_bar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_a: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_b: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_c: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph_n: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_grounded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_prof: Option<Value>,
    #[serde(rename = "Vmin_prof", default, skip_serializing_if = "Option::is_none")]
    pub vmin_prof: Option<Value>,
    #[serde(rename = "Vmax_prof", default, skip_serializing_if = "Option::is_none")]
    pub vmax_prof: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(rename = "Q", default, skip_serializing_if = "Option::is_none")]
    pub q: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(rename = "Vset", default, skip_serializing_if = "Option::is_none")]
    pub vset: Option<f64>,
    #[serde(rename = "Qmin", default, skip_serializing_if = "Option::is_none")]
    pub qmin: Option<f64>,
    #[serde(rename = "Qmax", default, skip_serializing_if = "Option::is_none")]
    pub qmax: Option<f64>,
    #[serde(rename = "Pf", default, skip_serializing_if = "Option::is_none")]
    pub pf: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShuntRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Conductance in MW at nominal voltage.
    #[serde(rename = "G", default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    /// Susceptance in MVAr at nominal voltage.
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus_from: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    /// Thermal rating in MVA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformer2WRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub idtag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus_from: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bus_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(rename = "G", default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(rename = "HV", default, skip_serializing_if = "Option::is_none")]
    pub hv: Option<f64>,
    #[serde(rename = "LV", default, skip_serializing_if = "Option::is_none")]
    pub lv: Option<f64>,
    #[serde(rename = "Sn", default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_module: Option<f64>,
    /// Phase shift in radians.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_phase: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! impl_wire_record {
    ($ty:ty, |$r:ident| $ingestible:expr) => {
        impl WireRecord for $ty {
            fn idtag(&self) -> Option<&str> {
                self.idtag.as_deref()
            }

            fn is_active(&self) -> bool {
                self.active.unwrap_or(true)
            }

            fn set_active(&mut self, active: bool) {
                self.active = Some(active);
            }

            fn is_ingestible(&self) -> bool {
                let $r = self;
                $ingestible
            }
        }
    };
}

impl_wire_record!(BusRecord, |r| has_text(&r.idtag));
impl_wire_record!(LoadRecord, |r| has_text(&r.idtag) && has_text(&r.bus));
impl_wire_record!(GeneratorRecord, |r| has_text(&r.idtag) && has_text(&r.bus));
impl_wire_record!(ShuntRecord, |r| has_text(&r.idtag) && has_text(&r.bus));
impl_wire_record!(LineRecord, |r| has_text(&r.idtag)
    && has_text(&r.bus_from)
    && has_text(&r.bus_to));
impl_wire_record!(Transformer2WRecord, |r| has_text(&r.idtag)
    && has_text(&r.bus_from)
    && has_text(&r.bus_to));

impl BusRecord {
    pub fn is_slack(&self) -> bool {
        self.is_slack.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_field_names() {
        let payload = json!({
            "name": "case",
            "baseMVA": 100.0,
            "model_data": {
                "bus": [{"idtag": "b1", "Vnom": 110.0, "is_slack": true, "rdfid": "x"}],
                "generator": [{"idtag": "g1", "bus": "b1", "P": 40.0, "Vset": 1.02}],
                "line": [{"idtag": "l1", "bus_from": "b1", "bus_to": "b2", "R": 0.01, "X": 0.1}],
                "contingency": [{"idtag": "c1"}]
            }
        });
        let model: GridModel = serde_json::from_value(payload).unwrap();
        let bus = &model.model_data.bus[0];
        assert_eq!(bus.vnom, Some(110.0));
        assert!(bus.is_slack());
        assert!(bus.is_active());
        assert_eq!(bus.extra.get("rdfid"), Some(&json!("x")));
        assert_eq!(model.model_data.generator[0].vset, Some(1.02));
        assert_eq!(model.model_data.line[0].x, Some(0.1));
        assert!(model.model_data.extra.contains_key("contingency"));
    }

    #[test]
    fn test_unknown_collections_survive_serialization() {
        let payload = json!({
            "name": "case",
            "model_data": {"hvdc": [{"idtag": "h1"}], "bus": []}
        });
        let model: GridModel = serde_json::from_value(payload).unwrap();
        let back = serde_json::to_value(&model).unwrap();
        assert_eq!(back["model_data"]["hvdc"][0]["idtag"], "h1");
    }

    #[test]
    fn test_numeric_taxonomy_is_accepted_as_text() {
        let bus: BusRecord =
            serde_json::from_value(json!({"idtag": "b", "area": 3, "zone": null})).unwrap();
        assert_eq!(bus.area.as_deref(), Some("3"));
        assert_eq!(bus.zone, None);
    }

    #[test]
    fn test_ingestible_requires_keys() {
        let bus = BusRecord {
            idtag: Some(String::new()),
            ..Default::default()
        };
        assert!(!bus.is_ingestible());

        let load = LoadRecord {
            idtag: Some("l".into()),
            ..Default::default()
        };
        assert!(!load.is_ingestible());

        let line = LineRecord {
            idtag: Some("ln".into()),
            bus_from: Some("a".into()),
            bus_to: Some("b".into()),
            ..Default::default()
        };
        assert!(line.is_ingestible());
    }

    #[test]
    fn test_set_active_is_explicit() {
        let mut gen = GeneratorRecord::default();
        assert!(gen.is_active());
        gen.set_active(false);
        assert_eq!(gen.active, Some(false));
    }

    #[test]
    fn test_base_mva_fallbacks() {
        let mut model = GridModel::default();
        assert_eq!(model.system_base_mva(), DEFAULT_BASE_MVA);
        model.model_data.circuit = Some(CircuitInfo {
            sbase: Some(50.0),
            name: Some("inner".into()),
            ..Default::default()
        });
        assert_eq!(model.system_base_mva(), 50.0);
        assert_eq!(model.display_name(), Some("inner"));
        model.base_mva = Some(10.0);
        assert_eq!(model.system_base_mva(), 10.0);
    }
}
