use serde::{Deserialize, Serialize};
use std::fmt;

/// The element families persisted per grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bus,
    Load,
    Generator,
    Shunt,
    Line,
    Transformer2W,
}

impl ElementKind {
    pub const ALL: [ElementKind; 6] = [
        ElementKind::Bus,
        ElementKind::Load,
        ElementKind::Generator,
        ElementKind::Shunt,
        ElementKind::Line,
        ElementKind::Transformer2W,
    ];

    /// Elements whose `active` flag follows their bus on deactivation.
    pub const BUS_ATTACHED: [ElementKind; 3] =
        [ElementKind::Generator, ElementKind::Load, ElementKind::Shunt];

    /// Relational table backing this kind.
    pub fn table(self) -> &'static str {
        match self {
            ElementKind::Bus => "buses",
            ElementKind::Load => "loads",
            ElementKind::Generator => "generators",
            ElementKind::Shunt => "shunts",
            ElementKind::Line => "lines",
            ElementKind::Transformer2W => "transformers2w",
        }
    }

    /// Human-facing label used in API messages.
    pub fn label(self) -> &'static str {
        match self {
            ElementKind::Bus => "Bus",
            ElementKind::Load => "Load",
            ElementKind::Generator => "Generator",
            ElementKind::Shunt => "Shunt",
            ElementKind::Line => "Line",
            ElementKind::Transformer2W => "Transformer2W",
        }
    }

    /// Key under which status updates echo the element id.
    pub fn id_key(self) -> &'static str {
        match self {
            ElementKind::Bus => "bus_id",
            ElementKind::Load => "load_id",
            ElementKind::Generator => "generator_id",
            ElementKind::Shunt => "shunt_id",
            ElementKind::Line => "line_id",
            ElementKind::Transformer2W => "transformer_id",
        }
    }

    /// URL prefix the element is served under.
    pub fn route(self) -> &'static str {
        match self {
            ElementKind::Bus => "bus",
            ElementKind::Load => "load",
            ElementKind::Generator => "generator",
            ElementKind::Shunt => "shunt",
            ElementKind::Line => "line",
            ElementKind::Transformer2W => "transformer2w",
        }
    }

    pub fn is_bus_attached(self) -> bool {
        Self::BUS_ATTACHED.contains(&self)
    }

    pub fn is_branch(self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Transformer2W)
    }

    pub fn not_found_message(self) -> String {
        format!("{} not found", self.label())
    }

    pub fn status_updated_message(self) -> String {
        format!("{} status updated", self.label())
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a persisted element inside its grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub grid_id: i32,
    pub idtag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_injections_follow_their_bus() {
        let attached: Vec<_> = ElementKind::ALL
            .iter()
            .filter(|k| k.is_bus_attached())
            .collect();
        assert_eq!(attached.len(), 3);
        assert!(!ElementKind::Line.is_bus_attached());
        assert!(!ElementKind::Transformer2W.is_bus_attached());
        assert!(!ElementKind::Bus.is_bus_attached());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ElementKind::Generator.not_found_message(),
            "Generator not found"
        );
        assert_eq!(
            ElementKind::Transformer2W.status_updated_message(),
            "Transformer2W status updated"
        );
        assert_eq!(ElementKind::Transformer2W.id_key(), "transformer_id");
    }

    #[test]
    fn test_tables_are_distinct() {
        let mut tables: Vec<_> = ElementKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), ElementKind::ALL.len());
    }
}
