use std::collections::HashMap;

use electra_core::{ElementKind, GridModel, WireRecord};

use crate::file::CircuitFormat;

/// An opened circuit file: the model plus the container it was read from.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    pub model: GridModel,
    pub format: CircuitFormat,
}

impl Circuit {
    pub fn new(model: GridModel) -> Self {
        Self {
            model,
            format: CircuitFormat::Json,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.model.display_name()
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.records(kind).count()
    }

    fn records(&self, kind: ElementKind) -> Box<dyn Iterator<Item = &dyn WireRecord> + '_> {
        let data = &self.model.model_data;
        match kind {
            ElementKind::Bus => Box::new(data.bus.iter().map(|r| r as &dyn WireRecord)),
            ElementKind::Load => Box::new(data.load.iter().map(|r| r as &dyn WireRecord)),
            ElementKind::Generator => {
                Box::new(data.generator.iter().map(|r| r as &dyn WireRecord))
            }
            ElementKind::Shunt => Box::new(data.shunt.iter().map(|r| r as &dyn WireRecord)),
            ElementKind::Line => Box::new(data.line.iter().map(|r| r as &dyn WireRecord)),
            ElementKind::Transformer2W => {
                Box::new(data.transformer2w.iter().map(|r| r as &dyn WireRecord))
            }
        }
    }

    fn records_mut(
        &mut self,
        kind: ElementKind,
    ) -> Box<dyn Iterator<Item = &mut dyn WireRecord> + '_> {
        let data = &mut self.model.model_data;
        match kind {
            ElementKind::Bus => Box::new(data.bus.iter_mut().map(|r| r as &mut dyn WireRecord)),
            ElementKind::Load => Box::new(data.load.iter_mut().map(|r| r as &mut dyn WireRecord)),
            ElementKind::Generator => Box::new(
                data.generator
                    .iter_mut()
                    .map(|r| r as &mut dyn WireRecord),
            ),
            ElementKind::Shunt => {
                Box::new(data.shunt.iter_mut().map(|r| r as &mut dyn WireRecord))
            }
            ElementKind::Line => Box::new(data.line.iter_mut().map(|r| r as &mut dyn WireRecord)),
            ElementKind::Transformer2W => Box::new(
                data.transformer2w
                    .iter_mut()
                    .map(|r| r as &mut dyn WireRecord),
            ),
        }
    }

    pub fn is_active(&self, kind: ElementKind, idtag: &str) -> Option<bool> {
        self.records(kind)
            .find(|r| r.idtag() == Some(idtag))
            .map(|r| r.is_active())
    }

    /// Set the flag on every element of `kind` tagged `idtag`. Returns
    /// false when nothing matched.
    pub fn set_active(&mut self, kind: ElementKind, idtag: &str, active: bool) -> bool {
        let mut matched = false;
        for record in self.records_mut(kind) {
            if record.idtag() == Some(idtag) {
                record.set_active(active);
                matched = true;
            }
        }
        matched
    }

    /// Switch off the generators, loads and shunts connected to a bus.
    /// Branches are left alone.
    pub fn deactivate_attached(&mut self, bus_idtag: &str) -> usize {
        let data = &mut self.model.model_data;
        let on_bus = |bus: &Option<String>| bus.as_deref() == Some(bus_idtag);
        let mut changed = 0;
        for gen in data.generator.iter_mut().filter(|g| on_bus(&g.bus)) {
            gen.set_active(false);
            changed += 1;
        }
        for load in data.load.iter_mut().filter(|l| on_bus(&l.bus)) {
            load.set_active(false);
            changed += 1;
        }
        for shunt in data.shunt.iter_mut().filter(|s| on_bus(&s.bus)) {
            shunt.set_active(false);
            changed += 1;
        }
        changed
    }

    /// Copy persisted flags onto the circuit. Elements whose idtag is not in
    /// `flags` keep whatever the file says.
    pub fn sync_active(&mut self, kind: ElementKind, flags: &HashMap<String, bool>) -> usize {
        let mut synced = 0;
        for record in self.records_mut(kind) {
            let Some(&active) = record.idtag().and_then(|tag| flags.get(tag)) else {
                continue;
            };
            record.set_active(active);
            synced += 1;
        }
        synced
    }
}
