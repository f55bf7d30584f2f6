//! # electra-engine: the grid-analysis boundary
//!
//! The service only ever talks to an engine through [`GridEngine`]: open a
//! circuit file, flip element flags, save it back, hand out the model payload
//! and run a power flow. [`NativeEngine`] is the in-process implementation.
//!
//! ## Modules
//!
//! - [`file`]: JSON / zip circuit file codec
//! - [`circuit`]: [`Circuit`] and its flag operations
//! - [`topology`]: island detection over active equipment
//! - [`power_flow`]: Newton-Raphson AC power flow
//! - [`results`]: per-bus and per-branch results

use std::path::Path;

use electra_core::{ElectraError, ElectraResult, GridModel};
use tracing::{debug, info};

pub mod circuit;
pub mod file;
pub mod power_flow;
pub mod results;
pub mod topology;

pub use circuit::Circuit;
pub use file::CircuitFormat;
pub use power_flow::{run_power_flow, PowerFlowOptions};
pub use results::{BranchResult, BusResult, PowerFlowResults};

/// Operations the service needs from a grid-analysis engine.
pub trait GridEngine: Send + Sync {
    fn open_file(&self, path: &Path) -> ElectraResult<Circuit>;

    fn save_file(&self, circuit: &Circuit, path: &Path) -> ElectraResult<()>;

    /// Model payload persisted when a circuit is ingested.
    fn gather_model(&self, circuit: &Circuit) -> GridModel;

    fn power_flow(
        &self,
        circuit: &Circuit,
        options: &PowerFlowOptions,
    ) -> ElectraResult<PowerFlowResults>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl GridEngine for NativeEngine {
    fn open_file(&self, path: &Path) -> ElectraResult<Circuit> {
        let (model, format) = file::read_circuit(path)?;
        debug!(path = %path.display(), buses = model.model_data.bus.len(), "circuit opened");
        Ok(Circuit { model, format })
    }

    fn save_file(&self, circuit: &Circuit, path: &Path) -> ElectraResult<()> {
        file::write_circuit(&circuit.model, &circuit.format, path)?;
        debug!(path = %path.display(), "circuit saved");
        Ok(())
    }

    fn gather_model(&self, circuit: &Circuit) -> GridModel {
        circuit.model.clone()
    }

    fn power_flow(
        &self,
        circuit: &Circuit,
        options: &PowerFlowOptions,
    ) -> ElectraResult<PowerFlowResults> {
        let results = run_power_flow(&circuit.model, options)
            .map_err(|e| ElectraError::Engine(format!("{e:#}")))?;
        info!(
            grid = circuit.name().unwrap_or_default(),
            converged = results.converged,
            iterations = results.iterations,
            error = results.error,
            "power flow finished"
        );
        Ok(results)
    }
}
