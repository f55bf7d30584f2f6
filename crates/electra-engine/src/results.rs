use electra_core::ElementKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusResult {
    pub idtag: String,
    pub name: Option<String>,
    /// Voltage magnitude (p.u.); zero on de-energized buses.
    pub vm: f64,
    /// Voltage angle (degrees).
    pub va: f64,
    /// Net injection (MW).
    pub p: f64,
    /// Net injection (MVAr).
    pub q: f64,
    pub island: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchResult {
    pub idtag: String,
    pub name: Option<String>,
    pub kind: ElementKind,
    pub bus_from: Option<String>,
    pub bus_to: Option<String>,
    pub pf: f64,
    pub qf: f64,
    pub pt: f64,
    pub qt: f64,
    /// Active power losses (MW).
    pub losses: f64,
    /// Apparent power over rating (%), when the branch has a rating.
    pub loading: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowResults {
    pub converged: bool,
    /// Largest remaining power mismatch (p.u.).
    pub error: f64,
    pub iterations: usize,
    pub bus_results: Vec<BusResult>,
    pub branch_results: Vec<BranchResult>,
}

impl PowerFlowResults {
    pub fn bus(&self, idtag: &str) -> Option<&BusResult> {
        self.bus_results.iter().find(|b| b.idtag == idtag)
    }

    pub fn branch(&self, idtag: &str) -> Option<&BranchResult> {
        self.branch_results.iter().find(|b| b.idtag == idtag)
    }
}
