//! # AC power flow (Newton-Raphson, polar form)
//!
//! Every island found by [`find_islands`] is solved on its own. An island
//! needs an angle reference: the first active bus flagged `is_slack`, or else
//! the bus of the first active generator inside it. Islands without one are
//! reported de-energized (zero voltage, zero flows).
//!
//! ```text
//!  BUS TYPE  │ SPECIFIED       │ SOLVED FOR
//!  ──────────┼─────────────────┼───────────
//!  Slack     │ |V|, θ          │ P, Q
//!  PV        │ P, |V| (Vset)   │ Q, θ
//!  PQ        │ P, Q            │ |V|, θ
//! ```
//!
//! Units on the wire: loads and generators in MW/MVAr, shunts in MW/MVAr at
//! 1 p.u. voltage, branch impedances already in per-unit on the system base.
//! Reactive limits of generators are not enforced.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use electra_core::{ElementKind, GridModel, WireRecord};
use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use num_complex::Complex64;
use tracing::{debug, warn};

use crate::results::{BranchResult, BusResult, PowerFlowResults};
use crate::topology::{find_islands, BranchEnds, Topology};

/// Solver settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlowOptions {
    /// Convergence tolerance on the largest power mismatch (p.u.)
    pub tolerance: f64,
    /// Maximum Newton-Raphson iterations per island
    pub max_iterations: usize,
    /// System base override; the model's own base is used when unset
    pub base_mva: Option<f64>,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 20,
            base_mva: None,
        }
    }
}

impl PowerFlowOptions {
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_base_mva(mut self, base_mva: f64) -> Self {
        self.base_mva = Some(base_mva);
        self
    }
}

/// Series impedance (p.u.) substituted for zero-impedance branches.
const MIN_IMPEDANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusType {
    Slack,
    PV,
    PQ,
}

struct BranchModel {
    idtag: String,
    name: Option<String>,
    kind: ElementKind,
    bus_from: Option<String>,
    bus_to: Option<String>,
    /// Terminals when the branch is in service between two active buses.
    ends: Option<BranchEnds>,
    r: f64,
    x: f64,
    g: f64,
    b: f64,
    tap: f64,
    shift: f64,
    rate: Option<f64>,
}

impl BranchModel {
    /// Jumpers and bus couplers (R = X = 0) are modelled with a small
    /// reactance so both ends stay coupled in the admittance matrix.
    fn series_admittance(&self) -> Complex64 {
        let z = Complex64::new(self.r, self.x);
        if z.norm_sqr() < MIN_IMPEDANCE * MIN_IMPEDANCE {
            Complex64::new(0.0, MIN_IMPEDANCE).inv()
        } else {
            z.inv()
        }
    }

    fn tap_ratio(&self) -> Complex64 {
        let m = if self.tap > 0.0 { self.tap } else { 1.0 };
        Complex64::from_polar(m, self.shift)
    }

    /// Half of the shunt branch admittance, placed at each terminal.
    fn half_shunt(&self) -> Complex64 {
        Complex64::new(self.g / 2.0, self.b / 2.0)
    }
}

fn collect_branches(model: &GridModel, topology: &Topology) -> Vec<BranchModel> {
    let data = &model.model_data;
    let mut branches = Vec::with_capacity(data.line.len() + data.transformer2w.len());

    for line in &data.line {
        let Some(idtag) = line.idtag() else { continue };
        let ends = line
            .is_active()
            .then(|| topology.ends(line.bus_from.as_deref(), line.bus_to.as_deref()))
            .flatten();
        branches.push(BranchModel {
            idtag: idtag.to_string(),
            name: line.name.clone(),
            kind: ElementKind::Line,
            bus_from: line.bus_from.clone(),
            bus_to: line.bus_to.clone(),
            ends,
            r: line.r.unwrap_or(0.0),
            x: line.x.unwrap_or(0.0),
            g: 0.0,
            b: line.b.unwrap_or(0.0),
            tap: 1.0,
            shift: 0.0,
            rate: line.rate,
        });
    }

    for trafo in &data.transformer2w {
        let Some(idtag) = trafo.idtag() else { continue };
        let ends = trafo
            .is_active()
            .then(|| topology.ends(trafo.bus_from.as_deref(), trafo.bus_to.as_deref()))
            .flatten();
        branches.push(BranchModel {
            idtag: idtag.to_string(),
            name: trafo.name.clone(),
            kind: ElementKind::Transformer2W,
            bus_from: trafo.bus_from.clone(),
            bus_to: trafo.bus_to.clone(),
            ends,
            r: trafo.r.unwrap_or(0.0),
            x: trafo.x.unwrap_or(0.0),
            g: trafo.g.unwrap_or(0.0),
            b: trafo.b.unwrap_or(0.0),
            tap: trafo.tap_module.unwrap_or(1.0),
            shift: trafo.tap_phase.unwrap_or(0.0),
            rate: trafo.rate,
        });
    }

    branches
}

struct NrOutcome {
    converged: bool,
    iterations: usize,
    max_mismatch: f64,
}

/// Per-island working set; `members[k]` is the model position of local bus `k`.
struct IslandSystem<'a> {
    members: &'a [usize],
    y_bus: Vec<Vec<Complex64>>,
    bus_types: Vec<BusType>,
    p_spec: Vec<f64>,
    q_spec: Vec<f64>,
}

/// Solve the whole model. Voltages of de-energized buses are reported as zero.
pub fn run_power_flow(model: &GridModel, options: &PowerFlowOptions) -> Result<PowerFlowResults> {
    let data = &model.model_data;
    if data.bus.is_empty() {
        return Err(anyhow!("circuit has no buses"));
    }

    let base_mva = options
        .base_mva
        .filter(|b| *b > 0.0)
        .unwrap_or_else(|| model.system_base_mva());
    let topology = find_islands(model);
    let branches = collect_branches(model, &topology);

    let n_total = data.bus.len();
    let mut v_mag = vec![0.0; n_total];
    let mut v_ang = vec![0.0; n_total];
    let mut p_inj = vec![0.0; n_total];
    let mut q_inj = vec![0.0; n_total];
    let mut energized = vec![false; n_total];

    let mut converged = true;
    let mut any_energized = false;
    let mut iterations = 0;
    let mut max_error: f64 = 0.0;

    for (island_id, members) in topology.islands.iter().enumerate() {
        let Some(system) = build_island(model, &topology, &branches, members, base_mva) else {
            warn!(island = island_id, buses = members.len(), "island has no reference bus, left de-energized");
            continue;
        };

        let (mut vm, mut va) = initial_voltages(model, &system);
        let outcome = newton_raphson(&system, &mut vm, &mut va, options)
            .with_context(|| format!("island {island_id}"))?;
        debug!(
            island = island_id,
            converged = outcome.converged,
            iterations = outcome.iterations,
            mismatch = outcome.max_mismatch,
            "island solved"
        );

        let (p_calc, q_calc) = compute_power(&system.y_bus, &vm, &va);
        for (k, &pos) in system.members.iter().enumerate() {
            v_mag[pos] = vm[k];
            v_ang[pos] = va[k];
            p_inj[pos] = p_calc[k] * base_mva;
            q_inj[pos] = q_calc[k] * base_mva;
            energized[pos] = true;
        }

        any_energized = true;
        converged &= outcome.converged;
        iterations = iterations.max(outcome.iterations);
        max_error = max_error.max(outcome.max_mismatch);
    }

    let bus_results = data
        .bus
        .iter()
        .enumerate()
        .filter_map(|(pos, bus)| {
            Some(BusResult {
                idtag: bus.idtag()?.to_string(),
                name: bus.name.clone(),
                vm: v_mag[pos],
                va: v_ang[pos].to_degrees(),
                p: p_inj[pos],
                q: q_inj[pos],
                island: topology.island_of(pos).filter(|_| energized[pos]),
            })
        })
        .collect();

    let branch_results = branches
        .iter()
        .map(|branch| branch_flow(branch, &v_mag, &v_ang, &energized, base_mva))
        .collect();

    Ok(PowerFlowResults {
        converged: converged && any_energized,
        error: max_error,
        iterations,
        bus_results,
        branch_results,
    })
}

fn build_island<'a>(
    model: &GridModel,
    topology: &Topology,
    branches: &[BranchModel],
    members: &'a [usize],
    base_mva: f64,
) -> Option<IslandSystem<'a>> {
    let data = &model.model_data;
    let local: HashMap<usize, usize> = members.iter().enumerate().map(|(k, &p)| (p, k)).collect();
    let locate = |bus: Option<&str>| -> Option<usize> {
        let pos = topology.bus_index.get(bus?)?;
        local.get(pos).copied()
    };

    let slack = members
        .iter()
        .position(|&p| data.bus[p].is_slack())
        .or_else(|| {
            data.generator
                .iter()
                .filter(|g| g.is_active())
                .find_map(|g| locate(g.bus.as_deref()))
        })?;

    let n = members.len();
    let mut y_bus = vec![vec![Complex64::new(0.0, 0.0); n]; n];
    let mut p_spec = vec![0.0; n];
    let mut q_spec = vec![0.0; n];
    let mut bus_types = vec![BusType::PQ; n];

    for branch in branches {
        let Some(ends) = branch.ends else { continue };
        let (Some(&i), Some(&j)) = (local.get(&ends.from), local.get(&ends.to)) else {
            continue;
        };
        let ys = branch.series_admittance();
        let tap = branch.tap_ratio();
        let sh = branch.half_shunt();
        y_bus[i][j] -= ys / tap.conj();
        y_bus[j][i] -= ys / tap;
        y_bus[i][i] += ys / tap.norm_sqr() + sh;
        y_bus[j][j] += ys + sh;
    }

    for shunt in data.shunt.iter().filter(|s| s.is_active()) {
        if let Some(k) = locate(shunt.bus.as_deref()) {
            y_bus[k][k] += Complex64::new(shunt.g.unwrap_or(0.0), shunt.b.unwrap_or(0.0)) / base_mva;
        }
    }

    for gen in data.generator.iter().filter(|g| g.is_active()) {
        if let Some(k) = locate(gen.bus.as_deref()) {
            p_spec[k] += gen.p.unwrap_or(0.0) / base_mva;
            bus_types[k] = BusType::PV;
        }
    }

    for load in data.load.iter().filter(|l| l.is_active()) {
        if let Some(k) = locate(load.bus.as_deref()) {
            p_spec[k] -= load.p.unwrap_or(0.0) / base_mva;
            q_spec[k] -= load.q.unwrap_or(0.0) / base_mva;
        }
    }

    bus_types[slack] = BusType::Slack;

    Some(IslandSystem {
        members,
        y_bus,
        bus_types,
        p_spec,
        q_spec,
    })
}

/// Flat start, with voltage-controlled buses at their generator setpoint.
fn initial_voltages(model: &GridModel, system: &IslandSystem<'_>) -> (Vec<f64>, Vec<f64>) {
    let data = &model.model_data;
    let mut vm = Vec::with_capacity(system.members.len());
    let mut va = vec![0.0; system.members.len()];

    for (k, &pos) in system.members.iter().enumerate() {
        let bus = &data.bus[pos];
        let mut v = bus.vm0.filter(|v| *v > 0.0).unwrap_or(1.0);
        if system.bus_types[k] != BusType::PQ {
            let tag = bus.idtag();
            if let Some(vset) = data
                .generator
                .iter()
                .filter(|g| g.is_active() && g.bus.as_deref() == tag)
                .find_map(|g| g.vset.filter(|v| *v > 0.0))
            {
                v = vset;
            }
        }
        if system.bus_types[k] == BusType::Slack {
            va[k] = bus.va0.unwrap_or(0.0);
        }
        vm.push(v);
    }
    (vm, va)
}

fn newton_raphson(
    system: &IslandSystem<'_>,
    v_mag: &mut [f64],
    v_ang: &mut [f64],
    options: &PowerFlowOptions,
) -> Result<NrOutcome> {
    // angles are unknown everywhere but the slack, magnitudes only at PQ buses
    let p_buses: Vec<usize> = (0..v_mag.len())
        .filter(|&i| system.bus_types[i] != BusType::Slack)
        .collect();
    let q_buses: Vec<usize> = (0..v_mag.len())
        .filter(|&i| system.bus_types[i] == BusType::PQ)
        .collect();
    let n_p = p_buses.len();
    let n_vars = n_p + q_buses.len();

    if n_vars == 0 {
        return Ok(NrOutcome {
            converged: true,
            iterations: 0,
            max_mismatch: 0.0,
        });
    }

    let mismatch_of = |p_calc: &[f64], q_calc: &[f64]| -> (Vec<f64>, f64) {
        let mut mismatch = Vec::with_capacity(n_vars);
        mismatch.extend(p_buses.iter().map(|&i| system.p_spec[i] - p_calc[i]));
        mismatch.extend(q_buses.iter().map(|&i| system.q_spec[i] - q_calc[i]));
        let max = mismatch.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
        (mismatch, max)
    };

    for iter in 0..options.max_iterations {
        let (p_calc, q_calc) = compute_power(&system.y_bus, v_mag, v_ang);
        let (mismatch, max_mismatch) = mismatch_of(&p_calc, &q_calc);

        if max_mismatch < options.tolerance {
            return Ok(NrOutcome {
                converged: true,
                iterations: iter,
                max_mismatch,
            });
        }

        let jacobian = build_jacobian(
            &system.y_bus,
            v_mag,
            v_ang,
            &p_calc,
            &q_calc,
            &p_buses,
            &q_buses,
        );
        let delta = solve_linear_system(&jacobian, &mismatch)?;

        for (k, &i) in p_buses.iter().enumerate() {
            v_ang[i] += delta[k];
        }
        for (k, &i) in q_buses.iter().enumerate() {
            v_mag[i] += delta[n_p + k];
        }
    }

    let (p_calc, q_calc) = compute_power(&system.y_bus, v_mag, v_ang);
    let (_, max_mismatch) = mismatch_of(&p_calc, &q_calc);
    Ok(NrOutcome {
        converged: max_mismatch < options.tolerance,
        iterations: options.max_iterations,
        max_mismatch,
    })
}

/// P and Q injections from the current voltage state.
fn compute_power(y_bus: &[Vec<Complex64>], v_mag: &[f64], v_ang: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = v_mag.len();
    let mut p = vec![0.0; n];
    let mut q = vec![0.0; n];

    for i in 0..n {
        for j in 0..n {
            let y = y_bus[i][j];
            if y.re == 0.0 && y.im == 0.0 {
                continue;
            }
            let (sin_t, cos_t) = (v_ang[i] - v_ang[j]).sin_cos();
            // P_i = Σ V_i V_j (G_ij cos θ_ij + B_ij sin θ_ij)
            p[i] += v_mag[i] * v_mag[j] * (y.re * cos_t + y.im * sin_t);
            // Q_i = Σ V_i V_j (G_ij sin θ_ij - B_ij cos θ_ij)
            q[i] += v_mag[i] * v_mag[j] * (y.re * sin_t - y.im * cos_t);
        }
    }

    (p, q)
}

fn build_jacobian(
    y_bus: &[Vec<Complex64>],
    v_mag: &[f64],
    v_ang: &[f64],
    p_calc: &[f64],
    q_calc: &[f64],
    p_buses: &[usize],
    q_buses: &[usize],
) -> Vec<Vec<f64>> {
    let n_p = p_buses.len();
    let n_vars = n_p + q_buses.len();
    let mut jacobian = vec![vec![0.0; n_vars]; n_vars];

    // partials of bus i's injections with respect to θ_j and V_j
    let partials = |i: usize, j: usize| -> [f64; 4] {
        let (g, b) = (y_bus[i][j].re, y_bus[i][j].im);
        if i == j {
            let v = v_mag[i];
            [
                -q_calc[i] - b * v * v,
                p_calc[i] / v + g * v,
                p_calc[i] - g * v * v,
                q_calc[i] / v - b * v,
            ]
        } else {
            let (sin_t, cos_t) = (v_ang[i] - v_ang[j]).sin_cos();
            let a = g * cos_t + b * sin_t;
            let c = g * sin_t - b * cos_t;
            [
                v_mag[i] * v_mag[j] * c,
                v_mag[i] * a,
                -v_mag[i] * v_mag[j] * a,
                v_mag[i] * c,
            ]
        }
    };

    for (row, &i) in p_buses.iter().enumerate() {
        for (col, &j) in p_buses.iter().enumerate() {
            jacobian[row][col] = partials(i, j)[0];
        }
        for (col, &j) in q_buses.iter().enumerate() {
            jacobian[row][n_p + col] = partials(i, j)[1];
        }
    }
    for (row, &i) in q_buses.iter().enumerate() {
        for (col, &j) in p_buses.iter().enumerate() {
            jacobian[n_p + row][col] = partials(i, j)[2];
        }
        for (col, &j) in q_buses.iter().enumerate() {
            jacobian[n_p + row][n_p + col] = partials(i, j)[3];
        }
    }

    jacobian
}

/// LU with partial pivoting through faer.
fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>> {
    let n = b.len();
    if n == 0 {
        return Ok(vec![]);
    }

    let mut mat = Mat::zeros(n, n);
    for (i, row) in a.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            mat.write(i, j, value);
        }
    }
    let mut rhs = Mat::zeros(n, 1);
    for (i, &value) in b.iter().enumerate() {
        rhs.write(i, 0, value);
    }

    let solution = mat.partial_piv_lu().solve(&rhs);
    let x: Vec<f64> = (0..n).map(|i| solution.read(i, 0)).collect();

    if x.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("singular Jacobian matrix"));
    }
    Ok(x)
}

fn branch_flow(
    branch: &BranchModel,
    v_mag: &[f64],
    v_ang: &[f64],
    energized: &[bool],
    base_mva: f64,
) -> BranchResult {
    let mut result = BranchResult {
        idtag: branch.idtag.clone(),
        name: branch.name.clone(),
        kind: branch.kind,
        bus_from: branch.bus_from.clone(),
        bus_to: branch.bus_to.clone(),
        pf: 0.0,
        qf: 0.0,
        pt: 0.0,
        qt: 0.0,
        losses: 0.0,
        loading: branch.rate.filter(|r| *r > 0.0).map(|_| 0.0),
    };

    let Some(BranchEnds { from, to }) = branch.ends else {
        return result;
    };
    if !(energized[from] && energized[to]) {
        return result;
    }
    let ys = branch.series_admittance();

    let vf = Complex64::from_polar(v_mag[from], v_ang[from]);
    let vt = Complex64::from_polar(v_mag[to], v_ang[to]);
    let tap = branch.tap_ratio();
    let sh = branch.half_shunt();

    let i_from = (ys / tap.norm_sqr() + sh) * vf - ys / tap.conj() * vt;
    let i_to = -(ys / tap) * vf + (ys + sh) * vt;
    let s_from = vf * i_from.conj() * base_mva;
    let s_to = vt * i_to.conj() * base_mva;

    result.pf = s_from.re;
    result.qf = s_from.im;
    result.pt = s_to.re;
    result.qt = s_to.im;
    result.losses = s_from.re + s_to.re;
    result.loading = branch
        .rate
        .filter(|r| *r > 0.0)
        .map(|rate| s_from.norm().max(s_to.norm()) / rate * 100.0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use electra_core::{
        BusRecord, GeneratorRecord, LineRecord, LoadRecord, ShuntRecord, Transformer2WRecord,
    };

    fn bus(tag: &str, slack: bool) -> BusRecord {
        BusRecord {
            idtag: Some(tag.into()),
            name: Some(tag.to_uppercase()),
            is_slack: Some(slack),
            ..Default::default()
        }
    }

    fn line(tag: &str, from: &str, to: &str) -> LineRecord {
        LineRecord {
            idtag: Some(tag.into()),
            bus_from: Some(from.into()),
            bus_to: Some(to.into()),
            r: Some(0.01),
            x: Some(0.1),
            b: Some(0.02),
            rate: Some(100.0),
            ..Default::default()
        }
    }

    fn load(tag: &str, at: &str, p: f64, q: f64) -> LoadRecord {
        LoadRecord {
            idtag: Some(tag.into()),
            bus: Some(at.into()),
            p: Some(p),
            q: Some(q),
            ..Default::default()
        }
    }

    fn two_bus() -> GridModel {
        let mut model = GridModel::default();
        let data = &mut model.model_data;
        data.bus = vec![bus("b1", true), bus("b2", false)];
        data.line = vec![line("l1", "b1", "b2")];
        data.load = vec![load("ld", "b2", 50.0, 20.0)];
        model
    }

    #[test]
    fn test_two_bus_balances() {
        let results = run_power_flow(&two_bus(), &PowerFlowOptions::default()).unwrap();
        assert!(results.converged);
        assert!(results.error < 1e-6);

        let b2 = results.bus("b2").unwrap();
        assert!(b2.vm < 1.0 && b2.vm > 0.9);
        assert!(b2.va < 0.0);
        assert!((b2.p + 50.0).abs() < 1e-3);

        let l1 = results.branch("l1").unwrap();
        assert!((l1.pt + 50.0).abs() < 1e-3);
        assert!(l1.losses > 0.0);
        assert!((l1.pf + l1.pt - l1.losses).abs() < 1e-9);
        assert!(l1.loading.unwrap() > 50.0);

        // the slack picks up load plus losses
        let b1 = results.bus("b1").unwrap();
        assert!((b1.p - l1.pf).abs() < 1e-3);
    }

    #[test]
    fn test_generator_bus_becomes_reference() {
        let mut model = two_bus();
        model.model_data.bus[0].is_slack = Some(false);
        model.model_data.generator = vec![GeneratorRecord {
            idtag: Some("g1".into()),
            bus: Some("b1".into()),
            p: Some(0.0),
            vset: Some(1.02),
            ..Default::default()
        }];
        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        assert!(results.converged);
        assert!((results.bus("b1").unwrap().vm - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_pv_bus_holds_setpoint() {
        let mut model = two_bus();
        let data = &mut model.model_data;
        data.bus.push(bus("b3", false));
        data.line.push(line("l2", "b2", "b3"));
        data.generator = vec![GeneratorRecord {
            idtag: Some("g3".into()),
            bus: Some("b3".into()),
            p: Some(30.0),
            vset: Some(1.01),
            ..Default::default()
        }];
        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        assert!(results.converged);
        let b3 = results.bus("b3").unwrap();
        assert!((b3.vm - 1.01).abs() < 1e-9);
        assert!((b3.p - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_unreferenced_island_is_dead() {
        let mut model = two_bus();
        model.model_data.line[0].active = Some(false);
        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();

        assert!(results.converged);
        let b2 = results.bus("b2").unwrap();
        assert_eq!(b2.vm, 0.0);
        assert_eq!(b2.island, None);
        assert_eq!(results.bus("b1").unwrap().island, Some(0));
        assert_eq!(results.branch("l1").unwrap().pf, 0.0);
    }

    #[test]
    fn test_inactive_injections_are_ignored() {
        let mut model = two_bus();
        model.model_data.load[0].active = Some(false);
        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        let b2 = results.bus("b2").unwrap();
        assert!(b2.p.abs() < 1e-6);
        // only line charging remains, lifting the far end slightly
        assert!(b2.vm > 1.0);
    }

    #[test]
    fn test_capacitor_supports_voltage() {
        let base = run_power_flow(&two_bus(), &PowerFlowOptions::default()).unwrap();
        let mut model = two_bus();
        model.model_data.shunt = vec![ShuntRecord {
            idtag: Some("c".into()),
            bus: Some("b2".into()),
            b: Some(20.0),
            ..Default::default()
        }];
        let compensated = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        assert!(compensated.bus("b2").unwrap().vm > base.bus("b2").unwrap().vm);
    }

    #[test]
    fn test_transformer_tap() {
        let mut model = two_bus();
        model.model_data.line.clear();
        model.model_data.load.clear();
        model.model_data.transformer2w = vec![Transformer2WRecord {
            idtag: Some("t1".into()),
            bus_from: Some("b1".into()),
            bus_to: Some("b2".into()),
            r: Some(0.0),
            x: Some(0.05),
            tap_module: Some(1.05),
            ..Default::default()
        }];
        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        assert!(results.converged);
        // unloaded secondary sits at V_from / tap
        let b2 = results.bus("b2").unwrap();
        assert!((b2.vm - 1.0 / 1.05).abs() < 1e-6);
        assert_eq!(results.branch("t1").unwrap().kind, ElementKind::Transformer2W);
    }

    #[test]
    fn test_zero_impedance_jumper() {
        let mut model = GridModel::default();
        let data = &mut model.model_data;
        data.bus = vec![bus("b1", true), bus("b2", false), bus("b3", false)];
        data.line = vec![
            line("l1", "b1", "b2"),
            LineRecord {
                idtag: Some("j".into()),
                bus_from: Some("b2".into()),
                bus_to: Some("b3".into()),
                ..Default::default()
            },
        ];
        data.load = vec![load("ld", "b3", 10.0, 0.0)];

        let results = run_power_flow(&model, &PowerFlowOptions::default()).unwrap();
        assert!(results.converged);
        let b2 = results.bus("b2").unwrap();
        let b3 = results.bus("b3").unwrap();
        assert!((b2.vm - b3.vm).abs() < 1e-3);
        assert!((b3.p + 10.0).abs() < 1e-3);

        let jumper = results.branch("j").unwrap();
        assert!((jumper.pf - 10.0).abs() < 1e-3);
        assert!((jumper.pt + 10.0).abs() < 1e-3);
        assert!(jumper.losses.abs() < 1e-6);
    }

    #[test]
    fn test_empty_model_is_an_error() {
        assert!(run_power_flow(&GridModel::default(), &PowerFlowOptions::default()).is_err());
    }

    #[test]
    fn test_iteration_cap() {
        let options = PowerFlowOptions::default().with_max_iterations(1);
        let results = run_power_flow(&two_bus(), &options).unwrap();
        assert!(!results.converged);
        assert_eq!(results.iterations, 1);
        assert!(results.error > 1e-6);
    }

    #[test]
    fn test_base_override_scales_injections() {
        let options = PowerFlowOptions::default().with_base_mva(1000.0);
        let results = run_power_flow(&two_bus(), &options).unwrap();
        assert!(results.converged);
        let b2 = results.bus("b2").unwrap();
        assert!((b2.p + 50.0).abs() < 1e-3);
        assert!(b2.vm > 0.99);
    }
}
