//! The hour-by-hour (or quarter-hour-by-quarter-hour) dispatch engine.
//!
//! `dispatch()` is the sole entry point: it validates a [`DispatchRequest`],
//! runs the sequential SOC-coupled step loop via [`policies::step`], and
//! aggregates the per-step flows into a [`DispatchResult`]. The step loop
//! itself carries no engine state beyond the battery's stored energy,
//! mirroring the reference VPP simulator's `Engine::step`/`Engine::run`
//! split between single-step transition and multi-step orchestration.

pub mod policies;

use crate::degradation::{self, DegradationMetrics, ServiceSplit};
use crate::error::{EngineError, Result};
use crate::types::{BatterySpec, DegradationBudget, Interval, Policy, PriceConfig};
use policies::StepFlows;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub pv_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    pub interval_minutes: u32,
    pub battery: BatterySpec,
    pub policy: Policy,
    pub prices: PriceConfig,
    pub degradation_budget: Option<DegradationBudget>,
    #[serde(default)]
    pub return_hourly: bool,
}

/// One row of the per-step series, returned only when `return_hourly` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub t: usize,
    pub pv_kw: f64,
    pub load_kw: f64,
    pub soc_kwh: f64,
    pub flows: StepFlowsDto,
}

/// Serializable mirror of [`policies::StepFlows`] (kept separate so the
/// internal policy module stays free of a serde dependency on its own).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepFlowsDto {
    pub direct_pv_kw: f64,
    pub charge_kw: f64,
    pub discharge_total_kw: f64,
    pub discharge_peak_kw: f64,
    pub discharge_pv_kw: f64,
    pub charge_from_pv_kw: f64,
    pub charge_from_grid_kw: f64,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub curtailment_kw: f64,
}

impl From<StepFlows> for StepFlowsDto {
    fn from(f: StepFlows) -> Self {
        StepFlowsDto {
            direct_pv_kw: f.direct_pv,
            charge_kw: f.charge,
            discharge_total_kw: f.discharge_total,
            discharge_peak_kw: f.discharge_peak,
            discharge_pv_kw: f.discharge_pv,
            charge_from_pv_kw: f.charge_from_pv,
            charge_from_grid_kw: f.charge_from_grid,
            grid_import_kw: f.grid_import,
            grid_export_kw: f.grid_export,
            curtailment_kw: f.curtailment,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnergyTotals {
    pub direct_pv_kwh: f64,
    pub charge_kwh: f64,
    pub discharge_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub curtailment_kwh: f64,
    pub total_pv_kwh: f64,
    pub total_load_kwh: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnergyCost {
    pub baseline_cost: f64,
    pub project_cost: f64,
    pub annual_savings: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuditInfo {
    pub engine_version: &'static str,
    pub interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub totals: EnergyTotals,
    pub self_consumption_pct: f64,
    pub grid_independence_pct: f64,
    pub original_peak_kw: Option<f64>,
    pub new_peak_kw: Option<f64>,
    pub energy_cost: EnergyCost,
    pub degradation: DegradationMetrics,
    pub hourly: Option<Vec<StepRecord>>,
    pub audit: AuditInfo,
}

impl fmt::Display for DispatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "dispatch: self-consumption {:.1}%, grid independence {:.1}%",
            self.self_consumption_pct, self.grid_independence_pct
        )?;
        if let (Some(before), Some(after)) = (self.original_peak_kw, self.new_peak_kw) {
            writeln!(f, "  peak: {before:.1} kW -> {after:.1} kW")?;
        }
        writeln!(f, "  annual savings: {:.2}", self.energy_cost.annual_savings)?;
        write!(f, "  {}", self.degradation)
    }
}

fn validate(req: &DispatchRequest) -> Result<Interval> {
    let n = req.load_kw.len();
    if n == 0 {
        return Err(EngineError::invalid("load series must be non-empty"));
    }
    if !req.pv_kw.is_empty() && req.pv_kw.len() != n {
        return Err(EngineError::invalid(
            "pv and load series must have equal length",
        ));
    }
    if req.load_kw.iter().any(|v| *v < 0.0) || req.pv_kw.iter().any(|v| *v < 0.0) {
        return Err(EngineError::invalid("pv and load must be non-negative"));
    }
    req.policy.validate(&req.battery)?;
    Interval::from_minutes(req.interval_minutes)
}

/// Runs the dispatch engine for the requested policy and returns the
/// aggregated result. See [`DispatchRequest`] for the full input shape.
pub fn dispatch(req: &DispatchRequest) -> Result<DispatchResult> {
    let interval = validate(req)?;
    let dt = interval.hours();
    let n = req.load_kw.len();
    let zero_pv = vec![0.0; n];
    let pv = if req.pv_kw.is_empty() { &zero_pv } else { &req.pv_kw };

    let mut stored_kwh = req.battery.initial_energy_kwh();
    let mut totals = EnergyTotals::default();
    let mut peak_kw_before = 0.0_f64;
    let mut peak_kw_after = 0.0_f64;
    let peak_tracking = !matches!(req.policy, Policy::PvSurplus);
    let mut service = ServiceSplit::default();
    let mut hourly = req.return_hourly.then(|| Vec::with_capacity(n));

    for t in 0..n {
        let pv_kw = pv[t];
        let load_kw = req.load_kw[t];
        let (flows, next_stored) =
            policies::step(&req.policy, &req.battery, pv_kw, load_kw, stored_kwh, dt);

        totals.direct_pv_kwh += flows.direct_pv * dt;
        totals.charge_kwh += flows.charge * dt;
        totals.discharge_kwh += flows.discharge_total * dt;
        totals.grid_import_kwh += flows.grid_import * dt;
        totals.grid_export_kwh += flows.grid_export * dt;
        totals.curtailment_kwh += flows.curtailment * dt;
        totals.total_pv_kwh += pv_kw * dt;
        totals.total_load_kwh += load_kw * dt;
        service.peak_shaving_mwh += flows.discharge_peak * dt / 1000.0;
        service.pv_shifting_mwh += flows.discharge_pv * dt / 1000.0;

        if peak_tracking {
            peak_kw_before = peak_kw_before.max(load_kw - pv_kw);
            peak_kw_after = peak_kw_after.max(flows.grid_import);
        }

        if let Some(rows) = hourly.as_mut() {
            rows.push(StepRecord {
                t,
                pv_kw,
                load_kw,
                soc_kwh: next_stored,
                flows: flows.into(),
            });
        }

        stored_kwh = next_stored;
    }

    let self_consumption = totals.direct_pv_kwh + totals.discharge_kwh;
    let self_consumption_pct = if totals.total_pv_kwh > 0.0 {
        self_consumption / totals.total_pv_kwh * 100.0
    } else {
        0.0
    };
    let grid_independence_pct = if totals.total_load_kwh > 0.0 {
        (totals.total_load_kwh - totals.grid_import_kwh) / totals.total_load_kwh * 100.0
    } else {
        0.0
    };

    let baseline_cost = req.load_kw.iter().zip(pv.iter()).fold(0.0, |acc, (l, p)| {
        acc + (l - p).max(0.0) * dt
    }) * req.prices.import_price;
    let demand_component = if peak_tracking {
        (peak_kw_before - peak_kw_after).max(0.0) * req.prices.demand_charge_per_kw_year
    } else {
        0.0
    };
    let energy_component = totals.grid_import_kwh * req.prices.import_price;
    let project_cost = energy_component;
    let annual_savings = (baseline_cost - project_cost) + demand_component;

    let degradation = degradation::assess(
        totals.charge_kwh,
        totals.discharge_kwh,
        req.battery.usable_capacity_kwh(),
        service,
        req.degradation_budget,
    );

    Ok(DispatchResult {
        totals,
        self_consumption_pct,
        grid_independence_pct,
        original_peak_kw: peak_tracking.then_some(peak_kw_before),
        new_peak_kw: peak_tracking.then_some(peak_kw_after),
        energy_cost: EnergyCost {
            baseline_cost,
            project_cost,
            annual_savings,
        },
        degradation,
        hourly,
        audit: AuditInfo {
            engine_version: ENGINE_VERSION,
            interval_minutes: req.interval_minutes,
        },
    })
}
