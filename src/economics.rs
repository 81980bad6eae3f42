//! Life-cycle cash-flow modeling: NPV, IRR, LCOE, and simple payback.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Whether prices/OPEX are inflated year-over-year (`Nominal`) or held at
/// present-day values with only the discount rate doing the work (`Real`).
/// Exactly one mode is active per [`economics`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashFlowMode {
    Real,
    Nominal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EconomicParams {
    pub capex_per_kwp: f64,
    pub capex_per_kwh_battery: f64,
    pub capex_per_kw_battery: f64,
    pub opex_pct_per_year: f64,
    pub battery_opex_pct_per_year: f64,
    pub discount_rate: f64,
    pub inflation_rate: f64,
    pub analysis_years: u32,
    pub pv_degradation_rate: f64,
    pub battery_degradation_rate: f64,
    pub battery_lifetime_years: u32,
    pub battery_replacement_cost_factor: f64,
    pub mode: CashFlowMode,
    pub export_enabled: bool,
}

/// Per-year energetics a plant (with or without a battery) delivers; these
/// feed the cash-flow loop without any knowledge of how they were produced
/// (dispatch simulation, sizing search, or a caller-supplied estimate).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearOneEnergetics {
    pub pv_capacity_kwp: f64,
    pub self_consumed_kwh: f64,
    pub exported_kwh: f64,
    pub battery_discharged_kwh: f64,
    pub battery_energy_kwh: f64,
    pub battery_power_kw: f64,
    pub import_price: f64,
    pub feed_in_price: f64,
}

/// Three-way IRR outcome, per the spec's explicit Rust-realization note:
/// IRR non-convergence is data, never a thrown error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IrrOutcome {
    Converged(f64),
    NoRoot,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowYear {
    pub year: u32,
    pub revenue: f64,
    pub opex: f64,
    pub replacement: f64,
    pub net_cash_flow: f64,
    pub discounted_cash_flow: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsResult {
    pub investment: f64,
    pub annual_savings_year_one: f64,
    pub npv: f64,
    pub irr: IrrOutcome,
    pub lcoe: f64,
    pub simple_payback_years: f64,
    pub cash_flows: Vec<CashFlowYear>,
}

fn investment(energetics: &YearOneEnergetics, p: &EconomicParams) -> f64 {
    let pv_capex = energetics.pv_capacity_kwp * p.capex_per_kwp;
    let battery_capex = energetics.battery_energy_kwh * p.capex_per_kwh_battery
        + energetics.battery_power_kw * p.capex_per_kw_battery;
    pv_capex + battery_capex
}

fn battery_capex(energetics: &YearOneEnergetics, p: &EconomicParams) -> f64 {
    energetics.battery_energy_kwh * p.capex_per_kwh_battery
        + energetics.battery_power_kw * p.capex_per_kw_battery
}

/// Runs the 25-(or however many)-year cash-flow model and solves for NPV,
/// IRR, LCOE, and simple payback.
pub fn economics(energetics: &YearOneEnergetics, p: &EconomicParams) -> Result<EconomicsResult> {
    if p.analysis_years == 0 {
        return Err(EngineError::invalid("analysis_years must be >= 1"));
    }
    if p.discount_rate <= -1.0 {
        return Err(EngineError::invalid("discount_rate must be > -1"));
    }

    let invest = investment(energetics, p);
    let bess_capex = battery_capex(energetics, p);
    let has_battery = energetics.battery_energy_kwh > 0.0;

    let mut cash_flows = Vec::with_capacity(p.analysis_years as usize);
    let mut npv = -invest;
    let mut cumulative_cf = -invest;
    let mut payback: Option<f64> = None;
    let mut total_energy_discounted = 0.0_f64;
    let mut total_real_cost_discounted = invest;
    let mut year_one_revenue = 0.0_f64;

    for year in 1..=p.analysis_years {
        let pv_factor = (1.0 - p.pv_degradation_rate).powi(year as i32);
        let battery_factor = if has_battery && p.battery_lifetime_years > 0 {
            let age_in_cycle = (year - 1) % p.battery_lifetime_years;
            (1.0 - p.battery_degradation_rate).powi(age_in_cycle as i32)
        } else {
            1.0
        };
        let inflation_factor = match p.mode {
            CashFlowMode::Nominal => (1.0 + p.inflation_rate).powi(year as i32),
            CashFlowMode::Real => 1.0,
        };

        let self_consumed = energetics.self_consumed_kwh * pv_factor;
        let battery_discharged = energetics.battery_discharged_kwh * pv_factor * battery_factor;
        let exported = if p.export_enabled {
            energetics.exported_kwh * pv_factor
        } else {
            0.0
        };

        let revenue = (self_consumed + battery_discharged) * energetics.import_price * inflation_factor
            + exported * energetics.feed_in_price * inflation_factor;

        let opex = (energetics.pv_capacity_kwp * p.capex_per_kwp * p.opex_pct_per_year
            + bess_capex * p.battery_opex_pct_per_year)
            * inflation_factor;

        let replacement = if has_battery
            && p.battery_lifetime_years > 0
            && year == p.battery_lifetime_years
            && (p.battery_lifetime_years as u32) < p.analysis_years
        {
            bess_capex * p.battery_replacement_cost_factor * inflation_factor
        } else {
            0.0
        };

        let net_cash_flow = revenue - opex - replacement;
        let discount_factor = (1.0 + p.discount_rate).powi(year as i32);
        let discounted_cash_flow = net_cash_flow / discount_factor;

        npv += discounted_cash_flow;
        cumulative_cf += net_cash_flow;
        if payback.is_none() && cumulative_cf >= 0.0 {
            payback = Some(year as f64);
        }

        let real_opex = opex / if matches!(p.mode, CashFlowMode::Nominal) {
            inflation_factor
        } else {
            1.0
        };
        total_real_cost_discounted += real_opex / discount_factor;
        total_energy_discounted += (self_consumed + battery_discharged + exported) / discount_factor;

        if year == 1 {
            year_one_revenue = net_cash_flow;
        }

        cash_flows.push(CashFlowYear {
            year,
            revenue,
            opex,
            replacement,
            net_cash_flow,
            discounted_cash_flow,
        });
    }

    let lcoe = if total_energy_discounted > 0.0 {
        total_real_cost_discounted / total_energy_discounted
    } else {
        0.0
    };

    let simple_payback_years = if year_one_revenue > 0.0 {
        invest / year_one_revenue
    } else {
        f64::INFINITY
    };

    let irr = solve_irr(&cash_flows, invest);

    Ok(EconomicsResult {
        investment: invest,
        annual_savings_year_one: year_one_revenue,
        npv,
        irr,
        lcoe,
        simple_payback_years,
        cash_flows,
    })
}

/// Net present value of a cash-flow stream at rate `r`, with year 0 equal
/// to `-investment`.
fn npv_at_rate(cash_flows: &[CashFlowYear], investment: f64, r: f64) -> f64 {
    let mut total = -investment;
    for cf in cash_flows {
        total += cf.net_cash_flow / (1.0 + r).powi(cf.year as i32);
    }
    total
}

/// Bracket-and-Newton IRR solver, per the spec's hybrid method: Newton
/// steps from an initial guess, falling back to a bisection rescan over
/// `[-0.99, 10.0]` when no sign change is found or Newton diverges.
fn solve_irr(cash_flows: &[CashFlowYear], investment: f64) -> IrrOutcome {
    let has_negative = investment > 0.0 || cash_flows.iter().any(|c| c.net_cash_flow < 0.0);
    let has_positive = cash_flows.iter().any(|c| c.net_cash_flow > 0.0);
    if !has_negative || !has_positive {
        return IrrOutcome::Invalid;
    }

    const LOW: f64 = -0.99;
    const HIGH: f64 = 10.0;
    const SCAN_POINTS: usize = 100;
    const MAX_ITER: usize = 200;
    const TOL: f64 = 1e-6;

    let mut rate = 0.1_f64;
    for _ in 0..MAX_ITER {
        let f = npv_at_rate(cash_flows, investment, rate);
        if f.abs() < TOL {
            return IrrOutcome::Converged(rate);
        }
        let h = 1e-6;
        let f_prime = (npv_at_rate(cash_flows, investment, rate + h) - f) / h;
        if f_prime.abs() < 1e-12 {
            break;
        }
        let next = rate - f / f_prime;
        if !next.is_finite() || next <= LOW || next >= HIGH {
            break;
        }
        if (next - rate).abs() < TOL {
            return IrrOutcome::Converged(next);
        }
        rate = next;
    }

    // Newton failed to converge; rescan the bracket for a sign change and
    // bisect.
    let step = (HIGH - LOW) / SCAN_POINTS as f64;
    let mut prev_rate = LOW;
    let mut prev_val = npv_at_rate(cash_flows, investment, prev_rate);
    for i in 1..=SCAN_POINTS {
        let r = LOW + step * i as f64;
        let v = npv_at_rate(cash_flows, investment, r);
        if prev_val == 0.0 {
            return IrrOutcome::Converged(prev_rate);
        }
        if prev_val.signum() != v.signum() {
            let mut lo = prev_rate;
            let mut hi = r;
            let mut lo_val = prev_val;
            for _ in 0..MAX_ITER {
                let mid = (lo + hi) / 2.0;
                let mid_val = npv_at_rate(cash_flows, investment, mid);
                if mid_val.abs() < TOL || (hi - lo).abs() < TOL {
                    return IrrOutcome::Converged(mid);
                }
                if mid_val.signum() == lo_val.signum() {
                    lo = mid;
                    lo_val = mid_val;
                } else {
                    hi = mid;
                }
            }
            return IrrOutcome::Converged((lo + hi) / 2.0);
        }
        prev_rate = r;
        prev_val = v;
    }
    IrrOutcome::NoRoot
}
