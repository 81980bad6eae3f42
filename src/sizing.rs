//! Grid-search sizing over `(power_kW, energy_kWh)` candidates, Pareto
//! filtering, and strategy-based variant selection.

use crate::degradation::DegradationStatus;
use crate::dispatch::{self, DispatchRequest, DispatchResult};
use crate::economics::{economics, EconomicParams, EconomicsResult, IrrOutcome, YearOneEnergetics};
use crate::error::{EngineError, Result};
use crate::types::{BatterySpec, DegradationBudget, Policy, PriceConfig};
use serde::{Deserialize, Serialize};

/// Duration class a variant is grouped under; `Custom` covers any duration
/// outside the default {1h, 2h, 4h} classes used by [`run_sizing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DurationClass {
    Small,
    Medium,
    Large,
    Custom,
}

impl DurationClass {
    fn from_hours(hours: f64) -> Self {
        if (hours - 1.0).abs() < 1e-9 {
            DurationClass::Small
        } else if (hours - 2.0).abs() < 1e-9 {
            DurationClass::Medium
        } else if (hours - 4.0).abs() < 1e-9 {
            DurationClass::Large
        } else {
            DurationClass::Custom
        }
    }
}

/// Argmax strategy used to pick the recommended Pareto point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizingStrategy {
    NpvMax,
    CyclesMax,
    Balanced { min_cycles: f64, max_cycles: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingRequest {
    pub pv_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    pub interval_minutes: u32,
    pub policy_kind: PolicyKind,
    pub prices: PriceConfig,
    pub econ: EconomicParams,
    pub durations_h: Vec<f64>,
    pub min_power_kw: Option<f64>,
    pub max_power_kw: Option<f64>,
    pub power_steps: u32,
    pub degradation_budget: Option<DegradationBudget>,
    pub round_trip_efficiency: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub strategy: SizingStrategy,
}

/// Which dispatch policy family to search, without a committed power/energy
/// pair yet — [`run_sizing`] instantiates a concrete [`Policy`] per
/// candidate from this plus the searched power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PolicyKind {
    PvSurplus,
    PeakShaving { peak_limit_kw: f64 },
    Stacked { peak_limit_kw: f64, reserve_fraction: f64 },
    LoadOnly { peak_limit_kw: f64 },
}

impl PolicyKind {
    fn instantiate(&self) -> Policy {
        match *self {
            PolicyKind::PvSurplus => Policy::PvSurplus,
            PolicyKind::PeakShaving { peak_limit_kw } => Policy::PeakShaving { peak_limit_kw },
            PolicyKind::Stacked {
                peak_limit_kw,
                reserve_fraction,
            } => Policy::Stacked {
                peak_limit_kw,
                reserve_fraction,
            },
            PolicyKind::LoadOnly { peak_limit_kw } => Policy::LoadOnly { peak_limit_kw },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingVariantResult {
    pub duration_class: DurationClass,
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub capex: f64,
    pub annual_opex: f64,
    pub annual_savings: f64,
    pub npv: f64,
    pub simple_payback_years: f64,
    pub irr: IrrOutcome,
    pub dispatch: DispatchResult,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub npv: f64,
    pub annual_cycles: f64,
    pub annual_discharge_mwh: f64,
    pub payback_years: f64,
    pub dominated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    pub variants: Vec<SizingVariantResult>,
    pub recommended_index: Option<usize>,
    pub pareto_frontier: Vec<ParetoPoint>,
    pub warnings: Vec<String>,
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Derives a `[min, max]` power search range from PV/load statistics when
/// the caller didn't supply one, following the original sizing runner's
/// percentile-based heuristics (see `SPEC_FULL.md` §4.4.2).
fn default_power_range(
    pv_kw: &[f64],
    load_kw: &[f64],
    policy: PolicyKind,
    dt_hours: f64,
) -> (f64, f64) {
    let pv_peak = pv_kw.iter().cloned().fold(0.0_f64, f64::max);
    let floor = 0.05 * pv_peak.max(1.0);

    let candidate = match policy {
        PolicyKind::PvSurplus => {
            let mut daily_surplus = Vec::new();
            let steps_per_day = (24.0 / dt_hours).round() as usize;
            for day in pv_kw.chunks(steps_per_day.max(1)).zip(load_kw.chunks(steps_per_day.max(1))) {
                let (pv_day, load_day) = day;
                let surplus: f64 = pv_day
                    .iter()
                    .zip(load_day.iter())
                    .map(|(p, l)| (p - l).max(0.0) * dt_hours)
                    .sum();
                if surplus > 0.0 {
                    daily_surplus.push(surplus);
                }
            }
            daily_surplus.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let p75_daily = percentile(&daily_surplus, 75.0);

            let mut instant_surplus: Vec<f64> = pv_kw
                .iter()
                .zip(load_kw.iter())
                .map(|(p, l)| (p - l).max(0.0))
                .filter(|v| *v > 0.0)
                .collect();
            instant_surplus.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let p90_instant = percentile(&instant_surplus, 90.0);

            (p75_daily / 4.0).max(0.8 * p90_instant)
        }
        PolicyKind::PeakShaving { peak_limit_kw }
        | PolicyKind::LoadOnly { peak_limit_kw } => {
            let mut excess: Vec<f64> = load_kw
                .iter()
                .zip(pv_kw.iter().chain(std::iter::repeat(&0.0)))
                .map(|(l, p)| (l - p - peak_limit_kw).max(0.0))
                .filter(|v| *v > 0.0)
                .collect();
            excess.sort_by(|a, b| a.partial_cmp(b).unwrap());
            percentile(&excess, 95.0)
        }
        PolicyKind::Stacked { peak_limit_kw, .. } => {
            let mut excess: Vec<f64> = load_kw
                .iter()
                .zip(pv_kw.iter())
                .map(|(l, p)| (l - p - peak_limit_kw).max(0.0))
                .filter(|v| *v > 0.0)
                .collect();
            excess.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let p95_excess = percentile(&excess, 95.0);

            let mut instant_surplus: Vec<f64> = pv_kw
                .iter()
                .zip(load_kw.iter())
                .map(|(p, l)| (p - l).max(0.0))
                .filter(|v| *v > 0.0)
                .collect();
            instant_surplus.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let p90_instant = percentile(&instant_surplus, 90.0);

            p95_excess.max(0.8 * p90_instant)
        }
    }
    .max(floor);

    (0.2 * candidate, (2.0 * candidate).max(floor))
}

fn resolve_range(
    req: &SizingRequest,
) -> (f64, f64) {
    let dt_hours = req.interval_minutes as f64 / 60.0;
    let (derived_min, derived_max) =
        default_power_range(&req.pv_kw, &req.load_kw, req.policy_kind, dt_hours);
    let caller_min = req.min_power_kw.unwrap_or(derived_min);
    let caller_max = req.max_power_kw.unwrap_or(derived_max);
    if caller_min < caller_max {
        (caller_min, caller_max)
    } else {
        let pv_peak = req.pv_kw.iter().cloned().fold(0.0_f64, f64::max);
        (caller_min, (10.0 * caller_min).max(caller_max).max(0.5 * pv_peak))
    }
}

fn evaluate_candidate(
    req: &SizingRequest,
    power_kw: f64,
    energy_kwh: f64,
) -> Result<(DispatchResult, EconomicsResult, f64)> {
    let battery = BatterySpec::new(
        power_kw,
        energy_kwh,
        req.soc_min,
        req.soc_max,
        req.soc_min + 0.5 * (req.soc_max - req.soc_min),
        req.round_trip_efficiency,
    )?;
    let policy = req.policy_kind.instantiate();
    let dispatch_req = DispatchRequest {
        pv_kw: req.pv_kw.clone(),
        load_kw: req.load_kw.clone(),
        interval_minutes: req.interval_minutes,
        battery,
        policy,
        prices: req.prices,
        degradation_budget: req.degradation_budget,
        return_hourly: false,
    };
    let result = dispatch::dispatch(&dispatch_req)?;

    let capex = req.econ.capex_per_kwh_battery * energy_kwh + req.econ.capex_per_kw_battery * power_kw;
    let energetics = YearOneEnergetics {
        pv_capacity_kwp: req.pv_kw.iter().cloned().fold(0.0, f64::max),
        self_consumed_kwh: result.totals.direct_pv_kwh,
        exported_kwh: result.totals.grid_export_kwh,
        battery_discharged_kwh: result.totals.discharge_kwh,
        battery_energy_kwh: energy_kwh,
        battery_power_kw: power_kw,
        import_price: req.prices.import_price,
        feed_in_price: req.prices.export_price,
    };
    let econ_result = economics(&energetics, &req.econ)?;

    let mut ranking_npv = econ_result.npv;
    if result.degradation.status == DegradationStatus::Exceeded {
        ranking_npv -= 0.3 * capex;
    }
    Ok((result, econ_result, ranking_npv))
}

/// Runs the full grid search, Pareto filter, and strategy-based selection.
pub fn run_sizing(req: &SizingRequest) -> Result<SizingResult> {
    if req.durations_h.is_empty() {
        return Err(EngineError::invalid("durations_h must be non-empty"));
    }
    if req.power_steps < 2 {
        return Err(EngineError::invalid("power_steps must be >= 2"));
    }

    let (range_min, range_max) = resolve_range(req);
    let mut warnings = Vec::new();
    if range_min >= range_max {
        warnings.push("no feasible power search range; returning empty result".to_string());
        return Ok(SizingResult {
            variants: Vec::new(),
            recommended_index: None,
            pareto_frontier: Vec::new(),
            warnings,
        });
    }

    let mut variants = Vec::new();
    let mut pareto_candidates: Vec<ParetoPoint> = Vec::new();

    for &duration_h in &req.durations_h {
        let step = (range_max - range_min) / (req.power_steps as f64 - 1.0);
        let mut best: Option<(f64, f64, DispatchResult, EconomicsResult, f64)> = None;

        for i in 0..req.power_steps {
            let power_kw = range_min + step * i as f64;
            let energy_kwh = power_kw * duration_h;
            let (result, econ_result, ranking_npv) = match evaluate_candidate(req, power_kw, energy_kwh) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let better = match &best {
                None => true,
                Some((_, _, _, _, best_ranking)) => ranking_npv > *best_ranking,
            };
            if better {
                best = Some((power_kw, energy_kwh, result, econ_result, ranking_npv));
            }
        }

        let Some((power_kw, energy_kwh, result, econ_result, _)) = best else {
            continue;
        };

        let capex = req.econ.capex_per_kwh_battery * energy_kwh + req.econ.capex_per_kw_battery * power_kw;

        let mut score = if capex > 0.0 {
            (econ_result.npv / capex + 0.5) * 50.0
        } else {
            0.0
        }
        .clamp(0.0, 100.0);
        score *= match result.degradation.status {
            DegradationStatus::Exceeded => {
                warnings.push(format!(
                    "{:?}-duration variant exceeds its degradation budget",
                    DurationClass::from_hours(duration_h)
                ));
                0.5
            }
            DegradationStatus::Warning => 0.8,
            DegradationStatus::Ok => 1.0,
        };

        let annual_cycles = result.degradation.equivalent_full_cycles;
        pareto_candidates.push(ParetoPoint {
            power_kw,
            energy_kwh,
            npv: econ_result.npv,
            annual_cycles,
            annual_discharge_mwh: result.totals.discharge_kwh / 1000.0,
            payback_years: econ_result.simple_payback_years,
            dominated: false,
        });

        variants.push(SizingVariantResult {
            duration_class: DurationClass::from_hours(duration_h),
            power_kw,
            energy_kwh,
            capex,
            annual_opex: capex * req.econ.battery_opex_pct_per_year,
            annual_savings: result.energy_cost.annual_savings,
            npv: econ_result.npv,
            simple_payback_years: econ_result.simple_payback_years,
            irr: econ_result.irr,
            dispatch: result,
            score,
        });
    }

    mark_pareto_dominance(&mut pareto_candidates);

    let recommended_index = variants
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap()
                .then_with(|| b.power_kw.partial_cmp(&a.power_kw).unwrap())
                .then_with(|| ib.cmp(ia))
        })
        .map(|(i, _)| i);

    Ok(SizingResult {
        variants,
        recommended_index,
        pareto_frontier: pareto_candidates,
        warnings,
    })
}

/// `p1` is dominated iff some other point is at-least-as-good on both axes
/// and strictly better on at least one.
fn mark_pareto_dominance(points: &mut [ParetoPoint]) {
    let snapshot: Vec<ParetoPoint> = points.to_vec();
    for (i, p1) in points.iter_mut().enumerate() {
        p1.dominated = snapshot.iter().enumerate().any(|(j, p2)| {
            j != i
                && p2.npv >= p1.npv
                && p2.annual_cycles >= p1.annual_cycles
                && (p2.npv > p1.npv || p2.annual_cycles > p1.annual_cycles)
        });
    }
}

/// Picks among the non-dominated points of `frontier` using `strategy`.
pub fn select_strategy(frontier: &[ParetoPoint], strategy: SizingStrategy) -> Option<usize> {
    let candidates: Vec<(usize, &ParetoPoint)> = frontier
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.dominated)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    match strategy {
        SizingStrategy::NpvMax => candidates
            .iter()
            .max_by(|(_, a), (_, b)| a.npv.partial_cmp(&b.npv).unwrap())
            .map(|(i, _)| *i),
        SizingStrategy::CyclesMax => candidates
            .iter()
            .max_by(|(_, a), (_, b)| a.annual_cycles.partial_cmp(&b.annual_cycles).unwrap())
            .map(|(i, _)| *i),
        SizingStrategy::Balanced {
            min_cycles,
            max_cycles,
        } => {
            let feasible: Vec<_> = candidates
                .iter()
                .filter(|(_, p)| p.annual_cycles >= min_cycles && p.annual_cycles <= max_cycles)
                .collect();
            if feasible.is_empty() {
                let mid = (min_cycles + max_cycles) / 2.0;
                candidates
                    .iter()
                    .min_by(|(_, a), (_, b)| {
                        (a.annual_cycles - mid)
                            .abs()
                            .partial_cmp(&(b.annual_cycles - mid).abs())
                            .unwrap()
                    })
                    .map(|(i, _)| *i)
            } else {
                feasible
                    .iter()
                    .max_by(|(_, a), (_, b)| a.npv.partial_cmp(&b.npv).unwrap())
                    .map(|(i, _)| i.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pareto_dominance_flags_strictly_worse_points() {
        let mut points = vec![
            ParetoPoint {
                power_kw: 10.0,
                energy_kwh: 20.0,
                npv: 100.0,
                annual_cycles: 200.0,
                annual_discharge_mwh: 10.0,
                payback_years: 5.0,
                dominated: false,
            },
            ParetoPoint {
                power_kw: 5.0,
                energy_kwh: 10.0,
                npv: 50.0,
                annual_cycles: 100.0,
                annual_discharge_mwh: 5.0,
                payback_years: 7.0,
                dominated: false,
            },
        ];
        mark_pareto_dominance(&mut points);
        assert!(!points[0].dominated);
        assert!(points[1].dominated);
    }

    #[test]
    fn pareto_dominance_is_idempotent() {
        let mut points = vec![
            ParetoPoint {
                power_kw: 10.0,
                energy_kwh: 20.0,
                npv: 100.0,
                annual_cycles: 50.0,
                annual_discharge_mwh: 10.0,
                payback_years: 5.0,
                dominated: false,
            },
            ParetoPoint {
                power_kw: 5.0,
                energy_kwh: 10.0,
                npv: 50.0,
                annual_cycles: 200.0,
                annual_discharge_mwh: 5.0,
                payback_years: 7.0,
                dominated: false,
            },
        ];
        mark_pareto_dominance(&mut points);
        let first_pass = points.clone();
        mark_pareto_dominance(&mut points);
        assert_eq!(
            first_pass.iter().map(|p| p.dominated).collect::<Vec<_>>(),
            points.iter().map(|p| p.dominated).collect::<Vec<_>>()
        );
    }

    #[test]
    fn balanced_strategy_falls_back_to_closest_when_no_point_is_feasible() {
        let frontier = vec![
            ParetoPoint {
                power_kw: 10.0,
                energy_kwh: 20.0,
                npv: 100.0,
                annual_cycles: 500.0,
                annual_discharge_mwh: 10.0,
                payback_years: 5.0,
                dominated: false,
            },
            ParetoPoint {
                power_kw: 5.0,
                energy_kwh: 10.0,
                npv: 50.0,
                annual_cycles: 600.0,
                annual_discharge_mwh: 5.0,
                payback_years: 7.0,
                dominated: false,
            },
        ];
        let chosen = select_strategy(
            &frontier,
            SizingStrategy::Balanced {
                min_cycles: 100.0,
                max_cycles: 200.0,
            },
        );
        assert!(chosen.is_some());
    }
}
