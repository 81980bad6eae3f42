//! Monte Carlo risk propagation over the cash-flow model.
//!
//! Draws `iterations` correlated samples of six standard uncertain inputs
//! (electricity price, production factor, degradation rate, investment
//! cost, inflation rate, discount rate), re-runs [`economics::economics`]
//! against each, and aggregates the resulting NPV/IRR/payback distributions
//! into risk metrics, plain-language insights, and named scenario snapshots.

pub mod distributions;

use crate::economics::{self, CashFlowMode, EconomicParams, EconomicsResult, IrrOutcome, YearOneEnergetics};
use crate::error::{EngineError, Result};
use distributions::{correlation_cholesky, sample_correlated, CorrelationPair, ParameterDistribution};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Fixed order the six standard Monte Carlo parameters must be supplied in;
/// sample draws are mapped back onto [`YearOneEnergetics`]/[`EconomicParams`]
/// fields positionally against this order.
pub const PARAMETER_ORDER: [&str; 6] = [
    "electricity_price",
    "production_factor",
    "degradation_rate",
    "investment_cost",
    "inflation_rate",
    "discount_rate",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloRequest {
    pub base_energetics: YearOneEnergetics,
    pub base_params: EconomicParams,
    /// Base values the sampled parameters are scaled relative to; `base_params`
    /// and `base_energetics` are not required to restate these exactly (e.g. a
    /// caller may run a dispatch-derived energetics bundle against a distinct
    /// reference investment figure used only to compute the relative CAPEX
    /// scaling factor).
    pub base_values: distributions::PresetBaseValues,
    /// Must list exactly the six [`PARAMETER_ORDER`] names, in that order.
    pub distributions: Vec<ParameterDistribution>,
    pub correlations: Vec<CorrelationPair>,
    pub iterations: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub npv: f64,
    pub irr: IrrOutcome,
    pub payback: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterCorrelation {
    pub parameter: String,
    pub pearson_r: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub iterations: u32,
    pub npv_mean: f64,
    pub npv_std_dev: f64,
    pub npv_median: f64,
    pub npv_p10: f64,
    pub npv_p90: f64,
    pub probability_positive_npv: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub coefficient_of_variation: f64,
    pub semi_deviation: f64,
    pub sharpe_like_ratio: f64,
    pub irr_valid_pct: f64,
    pub irr_median: Option<f64>,
    pub irr_p10: Option<f64>,
    pub irr_p90: Option<f64>,
    pub payback_median: f64,
    pub payback_p90: f64,
    pub breakeven_price: Option<f64>,
    pub parameter_npv_correlation: Vec<ParameterCorrelation>,
    pub insights: Vec<String>,
    pub scenario_base: ScenarioSnapshot,
    pub scenario_pessimistic: ScenarioSnapshot,
    pub scenario_optimistic: ScenarioSnapshot,
}

fn validate(req: &MonteCarloRequest) -> Result<()> {
    if req.iterations < 100 || req.iterations > 100_000 {
        return Err(EngineError::invalid("iterations must be in [100, 100000]"));
    }
    if req.distributions.len() != PARAMETER_ORDER.len() {
        return Err(EngineError::invalid(format!(
            "expected {} parameter distributions, got {}",
            PARAMETER_ORDER.len(),
            req.distributions.len()
        )));
    }
    for (d, expected) in req.distributions.iter().zip(PARAMETER_ORDER.iter()) {
        if d.name != *expected {
            return Err(EngineError::invalid(format!(
                "parameter distributions must be ordered {:?}, found {:?} at the {} position",
                PARAMETER_ORDER, d.name, expected
            )));
        }
    }
    for pair in &req.correlations {
        if pair.i >= req.distributions.len() || pair.j >= req.distributions.len() {
            return Err(EngineError::invalid("correlation pair index out of range"));
        }
        if !(-1.0..=1.0).contains(&pair.correlation) {
            return Err(EngineError::invalid("correlation must be in [-1, 1]"));
        }
    }
    Ok(())
}

/// Maps one correlated draw `[electricity_price, production_factor,
/// degradation_rate, investment_cost, inflation_rate, discount_rate]` onto a
/// scaled energetics/params pair. Electricity price and production factor
/// scale revenue-side quantities relative to the caller's base values;
/// investment cost scales every CAPEX rate uniformly; degradation, inflation,
/// and discount rate override their matching `EconomicParams` fields
/// directly.
pub(crate) fn apply_sample(
    base_energetics: &YearOneEnergetics,
    base_params: &EconomicParams,
    base_values: &distributions::PresetBaseValues,
    draw: &[f64],
) -> (YearOneEnergetics, EconomicParams) {
    let price_factor = if base_values.electricity_price > 0.0 {
        draw[0] / base_values.electricity_price
    } else {
        1.0
    };
    let production_factor = if base_values.production_factor > 0.0 {
        draw[1] / base_values.production_factor
    } else {
        1.0
    };
    let capex_factor = if base_values.investment_cost > 0.0 {
        draw[3] / base_values.investment_cost
    } else {
        1.0
    };

    let energetics = YearOneEnergetics {
        pv_capacity_kwp: base_energetics.pv_capacity_kwp,
        self_consumed_kwh: base_energetics.self_consumed_kwh * production_factor,
        exported_kwh: base_energetics.exported_kwh * production_factor,
        battery_discharged_kwh: base_energetics.battery_discharged_kwh * production_factor,
        battery_energy_kwh: base_energetics.battery_energy_kwh,
        battery_power_kw: base_energetics.battery_power_kw,
        import_price: base_energetics.import_price * price_factor,
        feed_in_price: base_energetics.feed_in_price * price_factor,
    };

    let params = EconomicParams {
        capex_per_kwp: base_params.capex_per_kwp * capex_factor,
        capex_per_kwh_battery: base_params.capex_per_kwh_battery * capex_factor,
        capex_per_kw_battery: base_params.capex_per_kw_battery * capex_factor,
        pv_degradation_rate: draw[2],
        inflation_rate: draw[4],
        discount_rate: draw[5],
        ..*base_params
    };

    (energetics, params)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], m: f64) -> f64 {
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolation percentile of a value already known to be sorted
/// ascending, `p` in `[0, 1]`.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..x.len() {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 0.0 || vy <= 0.0 {
        0.0
    } else {
        cov / (vx.sqrt() * vy.sqrt())
    }
}

/// Ordinary least squares slope/intercept of `y` on `x`.
fn linear_regression(x: &[f64], y: &[f64]) -> (f64, f64) {
    let mx = mean(x);
    let my = mean(y);
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..x.len() {
        num += (x[i] - mx) * (y[i] - my);
        den += (x[i] - mx).powi(2);
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };
    let intercept = my - slope * mx;
    (slope, intercept)
}

/// Runs the Monte Carlo simulation and aggregates risk metrics, insights,
/// and scenario snapshots.
pub fn monte_carlo(req: &MonteCarloRequest) -> Result<MonteCarloResult> {
    validate(req)?;

    let n = req.iterations as usize;
    let cholesky = correlation_cholesky(req.distributions.len(), &req.correlations);

    let mut npvs = Vec::with_capacity(n);
    let mut irrs: Vec<f64> = Vec::new();
    let mut paybacks = Vec::with_capacity(n);
    let mut param_samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n); req.distributions.len()];

    for i in 0..n {
        let mut rng = StdRng::seed_from_u64(req.seed.wrapping_add(i as u64));
        let draw = sample_correlated(&req.distributions, &cholesky, &mut rng);
        let (energetics, params) = apply_sample(&req.base_energetics, &req.base_params, &req.base_values, &draw);
        let result: EconomicsResult = economics::economics(&energetics, &params)?;

        npvs.push(result.npv);
        paybacks.push(result.simple_payback_years);
        if let IrrOutcome::Converged(r) = result.irr {
            irrs.push(r);
        }
        for (k, v) in draw.iter().enumerate() {
            param_samples[k].push(*v);
        }
    }

    let npv_mean = mean(&npvs);
    let npv_std = std_dev(&npvs, npv_mean);

    let mut sorted_npv = npvs.clone();
    sorted_npv.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let npv_median = percentile_sorted(&sorted_npv, 0.5);
    let npv_p10 = percentile_sorted(&sorted_npv, 0.10);
    let npv_p90 = percentile_sorted(&sorted_npv, 0.90);
    let var_95 = percentile_sorted(&sorted_npv, 0.05);
    let var_99 = percentile_sorted(&sorted_npv, 0.01);

    let tail: Vec<f64> = sorted_npv.iter().copied().filter(|v| *v <= var_95).collect();
    let cvar_95 = if tail.is_empty() { var_95 } else { mean(&tail) };

    let probability_positive_npv = npvs.iter().filter(|v| **v > 0.0).count() as f64 / n as f64;
    let coefficient_of_variation = if npv_mean.abs() > 1e-9 { npv_std / npv_mean.abs() } else { 0.0 };

    let negative_deviations: Vec<f64> = npvs
        .iter()
        .map(|v| (v - npv_mean).min(0.0))
        .collect();
    let semi_deviation = (negative_deviations.iter().map(|d| d * d).sum::<f64>() / n as f64).sqrt();
    let sharpe_like_ratio = if npv_std > 1e-9 { npv_mean / npv_std } else { 0.0 };

    let irr_valid_pct = 100.0 * irrs.len() as f64 / n as f64;
    let mut sorted_irr = irrs.clone();
    sorted_irr.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let irr_median = if sorted_irr.is_empty() { None } else { Some(percentile_sorted(&sorted_irr, 0.5)) };
    let irr_p10 = if sorted_irr.is_empty() { None } else { Some(percentile_sorted(&sorted_irr, 0.10)) };
    let irr_p90 = if sorted_irr.is_empty() { None } else { Some(percentile_sorted(&sorted_irr, 0.90)) };

    let mut sorted_payback = paybacks.clone();
    sorted_payback.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let payback_median = percentile_sorted(&sorted_payback, 0.5);
    let payback_p90 = percentile_sorted(&sorted_payback, 0.90);

    let (slope, intercept) = linear_regression(&param_samples[0], &npvs);
    let breakeven_price = if slope.abs() > 1e-9 {
        let price = -intercept / slope;
        if price > 0.0 && price < 2000.0 { Some(price) } else { None }
    } else {
        None
    };

    let parameter_npv_correlation: Vec<ParameterCorrelation> = PARAMETER_ORDER
        .iter()
        .enumerate()
        .map(|(k, name)| ParameterCorrelation {
            parameter: name.to_string(),
            pearson_r: pearson(&param_samples[k], &npvs),
        })
        .collect();

    let scenario_base = ScenarioSnapshot {
        npv: npv_median,
        irr: irr_median.map(IrrOutcome::Converged).unwrap_or(IrrOutcome::NoRoot),
        payback: payback_median,
    };
    let scenario_pessimistic = ScenarioSnapshot {
        npv: npv_p10,
        irr: irr_p10.map(IrrOutcome::Converged).unwrap_or(IrrOutcome::NoRoot),
        payback: payback_p90,
    };
    let scenario_optimistic = ScenarioSnapshot {
        npv: npv_p90,
        irr: irr_p90.map(IrrOutcome::Converged).unwrap_or(IrrOutcome::NoRoot),
        payback: payback_p10_value(&sorted_payback),
    };

    let insights = build_insights(
        probability_positive_npv,
        coefficient_of_variation,
        var_95,
        irr_median,
        irr_p10,
        irr_p90,
        req.base_params.discount_rate,
        payback_median,
        payback_p90,
        &parameter_npv_correlation,
    );

    Ok(MonteCarloResult {
        iterations: req.iterations,
        npv_mean,
        npv_std_dev: npv_std,
        npv_median,
        npv_p10,
        npv_p90,
        probability_positive_npv,
        var_95,
        var_99,
        cvar_95,
        coefficient_of_variation,
        semi_deviation,
        sharpe_like_ratio,
        irr_valid_pct,
        irr_median,
        irr_p10,
        irr_p90,
        payback_median,
        payback_p90,
        breakeven_price,
        parameter_npv_correlation,
        insights,
        scenario_base,
        scenario_pessimistic,
        scenario_optimistic,
    })
}

fn payback_p10_value(sorted_payback: &[f64]) -> f64 {
    percentile_sorted(sorted_payback, 0.10)
}

#[allow(clippy::too_many_arguments)]
fn build_insights(
    probability_positive_npv: f64,
    coefficient_of_variation: f64,
    var_95: f64,
    irr_median: Option<f64>,
    irr_p10: Option<f64>,
    irr_p90: Option<f64>,
    discount_rate: f64,
    payback_median: f64,
    payback_p90: f64,
    correlations: &[ParameterCorrelation],
) -> Vec<String> {
    let mut insights = Vec::new();

    let profit_pct = probability_positive_npv * 100.0;
    insights.push(if probability_positive_npv >= 0.95 {
        format!("High confidence of profitability: {profit_pct:.0}% of simulated outcomes show a positive NPV.")
    } else if probability_positive_npv >= 0.80 {
        format!("Most likely profitable: {profit_pct:.0}% of simulated outcomes show a positive NPV.")
    } else if probability_positive_npv >= 0.50 {
        format!("More likely than not profitable: {profit_pct:.0}% of simulated outcomes show a positive NPV.")
    } else {
        format!("Likely unprofitable: only {profit_pct:.0}% of simulated outcomes show a positive NPV.")
    });

    insights.push(if coefficient_of_variation < 0.3 {
        "NPV dispersion is low relative to its mean; outcomes cluster tightly around the central estimate.".to_string()
    } else if coefficient_of_variation < 0.6 {
        "NPV dispersion is moderate; the central estimate carries meaningful uncertainty.".to_string()
    } else {
        "NPV dispersion is high; the central estimate alone is a poor guide to likely outcomes.".to_string()
    });

    insights.push(if var_95 < 0.0 {
        format!("At the 95% confidence level, downside outcomes include a loss (VaR-95 = {var_95:.0}).")
    } else {
        format!("Even the 5th-percentile outcome remains profitable (VaR-95 = {var_95:.0}).")
    });

    if let (Some(median), Some(p10), Some(p90)) = (irr_median, irr_p10, irr_p90) {
        let mut line = format!(
            "Median IRR is {:.1}%, with a P10-P90 range of {:.1}%-{:.1}%.",
            median * 100.0,
            p10 * 100.0,
            p90 * 100.0
        );
        if p10 >= discount_rate {
            line.push_str(" Even the pessimistic P10 IRR clears the discount rate.");
        }
        insights.push(line);
    } else {
        insights.push("No sampled IRR converged; returns could not be summarized as a rate.".to_string());
    }

    insights.push(format!(
        "Median simple payback is {payback_median:.1} years (P90 {payback_p90:.1} years).",
    ));

    for c in correlations {
        if c.pearson_r.abs() > 0.5 {
            insights.push(format!(
                "{} is a dominant driver of NPV (Pearson r = {:.2}).",
                c.parameter, c.pearson_r
            ));
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use distributions::{DistributionKind, PresetBaseValues};

    fn base_values() -> PresetBaseValues {
        PresetBaseValues {
            electricity_price: 0.30,
            production_factor: 1.0,
            degradation_rate: 0.005,
            investment_cost: 3000.0,
            inflation_rate: 0.02,
            discount_rate: 0.06,
        }
    }

    fn base_params() -> EconomicParams {
        EconomicParams {
            capex_per_kwp: 3000.0,
            capex_per_kwh_battery: 1500.0,
            capex_per_kw_battery: 500.0,
            opex_pct_per_year: 0.01,
            battery_opex_pct_per_year: 0.01,
            discount_rate: 0.06,
            inflation_rate: 0.02,
            analysis_years: 25,
            pv_degradation_rate: 0.005,
            battery_degradation_rate: 0.02,
            battery_lifetime_years: 10,
            battery_replacement_cost_factor: 0.7,
            mode: CashFlowMode::Real,
            export_enabled: false,
        }
    }

    fn base_energetics() -> YearOneEnergetics {
        YearOneEnergetics {
            pv_capacity_kwp: 100.0,
            self_consumed_kwh: 60_000.0,
            exported_kwh: 10_000.0,
            battery_discharged_kwh: 20_000.0,
            battery_energy_kwh: 200.0,
            battery_power_kw: 100.0,
            import_price: 0.30,
            feed_in_price: 0.08,
        }
    }

    fn request(seed: u64, iterations: u32) -> MonteCarloRequest {
        let bv = base_values();
        let dists = distributions::preset("moderate", &bv).unwrap();
        MonteCarloRequest {
            base_energetics: base_energetics(),
            base_params: base_params(),
            base_values: bv,
            distributions: dists,
            correlations: vec![],
            iterations,
            seed,
        }
    }

    #[test]
    fn rejects_out_of_range_iteration_count() {
        let req = request(1, 50);
        assert!(monte_carlo(&req).is_err());
    }

    #[test]
    fn rejects_misordered_distributions() {
        let mut req = request(1, 200);
        req.distributions.swap(0, 1);
        assert!(monte_carlo(&req).is_err());
    }

    #[test]
    fn same_seed_reproduces_identical_percentiles() {
        let req = request(42, 500);
        let a = monte_carlo(&req).unwrap();
        let b = monte_carlo(&req).unwrap();
        assert_eq!(a.npv_median, b.npv_median);
        assert_eq!(a.npv_p10, b.npv_p10);
        assert_eq!(a.npv_p90, b.npv_p90);
    }

    #[test]
    fn probability_of_positive_npv_is_a_fraction() {
        let req = request(7, 500);
        let result = monte_carlo(&req).unwrap();
        assert!((0.0..=1.0).contains(&result.probability_positive_npv));
    }

    #[test]
    fn var_95_is_less_than_or_equal_to_var_99_tail() {
        // VaR-99 is a more extreme (lower) quantile than VaR-95.
        let req = request(11, 2000);
        let result = monte_carlo(&req).unwrap();
        assert!(result.var_99 <= result.var_95 + 1e-6);
    }

    #[test]
    fn insights_mention_payback_and_are_non_empty() {
        let req = request(5, 300);
        let result = monte_carlo(&req).unwrap();
        assert!(!result.insights.is_empty());
        assert!(result.insights.iter().any(|s| s.contains("payback")));
    }

    #[test]
    #[allow(unused)]
    fn distribution_kind_variants_compile() {
        let _ = DistributionKind::Uniform { min: 0.0, max: 1.0 };
    }
}
