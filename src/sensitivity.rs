//! One-at-a-time sensitivity (tornado) analysis over the cash-flow model.
//!
//! Perturbs each named parameter independently at a low and high percentage
//! while holding every other parameter at its base value, re-running
//! [`economics::economics`] at each end, and ranking parameters by how much
//! their swing moves NPV. Shares its parameter mapping with
//! [`montecarlo`](crate::montecarlo) so a tornado chart and a Monte Carlo run
//! describe the same six inputs the same way.

use crate::economics::{self, EconomicParams, YearOneEnergetics};
use crate::error::{EngineError, Result};
use crate::montecarlo::{self, PARAMETER_ORDER, distributions::PresetBaseValues};
use serde::{Deserialize, Serialize};

/// One parameter to perturb, e.g. `{ name: "discount_rate", low_pct: -0.2,
/// high_pct: 0.2 }` for a +/-20% swing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityParameter {
    pub name: String,
    pub low_pct: f64,
    pub high_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRequest {
    pub base_energetics: YearOneEnergetics,
    pub base_params: EconomicParams,
    pub base_values: PresetBaseValues,
    pub parameters: Vec<SensitivityParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub parameter: String,
    pub low_value: f64,
    pub high_value: f64,
    pub low_pct: f64,
    pub high_pct: f64,
    pub low_npv: f64,
    pub high_npv: f64,
    pub absolute_swing: f64,
    pub relative_swing: f64,
    pub crosses_zero: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub base_npv: f64,
    /// Sorted descending by `absolute_swing`.
    pub rows: Vec<SensitivityRow>,
    pub zero_crossing_parameters: Vec<String>,
}

fn base_draw(base_values: &PresetBaseValues) -> [f64; 6] {
    [
        base_values.electricity_price,
        base_values.production_factor,
        base_values.degradation_rate,
        base_values.investment_cost,
        base_values.inflation_rate,
        base_values.discount_rate,
    ]
}

/// Runs the tornado analysis described in `req.parameters`.
pub fn sensitivity(req: &SensitivityRequest) -> Result<SensitivityResult> {
    if req.parameters.is_empty() {
        return Err(EngineError::invalid("sensitivity request must name at least one parameter"));
    }

    let draw = base_draw(&req.base_values);
    let (base_e, base_p) = montecarlo::apply_sample(&req.base_energetics, &req.base_params, &req.base_values, &draw);
    let base_result = economics::economics(&base_e, &base_p)?;

    let mut rows = Vec::with_capacity(req.parameters.len());
    for param in &req.parameters {
        let idx = PARAMETER_ORDER
            .iter()
            .position(|n| *n == param.name)
            .ok_or_else(|| EngineError::invalid(format!("unknown sensitivity parameter: {}", param.name)))?;

        let base_value = draw[idx];
        let low_value = base_value * (1.0 + param.low_pct);
        let high_value = base_value * (1.0 + param.high_pct);

        let mut low_draw = draw;
        low_draw[idx] = low_value;
        let mut high_draw = draw;
        high_draw[idx] = high_value;

        let (low_e, low_p) = montecarlo::apply_sample(&req.base_energetics, &req.base_params, &req.base_values, &low_draw);
        let low_result = economics::economics(&low_e, &low_p)?;
        let (high_e, high_p) = montecarlo::apply_sample(&req.base_energetics, &req.base_params, &req.base_values, &high_draw);
        let high_result = economics::economics(&high_e, &high_p)?;

        let absolute_swing = (high_result.npv - low_result.npv).abs();
        let base_scale = base_result.npv.abs().max(1.0);
        let relative_swing = absolute_swing / base_scale;
        let crosses_zero = (low_result.npv < 0.0) != (high_result.npv < 0.0);

        rows.push(SensitivityRow {
            parameter: param.name.clone(),
            low_value,
            high_value,
            low_pct: param.low_pct,
            high_pct: param.high_pct,
            low_npv: low_result.npv,
            high_npv: high_result.npv,
            absolute_swing,
            relative_swing,
            crosses_zero,
        });
    }

    rows.sort_by(|a, b| b.absolute_swing.partial_cmp(&a.absolute_swing).unwrap());
    let zero_crossing_parameters = rows
        .iter()
        .filter(|r| r.crosses_zero)
        .map(|r| r.parameter.clone())
        .collect();

    Ok(SensitivityResult {
        base_npv: base_result.npv,
        rows,
        zero_crossing_parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economics::CashFlowMode;

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

    fn request(names: &[&str]) -> SensitivityRequest {
        SensitivityRequest {
            base_energetics: base_energetics(),
            base_params: base_params(),
            base_values: base_values(),
            parameters: names
                .iter()
                .map(|n| SensitivityParameter { name: n.to_string(), low_pct: -0.2, high_pct: 0.2 })
                .collect(),
        }
    }

    #[test]
    fn rows_are_sorted_descending_by_swing() {
        let req = request(&["electricity_price", "discount_rate", "inflation_rate"]);
        let result = sensitivity(&req).unwrap();
        for pair in result.rows.windows(2) {
            assert!(pair[0].absolute_swing >= pair[1].absolute_swing);
        }
    }

    #[test]
    fn unknown_parameter_name_is_rejected() {
        let req = request(&["not_a_real_parameter"]);
        assert!(sensitivity(&req).is_err());
    }

    #[test]
    fn empty_parameter_list_is_rejected() {
        let req = SensitivityRequest {
            base_energetics: base_energetics(),
            base_params: base_params(),
            base_values: base_values(),
            parameters: vec![],
        };
        assert!(sensitivity(&req).is_err());
    }

    #[test]
    fn discount_rate_swing_moves_npv_in_opposite_directions() {
        let req = request(&["discount_rate"]);
        let result = sensitivity(&req).unwrap();
        let row = &result.rows[0];
        // Higher discount rate discounts future cash flows harder.
        assert!(row.high_npv <= row.low_npv);
    }
}
