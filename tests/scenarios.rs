//! End-to-end scenarios exercising dispatch, economics, and risk entry points
//! through the crate's public API.

use bess_sizing_engine::dispatch::{dispatch, DispatchRequest};
use bess_sizing_engine::economics::{economics, CashFlowMode, EconomicParams, IrrOutcome, YearOneEnergetics};
use bess_sizing_engine::montecarlo::distributions::PresetBaseValues;
use bess_sizing_engine::montecarlo::{monte_carlo, MonteCarloRequest};
use bess_sizing_engine::types::{BatterySpec, DegradationBudget, Policy, PriceConfig};

fn battery(power_kw: f64, energy_kwh: f64, soc_initial: f64, eta: f64) -> BatterySpec {
    BatterySpec::new(power_kw, energy_kwh, 0.1, 0.9, soc_initial, eta).unwrap()
}

fn flat_prices() -> PriceConfig {
    PriceConfig::new(1.0, 0.0, 50.0).unwrap()
}

const EPS: f64 = 1e-6;

#[test]
fn flat_load_pv_surplus_balances_energy_with_no_export() {
    let mut pv = vec![100.0; 12];
    pv.extend(vec![0.0; 12]);
    let load = vec![50.0; 24];

    let req = DispatchRequest {
        pv_kw: pv,
        load_kw: load,
        interval_minutes: 60,
        battery: battery(100.0, 400.0, 0.5, 0.9),
        policy: Policy::PvSurplus,
        prices: flat_prices(),
        degradation_budget: None,
        return_hourly: true,
    };

    let result = dispatch(&req).unwrap();
    assert!((result.totals.direct_pv_kwh - 600.0).abs() < EPS);
    assert_eq!(result.totals.grid_export_kwh, 0.0);
    assert!(result.totals.charge_kwh <= 600.0 + EPS);

    for row in result.hourly.unwrap() {
        assert!(row.flows.grid_export_kw == 0.0);
        assert!(row.flows.charge_kw >= 0.0);
        assert!(row.flows.discharge_total_kw >= 0.0);
        assert!(row.flows.grid_import_kw >= 0.0);
        assert!(row.flows.curtailment_kw >= 0.0);

        let pv_balance = row.pv_kw
            - row.flows.direct_pv_kw
            - row.flows.charge_from_pv_kw
            - row.flows.curtailment_kw;
        assert!(pv_balance.abs() <= EPS.max(row.pv_kw * EPS));

        let load_balance = row.load_kw
            - row.flows.direct_pv_kw
            - row.flows.discharge_total_kw
            - row.flows.grid_import_kw;
        assert!(load_balance.abs() <= EPS.max(row.load_kw * EPS));
    }
}

#[test]
fn peak_shaving_reduces_peak_to_the_configured_limit() {
    let mut load = vec![100.0; 24];
    load[12] = 500.0;

    let req = DispatchRequest {
        pv_kw: vec![],
        load_kw: load,
        interval_minutes: 60,
        battery: battery(300.0, 300.0, 1.0, 0.95),
        policy: Policy::PeakShaving { peak_limit_kw: 200.0 },
        prices: flat_prices(),
        degradation_budget: None,
        return_hourly: false,
    };

    let result = dispatch(&req).unwrap();
    assert!((result.original_peak_kw.unwrap() - 500.0).abs() < EPS);
    assert!((result.new_peak_kw.unwrap() - 200.0).abs() < EPS);
}

#[test]
fn stacked_policy_keeps_reserve_for_the_peak_event_despite_pv_surplus() {
    let hours = 24;
    let mut pv = vec![0.0; hours];
    let mut load = vec![100.0; hours];
    for h in 9..15 {
        pv[h] = 150.0;
        load[h] = 60.0;
    }
    load[20] = 500.0;

    let req = DispatchRequest {
        pv_kw: pv,
        load_kw: load,
        interval_minutes: 60,
        battery: battery(300.0, 300.0, 0.5, 0.95),
        policy: Policy::Stacked { peak_limit_kw: 200.0, reserve_fraction: 0.3 },
        prices: flat_prices(),
        degradation_budget: None,
        return_hourly: true,
    };

    let result = dispatch(&req).unwrap();
    assert!(result.new_peak_kw.unwrap() <= 200.0 + EPS);

    for row in result.hourly.unwrap() {
        let split_balance =
            row.flows.discharge_peak_kw + row.flows.discharge_pv_kw - row.flows.discharge_total_kw;
        assert!(split_balance.abs() <= EPS);
    }
}

#[test]
fn load_only_grid_charged_never_draws_on_pv_and_never_increases_cost() {
    let mut load = vec![100.0; 24];
    load[18] = 400.0;

    let req = DispatchRequest {
        pv_kw: vec![],
        load_kw: load,
        interval_minutes: 60,
        battery: battery(250.0, 500.0, 0.9, 0.9),
        policy: Policy::LoadOnly { peak_limit_kw: 150.0 },
        prices: flat_prices(),
        degradation_budget: Some(DegradationBudget {
            max_efc_per_year: Some(300.0),
            max_throughput_mwh_per_year: None,
        }),
        return_hourly: false,
    };

    let result = dispatch(&req).unwrap();
    assert_eq!(result.totals.total_pv_kwh, 0.0);
    assert_eq!(result.totals.direct_pv_kwh, 0.0);
    assert!(result.energy_cost.annual_savings <= result.energy_cost.baseline_cost + EPS);

    let reduction = result.original_peak_kw.unwrap() - result.new_peak_kw.unwrap();
    let expected_savings = reduction.max(0.0) * req.prices.demand_charge_per_kw_year
        + (result.energy_cost.baseline_cost - result.energy_cost.project_cost);
    assert!((expected_savings - result.energy_cost.annual_savings).abs() < 1e-3);
}

fn base_params(mode: CashFlowMode) -> EconomicParams {
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
        mode,
        export_enabled: false,
    }
}

#[test]
fn irr_converges_when_investment_is_negative_and_every_cash_flow_is_positive() {
    let mut params = base_params(CashFlowMode::Real);
    params.capex_per_kwp = -10_000.0;
    params.capex_per_kwh_battery = 0.0;
    params.capex_per_kw_battery = 0.0;

    let energetics = YearOneEnergetics {
        pv_capacity_kwp: 100.0,
        self_consumed_kwh: 50_000.0,
        exported_kwh: 0.0,
        battery_discharged_kwh: 0.0,
        battery_energy_kwh: 0.0,
        battery_power_kw: 0.0,
        import_price: 0.3,
        feed_in_price: 0.0,
    };

    let result = economics(&energetics, &params).unwrap();
    assert!(matches!(result.irr, IrrOutcome::Converged(_)));
}

#[test]
fn irr_is_invalid_when_there_is_no_investment_and_every_cash_flow_is_positive() {
    let mut params = base_params(CashFlowMode::Real);
    params.capex_per_kwp = 0.0;
    params.capex_per_kwh_battery = 0.0;
    params.capex_per_kw_battery = 0.0;

    let energetics = YearOneEnergetics {
        pv_capacity_kwp: 100.0,
        self_consumed_kwh: 50_000.0,
        exported_kwh: 0.0,
        battery_discharged_kwh: 0.0,
        battery_energy_kwh: 0.0,
        battery_power_kw: 0.0,
        import_price: 0.3,
        feed_in_price: 0.0,
    };

    let result = economics(&energetics, &params).unwrap();
    assert_eq!(result.irr, IrrOutcome::Invalid);
}

#[test]
fn monte_carlo_is_bit_identical_across_runs_with_the_same_seed() {
    let base_values = PresetBaseValues {
        electricity_price: 0.30,
        production_factor: 1.0,
        degradation_rate: 0.005,
        investment_cost: 3000.0,
        inflation_rate: 0.02,
        discount_rate: 0.06,
    };
    let distributions =
        bess_sizing_engine::montecarlo::distributions::preset("moderate", &base_values).unwrap();

    let req = MonteCarloRequest {
        base_energetics: YearOneEnergetics {
            pv_capacity_kwp: 100.0,
            self_consumed_kwh: 60_000.0,
            exported_kwh: 10_000.0,
            battery_discharged_kwh: 20_000.0,
            battery_energy_kwh: 200.0,
            battery_power_kw: 100.0,
            import_price: 0.30,
            feed_in_price: 0.08,
        },
        base_params: base_params(CashFlowMode::Real),
        base_values,
        distributions,
        correlations: vec![],
        iterations: 1000,
        seed: 2024,
    };

    let a = monte_carlo(&req).unwrap();
    let b = monte_carlo(&req).unwrap();
    assert_eq!(a.npv_mean.to_bits(), b.npv_mean.to_bits());
    assert_eq!(a.npv_p10.to_bits(), b.npv_p10.to_bits());
    assert_eq!(a.npv_p90.to_bits(), b.npv_p90.to_bits());
    assert_eq!(a.var_95.to_bits(), b.var_95.to_bits());
}
