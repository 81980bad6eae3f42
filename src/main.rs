//! CLI entry point — config-driven wiring for the dispatch, sizing, and risk engines.

use std::path::Path;
use std::process;

use bess_sizing_engine::config::EngineConfig;
use bess_sizing_engine::dispatch::{self, DispatchRequest};
use bess_sizing_engine::economics::{CashFlowMode, EconomicParams, YearOneEnergetics};
use bess_sizing_engine::io::export::export_hourly_csv;
use bess_sizing_engine::montecarlo::distributions::PresetBaseValues;
use bess_sizing_engine::montecarlo::{self, MonteCarloRequest};
use bess_sizing_engine::sizing::{self, PolicyKind, SizingRequest, SizingStrategy};
use bess_sizing_engine::types::{BatterySpec, DegradationBudget, Policy, PriceConfig};

/// Parsed CLI arguments.
struct CliArgs {
    command: Command,
    config_path: Option<String>,
    preset: Option<String>,
    profile_path: Option<String>,
    hourly_out: Option<String>,
    power_kw: Option<f64>,
    energy_kwh: Option<f64>,
}

enum Command {
    Dispatch,
    Sizing,
    MonteCarlo,
}

fn print_help() {
    eprintln!("bess-sizing-engine — PV + BESS sizing, dispatch, and risk engine");
    eprintln!();
    eprintln!("Usage: bess-sizing-engine <dispatch|sizing|montecarlo> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>        Load engine configuration from a TOML file");
    eprintln!("  --preset <name>        Use a built-in preset (baseline, conservative, aggressive)");
    eprintln!("  --profile <path>       CSV with pv_kw,load_kw columns (flat load assumed if omitted)");
    eprintln!("  --power-kw <f64>       Battery power rating for `dispatch` (default: 100)");
    eprintln!("  --energy-kwh <f64>     Battery energy rating for `dispatch` (default: 400)");
    eprintln!("  --hourly-out <path>    Export hourly dispatch records to CSV (`dispatch` only)");
    eprintln!("  --help                 Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("error: missing subcommand");
        print_help();
        process::exit(1);
    }

    let command = match args[1].as_str() {
        "dispatch" => Command::Dispatch,
        "sizing" => Command::Sizing,
        "montecarlo" => Command::MonteCarlo,
        "--help" | "-h" => {
            print_help();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown subcommand \"{other}\"");
            print_help();
            process::exit(1);
        }
    };

    let mut cli = CliArgs {
        command,
        config_path: None,
        preset: None,
        profile_path: None,
        hourly_out: None,
        power_kw: None,
        energy_kwh: None,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                cli.config_path = args.get(i).cloned();
            }
            "--preset" => {
                i += 1;
                cli.preset = args.get(i).cloned();
            }
            "--profile" => {
                i += 1;
                cli.profile_path = args.get(i).cloned();
            }
            "--hourly-out" => {
                i += 1;
                cli.hourly_out = args.get(i).cloned();
            }
            "--power-kw" => {
                i += 1;
                cli.power_kw = args.get(i).and_then(|v| v.parse().ok());
            }
            "--energy-kwh" => {
                i += 1;
                cli.energy_kwh = args.get(i).and_then(|v| v.parse().ok());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> EngineConfig {
    let cfg = if let Some(ref path) = cli.config_path {
        EngineConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        })
    } else if let Some(ref name) = cli.preset {
        EngineConfig::from_preset(name).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        })
    } else {
        EngineConfig::baseline()
    };

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    cfg
}

/// Loads `pv_kw,load_kw` columns from a CSV profile, or falls back to a
/// year-long synthetic profile (a clipped sinusoid PV trace against a flat
/// load) when no path is given.
fn load_profile(path: Option<&str>) -> (Vec<f64>, Vec<f64>) {
    match path {
        Some(p) => {
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(p)
                .unwrap_or_else(|e| {
                    eprintln!("error: cannot read profile \"{p}\": {e}");
                    process::exit(1);
                });
            let mut pv = Vec::new();
            let mut load = Vec::new();
            for record in rdr.records() {
                let rec = record.unwrap_or_else(|e| {
                    eprintln!("error: malformed profile row: {e}");
                    process::exit(1);
                });
                pv.push(rec[0].parse::<f64>().unwrap_or(0.0));
                load.push(rec[1].parse::<f64>().unwrap_or(0.0));
            }
            (pv, load)
        }
        None => synthetic_profile(365),
    }
}

fn synthetic_profile(days: usize) -> (Vec<f64>, Vec<f64>) {
    let hours = days * 24;
    let mut pv = Vec::with_capacity(hours);
    let mut load = Vec::with_capacity(hours);
    for t in 0..hours {
        let hour_of_day = (t % 24) as f64;
        let sun = ((hour_of_day - 12.0) / 6.0 * std::f64::consts::FRAC_PI_2).cos().max(0.0);
        pv.push(50.0 * sun.powf(1.5));
        load.push(20.0 + 10.0 * ((t as f64 / 24.0) * std::f64::consts::TAU / 7.0).sin().abs());
    }
    (pv, load)
}

fn run_dispatch(cli: &CliArgs, cfg: &EngineConfig) {
    let (pv, load) = load_profile(cli.profile_path.as_deref());
    let power_kw = cli.power_kw.unwrap_or(100.0);
    let energy_kwh = cli.energy_kwh.unwrap_or(400.0);

    let battery = BatterySpec::new(
        power_kw,
        energy_kwh,
        cfg.battery.soc_min,
        cfg.battery.soc_max,
        cfg.battery.soc_initial,
        cfg.battery.round_trip_efficiency,
    )
    .unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let req = DispatchRequest {
        pv_kw: pv,
        load_kw: load,
        interval_minutes: 60,
        battery,
        policy: Policy::PvSurplus,
        prices: PriceConfig::new(0.30, 0.08, 0.0).unwrap(),
        degradation_budget: Some(DegradationBudget {
            max_efc_per_year: Some(330.0),
            max_throughput_mwh_per_year: None,
        }),
        return_hourly: cli.hourly_out.is_some(),
    };

    let result = dispatch::dispatch(&req).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    print!("{result}");

    if let Some(ref path) = cli.hourly_out {
        let rows = result.hourly.as_deref().unwrap_or(&[]);
        if let Err(e) = export_hourly_csv(rows, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Hourly dispatch written to {path}");
    }
}

fn run_sizing(cli: &CliArgs, cfg: &EngineConfig) {
    let (pv, load) = load_profile(cli.profile_path.as_deref());

    let strategy = match cfg.sizing.strategy.as_str() {
        "cycles_max" => SizingStrategy::CyclesMax,
        "balanced" => SizingStrategy::Balanced {
            min_cycles: cfg.sizing.balanced_min_cycles,
            max_cycles: cfg.sizing.balanced_max_cycles,
        },
        _ => SizingStrategy::NpvMax,
    };

    let req = SizingRequest {
        pv_kw: pv,
        load_kw: load,
        interval_minutes: 60,
        policy_kind: PolicyKind::PvSurplus,
        prices: PriceConfig::new(0.30, 0.08, 0.0).unwrap(),
        econ: econ_params(cfg),
        durations_h: cfg.sizing.durations_hours.clone(),
        min_power_kw: None,
        max_power_kw: None,
        power_steps: cfg.sizing.power_steps as u32,
        degradation_budget: Some(DegradationBudget {
            max_efc_per_year: Some(330.0),
            max_throughput_mwh_per_year: None,
        }),
        round_trip_efficiency: cfg.battery.round_trip_efficiency,
        soc_min: cfg.battery.soc_min,
        soc_max: cfg.battery.soc_max,
        strategy,
    };

    let result = sizing::run_sizing(&req).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    for w in &result.warnings {
        eprintln!("warning: {w}");
    }
    for (i, v) in result.variants.iter().enumerate() {
        let marker = if Some(i) == result.recommended_index { "*" } else { " " };
        println!(
            "{marker} {:?} {:>6.1} kW / {:>7.1} kWh  npv={:>10.0}  payback={:>5.1}y  score={:>5.1}",
            v.duration_class, v.power_kw, v.energy_kwh, v.npv, v.simple_payback_years, v.score
        );
    }
}

fn econ_params(cfg: &EngineConfig) -> EconomicParams {
    let e = &cfg.economics;
    EconomicParams {
        capex_per_kwp: e.capex_per_kwp,
        capex_per_kwh_battery: e.capex_per_kwh_battery,
        capex_per_kw_battery: e.capex_per_kw_battery,
        opex_pct_per_year: e.opex_pct_per_year,
        battery_opex_pct_per_year: e.battery_opex_pct_per_year,
        discount_rate: e.discount_rate,
        inflation_rate: e.inflation_rate,
        analysis_years: e.analysis_years,
        pv_degradation_rate: e.pv_degradation_rate,
        battery_degradation_rate: e.battery_degradation_rate,
        battery_lifetime_years: e.battery_lifetime_years,
        battery_replacement_cost_factor: e.battery_replacement_cost_factor,
        mode: if e.mode == "nominal" { CashFlowMode::Nominal } else { CashFlowMode::Real },
        export_enabled: e.export_enabled,
    }
}

fn main() {
    let cli = parse_args();
    let cfg = load_config(&cli);

    match cli.command {
        Command::Dispatch => run_dispatch(&cli, &cfg),
        Command::Sizing => run_sizing(&cli, &cfg),
        Command::MonteCarlo => run_montecarlo_cmd(&cli, &cfg),
    }
}

fn run_montecarlo_cmd(cli: &CliArgs, cfg: &EngineConfig) {
    let (pv, load) = load_profile(cli.profile_path.as_deref());
    let power_kw = cli.power_kw.unwrap_or(100.0);
    let energy_kwh = cli.energy_kwh.unwrap_or(400.0);

    let battery = BatterySpec::new(
        power_kw,
        energy_kwh,
        cfg.battery.soc_min,
        cfg.battery.soc_max,
        cfg.battery.soc_initial,
        cfg.battery.round_trip_efficiency,
    )
    .unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let dispatch_req = DispatchRequest {
        pv_kw: pv,
        load_kw: load,
        interval_minutes: 60,
        battery,
        policy: Policy::PvSurplus,
        prices: PriceConfig::new(0.30, 0.08, 0.0).unwrap(),
        degradation_budget: None,
        return_hourly: false,
    };
    let dispatch_result = dispatch::dispatch(&dispatch_req).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let econ = econ_params(cfg);
    let base_values = PresetBaseValues {
        electricity_price: dispatch_req.prices.import_price,
        production_factor: 1.0,
        degradation_rate: econ.pv_degradation_rate,
        investment_cost: econ.capex_per_kwh_battery,
        inflation_rate: econ.inflation_rate,
        discount_rate: econ.discount_rate,
    };
    let distributions = montecarlo::distributions::preset(&cfg.monte_carlo.preset, &base_values)
        .unwrap_or_else(|| {
            eprintln!("error: unknown monte carlo preset \"{}\"", cfg.monte_carlo.preset);
            process::exit(1);
        });

    let energetics = YearOneEnergetics {
        pv_capacity_kwp: dispatch_result.totals.total_pv_kwh.max(1.0) / (365.0 * 4.5),
        self_consumed_kwh: dispatch_result.totals.direct_pv_kwh,
        exported_kwh: dispatch_result.totals.grid_export_kwh,
        battery_discharged_kwh: dispatch_result.totals.discharge_kwh,
        battery_energy_kwh: energy_kwh,
        battery_power_kw: power_kw,
        import_price: dispatch_req.prices.import_price,
        feed_in_price: dispatch_req.prices.export_price,
    };

    let mc_req = MonteCarloRequest {
        base_energetics: energetics,
        base_params: econ,
        base_values,
        distributions,
        correlations: vec![],
        iterations: cfg.monte_carlo.iterations,
        seed: cfg.monte_carlo.seed,
    };

    let result = montecarlo::monte_carlo(&mc_req).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    println!(
        "NPV: mean={:.0} median={:.0} p10={:.0} p90={:.0}",
        result.npv_mean, result.npv_median, result.npv_p10, result.npv_p90
    );
    println!(
        "VaR-95={:.0} VaR-99={:.0} CVaR-95={:.0} P(NPV>0)={:.1}%",
        result.var_95, result.var_99, result.cvar_95, result.probability_positive_npv * 100.0
    );
    for insight in &result.insights {
        println!("- {insight}");
    }
}
