//! TOML-based engine configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Top-level engine configuration parsed from TOML.
///
/// All fields have defaults matching the baseline preset. Load from TOML
/// with [`EngineConfig::from_toml_file`] or use [`EngineConfig::baseline`]
/// for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Default battery electrical parameters for requests that don't
    /// specify their own.
    #[serde(default)]
    pub battery: BatteryDefaultsConfig,
    /// Default cash-flow model parameters.
    #[serde(default)]
    pub economics: EconomicDefaultsConfig,
    /// Default sizing grid-search ranges and strategy.
    #[serde(default)]
    pub sizing: SizingDefaultsConfig,
    /// Default Monte Carlo preset and sample count.
    #[serde(default)]
    pub monte_carlo: MonteCarloDefaultsConfig,
    /// Named scoring weight profile for multi-criteria comparisons layered
    /// on top of a sizing result.
    #[serde(default)]
    pub scoring: ScoringWeightsConfig,
}

/// Default battery electrical parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryDefaultsConfig {
    /// Round-trip efficiency (0.0-1.0], decomposed symmetrically.
    pub round_trip_efficiency: f64,
    /// Minimum state of charge as a fraction of capacity.
    pub soc_min: f64,
    /// Maximum state of charge as a fraction of capacity.
    pub soc_max: f64,
    /// Initial state of charge as a fraction of capacity.
    pub soc_initial: f64,
}

impl Default for BatteryDefaultsConfig {
    fn default() -> Self {
        Self {
            round_trip_efficiency: 0.9,
            soc_min: 0.1,
            soc_max: 0.9,
            soc_initial: 0.5,
        }
    }
}

/// Default cash-flow model parameters, mirroring [`crate::economics::EconomicParams`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomicDefaultsConfig {
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
    /// `"real"` or `"nominal"`.
    pub mode: String,
    pub export_enabled: bool,
}

impl Default for EconomicDefaultsConfig {
    fn default() -> Self {
        Self {
            capex_per_kwp: 900.0,
            capex_per_kwh_battery: 350.0,
            capex_per_kw_battery: 150.0,
            opex_pct_per_year: 0.01,
            battery_opex_pct_per_year: 0.01,
            discount_rate: 0.06,
            inflation_rate: 0.02,
            analysis_years: 25,
            pv_degradation_rate: 0.005,
            battery_degradation_rate: 0.02,
            battery_lifetime_years: 10,
            battery_replacement_cost_factor: 0.7,
            mode: "real".to_string(),
            export_enabled: false,
        }
    }
}

/// Default sizing grid-search ranges and recommendation strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizingDefaultsConfig {
    /// Duration classes searched, in hours (e.g. `[1.0, 2.0, 4.0]`).
    pub durations_hours: Vec<f64>,
    /// Number of power levels sampled per duration.
    pub power_steps: usize,
    /// `"npv_max"`, `"cycles_max"`, or `"balanced"`.
    pub strategy: String,
    /// Lower bound on annual cycles for the `balanced` strategy.
    pub balanced_min_cycles: f64,
    /// Upper bound on annual cycles for the `balanced` strategy.
    pub balanced_max_cycles: f64,
}

impl Default for SizingDefaultsConfig {
    fn default() -> Self {
        Self {
            durations_hours: vec![1.0, 2.0, 4.0],
            power_steps: 10,
            strategy: "npv_max".to_string(),
            balanced_min_cycles: 150.0,
            balanced_max_cycles: 300.0,
        }
    }
}

/// Default Monte Carlo sampling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonteCarloDefaultsConfig {
    /// `"moderate"`, `"conservative"`, or `"optimistic"`.
    pub preset: String,
    pub iterations: u32,
    pub seed: u64,
}

impl Default for MonteCarloDefaultsConfig {
    fn default() -> Self {
        Self {
            preset: "moderate".to_string(),
            iterations: 10_000,
            seed: 42,
        }
    }
}

/// A named weighting of NPV, annual cycles, and payback used when a caller
/// wants a single composite score across otherwise incomparable variants;
/// distinct from (and applied downstream of) the sizing optimizer's own
/// 0-100 score.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWeightsConfig {
    pub npv_weight: f64,
    pub cycles_weight: f64,
    pub payback_weight: f64,
}

impl Default for ScoringWeightsConfig {
    fn default() -> Self {
        Self::cfo()
    }
}

impl ScoringWeightsConfig {
    /// Weighs NPV most heavily: a finance-led view of the investment.
    pub fn cfo() -> Self {
        Self { npv_weight: 0.6, cycles_weight: 0.15, payback_weight: 0.25 }
    }

    /// Weighs annual cycling most heavily: a throughput/utilization-led
    /// view, used as a proxy for maximizing energy shifted off the grid.
    pub fn esg() -> Self {
        Self { npv_weight: 0.25, cycles_weight: 0.55, payback_weight: 0.20 }
    }

    /// Weighs payback most heavily: an operations-led view favoring a
    /// quickly self-funding project.
    pub fn operations() -> Self {
        Self { npv_weight: 0.3, cycles_weight: 0.2, payback_weight: 0.5 }
    }

    pub const PROFILES: &'static [&'static str] = &["cfo", "esg", "operations"];

    /// Looks up a named weighting profile.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `name` is not one of [`Self::PROFILES`].
    pub fn from_profile(name: &str) -> Result<Self, ConfigError> {
        match name {
            "cfo" => Ok(Self::cfo()),
            "esg" => Ok(Self::esg()),
            "operations" => Ok(Self::operations()),
            _ => Err(ConfigError {
                field: "scoring".to_string(),
                message: format!(
                    "unknown scoring profile \"{name}\", available: {}",
                    Self::PROFILES.join(", ")
                ),
            }),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g. `"economics.discount_rate"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl EngineConfig {
    /// Returns the baseline preset: moderate risk assumptions, NPV-max
    /// recommendation strategy.
    pub fn baseline() -> Self {
        Self {
            battery: BatteryDefaultsConfig::default(),
            economics: EconomicDefaultsConfig::default(),
            sizing: SizingDefaultsConfig::default(),
            monte_carlo: MonteCarloDefaultsConfig::default(),
            scoring: ScoringWeightsConfig::default(),
        }
    }

    /// Returns the conservative preset: wider uncertainty bands, higher
    /// discount rate, shorter battery lifetime.
    pub fn conservative() -> Self {
        Self {
            battery: BatteryDefaultsConfig {
                round_trip_efficiency: 0.85,
                ..BatteryDefaultsConfig::default()
            },
            economics: EconomicDefaultsConfig {
                discount_rate: 0.09,
                battery_lifetime_years: 8,
                battery_degradation_rate: 0.03,
                ..EconomicDefaultsConfig::default()
            },
            sizing: SizingDefaultsConfig {
                strategy: "balanced".to_string(),
                ..SizingDefaultsConfig::default()
            },
            monte_carlo: MonteCarloDefaultsConfig {
                preset: "conservative".to_string(),
                ..MonteCarloDefaultsConfig::default()
            },
            scoring: ScoringWeightsConfig::cfo(),
        }
    }

    /// Returns the aggressive preset: optimistic uncertainty bands, a
    /// cycling-led recommendation strategy, and a wider duration search.
    pub fn aggressive() -> Self {
        Self {
            battery: BatteryDefaultsConfig {
                round_trip_efficiency: 0.93,
                ..BatteryDefaultsConfig::default()
            },
            economics: EconomicDefaultsConfig {
                discount_rate: 0.04,
                ..EconomicDefaultsConfig::default()
            },
            sizing: SizingDefaultsConfig {
                durations_hours: vec![1.0, 2.0, 4.0, 6.0],
                strategy: "cycles_max".to_string(),
                ..SizingDefaultsConfig::default()
            },
            monte_carlo: MonteCarloDefaultsConfig {
                preset: "optimistic".to_string(),
                ..MonteCarloDefaultsConfig::default()
            },
            scoring: ScoringWeightsConfig::esg(),
        }
    }

    /// Available preset names.
    pub const PRESETS: &'static [&'static str] = &["baseline", "conservative", "aggressive"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "conservative" => Ok(Self::conservative()),
            "aggressive" => Ok(Self::aggressive()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let b = &self.battery;
        if !(0.0..=1.0).contains(&b.round_trip_efficiency) || b.round_trip_efficiency <= 0.0 {
            errors.push(ConfigError {
                field: "battery.round_trip_efficiency".into(),
                message: "must be in (0.0, 1.0]".into(),
            });
        }
        if b.soc_min >= b.soc_max {
            errors.push(ConfigError {
                field: "battery.soc_min".into(),
                message: "must be < battery.soc_max".into(),
            });
        }
        if !(b.soc_min..=b.soc_max).contains(&b.soc_initial) {
            errors.push(ConfigError {
                field: "battery.soc_initial".into(),
                message: "must be in [battery.soc_min, battery.soc_max]".into(),
            });
        }

        let e = &self.economics;
        if e.analysis_years == 0 {
            errors.push(ConfigError {
                field: "economics.analysis_years".into(),
                message: "must be > 0".into(),
            });
        }
        if e.discount_rate <= -1.0 {
            errors.push(ConfigError {
                field: "economics.discount_rate".into(),
                message: "must be > -1.0".into(),
            });
        }
        if e.mode != "real" && e.mode != "nominal" {
            errors.push(ConfigError {
                field: "economics.mode".into(),
                message: format!("must be \"real\" or \"nominal\", got \"{}\"", e.mode),
            });
        }

        let sz = &self.sizing;
        if sz.durations_hours.is_empty() {
            errors.push(ConfigError {
                field: "sizing.durations_hours".into(),
                message: "must list at least one duration".into(),
            });
        }
        if sz.durations_hours.iter().any(|d| *d <= 0.0) {
            errors.push(ConfigError {
                field: "sizing.durations_hours".into(),
                message: "every duration must be > 0".into(),
            });
        }
        if sz.power_steps == 0 {
            errors.push(ConfigError {
                field: "sizing.power_steps".into(),
                message: "must be > 0".into(),
            });
        }
        if !["npv_max", "cycles_max", "balanced"].contains(&sz.strategy.as_str()) {
            errors.push(ConfigError {
                field: "sizing.strategy".into(),
                message: format!(
                    "must be \"npv_max\", \"cycles_max\", or \"balanced\", got \"{}\"",
                    sz.strategy
                ),
            });
        }
        if sz.strategy == "balanced" && sz.balanced_min_cycles > sz.balanced_max_cycles {
            errors.push(ConfigError {
                field: "sizing.balanced_min_cycles".into(),
                message: "must be <= sizing.balanced_max_cycles".into(),
            });
        }

        let mc = &self.monte_carlo;
        if !["moderate", "conservative", "optimistic"].contains(&mc.preset.as_str()) {
            errors.push(ConfigError {
                field: "monte_carlo.preset".into(),
                message: format!(
                    "must be \"moderate\", \"conservative\", or \"optimistic\", got \"{}\"",
                    mc.preset
                ),
            });
        }
        if mc.iterations < 100 || mc.iterations > 100_000 {
            errors.push(ConfigError {
                field: "monte_carlo.iterations".into(),
                message: "must be in [100, 100000]".into(),
            });
        }

        let sc = &self.scoring;
        if sc.npv_weight < 0.0 || sc.cycles_weight < 0.0 || sc.payback_weight < 0.0 {
            errors.push(ConfigError {
                field: "scoring".into(),
                message: "weights must be non-negative".into(),
            });
        }
        if sc.npv_weight + sc.cycles_weight + sc.payback_weight <= 0.0 {
            errors.push(ConfigError {
                field: "scoring".into(),
                message: "weights must sum to a positive value".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_is_valid() {
        assert!(EngineConfig::baseline().validate().is_empty());
    }

    #[test]
    fn every_named_preset_is_valid() {
        for name in EngineConfig::PRESETS {
            let cfg = EngineConfig::from_preset(name).unwrap();
            assert!(cfg.validate().is_empty(), "preset {name} should be valid");
        }
    }

    #[test]
    fn from_preset_rejects_unknown_name() {
        assert!(EngineConfig::from_preset("nonexistent").is_err());
    }

    #[test]
    fn validate_accumulates_multiple_errors() {
        let mut cfg = EngineConfig::baseline();
        cfg.battery.soc_min = 0.9;
        cfg.battery.soc_max = 0.1;
        cfg.economics.analysis_years = 0;
        cfg.sizing.durations_hours = vec![];
        let errors = cfg.validate();
        assert!(errors.len() >= 3);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let text = r#"
            [sizing]
            strategy = "cycles_max"
            power_steps = 25
        "#;
        let cfg = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.sizing.strategy, "cycles_max");
        assert_eq!(cfg.sizing.power_steps, 25);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.economics.discount_rate, EconomicDefaultsConfig::default().discount_rate);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let text = r#"
            [battery]
            not_a_real_field = 1.0
        "#;
        assert!(EngineConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn scoring_profiles_are_all_resolvable() {
        for name in ScoringWeightsConfig::PROFILES {
            assert!(ScoringWeightsConfig::from_profile(name).is_ok());
        }
    }

    #[test]
    fn unknown_scoring_profile_is_rejected() {
        assert!(ScoringWeightsConfig::from_profile("not_a_profile").is_err());
    }
}
