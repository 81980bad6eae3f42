//! Shared value types for dispatch, economics, and sizing requests.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Timestep length, in hours. Only quarter-hour and hour grids are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    hours: f64,
}

impl Interval {
    pub const QUARTER_HOUR: Interval = Interval { hours: 0.25 };
    pub const HOUR: Interval = Interval { hours: 1.0 };

    pub fn from_minutes(minutes: u32) -> Result<Self> {
        match minutes {
            15 => Ok(Interval::QUARTER_HOUR),
            60 => Ok(Interval::HOUR),
            other => Err(EngineError::invalid(format!(
                "intervalMinutes must be 15 or 60, got {other}"
            ))),
        }
    }

    pub fn hours(&self) -> f64 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        (self.hours * 60.0).round() as u32
    }
}

/// A battery's fixed physical and operating parameters.
///
/// Round-trip efficiency is decomposed symmetrically into a charge and a
/// discharge efficiency: `eta_c = eta_d = sqrt(eta)`. This differs from
/// dispatch models that take asymmetric charge/discharge efficiencies as
/// independent inputs; the symmetric decomposition is the contract this
/// crate's battery spec exposes to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub soc_initial: f64,
    eta_half: f64,
}

impl BatterySpec {
    pub fn new(
        power_kw: f64,
        energy_kwh: f64,
        soc_min: f64,
        soc_max: f64,
        soc_initial: f64,
        round_trip_efficiency: f64,
    ) -> Result<Self> {
        if power_kw < 0.0 {
            return Err(EngineError::invalid("battery.power_kw must be >= 0"));
        }
        if energy_kwh < 0.0 {
            return Err(EngineError::invalid("battery.energy_kwh must be >= 0"));
        }
        if !(0.0..=1.0).contains(&soc_min) || !(0.0..=1.0).contains(&soc_max) {
            return Err(EngineError::invalid("battery soc bounds must be in [0, 1]"));
        }
        if soc_min >= soc_max {
            return Err(EngineError::invalid("battery.soc_min must be < soc_max"));
        }
        if !(soc_min..=soc_max).contains(&soc_initial) {
            return Err(EngineError::invalid(
                "battery.soc_initial must lie within [soc_min, soc_max]",
            ));
        }
        if !(0.0..=1.0).contains(&round_trip_efficiency) || round_trip_efficiency <= 0.0 {
            return Err(EngineError::invalid(
                "battery.round_trip_efficiency must be in (0, 1]",
            ));
        }
        Ok(BatterySpec {
            power_kw,
            energy_kwh,
            soc_min,
            soc_max,
            soc_initial,
            eta_half: round_trip_efficiency.sqrt(),
        })
    }

    /// Charge efficiency, `sqrt(round_trip_efficiency)`.
    pub fn eta_charge(&self) -> f64 {
        self.eta_half
    }

    /// Discharge efficiency, `sqrt(round_trip_efficiency)`.
    pub fn eta_discharge(&self) -> f64 {
        self.eta_half
    }

    pub fn usable_capacity_kwh(&self) -> f64 {
        self.energy_kwh * (self.soc_max - self.soc_min)
    }

    pub fn soc_min_energy_kwh(&self) -> f64 {
        self.energy_kwh * self.soc_min
    }

    pub fn soc_max_energy_kwh(&self) -> f64 {
        self.energy_kwh * self.soc_max
    }

    pub fn initial_energy_kwh(&self) -> f64 {
        self.energy_kwh * self.soc_initial
    }
}

/// Import/export tariffs and an optional demand-charge rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceConfig {
    pub import_price: f64,
    pub export_price: f64,
    pub demand_charge_per_kw_year: f64,
}

impl PriceConfig {
    pub fn new(import_price: f64, export_price: f64, demand_charge_per_kw_year: f64) -> Result<Self> {
        if import_price < 0.0 || export_price < 0.0 || demand_charge_per_kw_year < 0.0 {
            return Err(EngineError::invalid("prices must be non-negative"));
        }
        Ok(PriceConfig {
            import_price,
            export_price,
            demand_charge_per_kw_year,
        })
    }
}

/// Optional per-year throughput ceilings used to flag accelerated wear.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DegradationBudget {
    pub max_efc_per_year: Option<f64>,
    pub max_throughput_mwh_per_year: Option<f64>,
}

/// The dispatch strategy and its policy-specific parameters.
///
/// A sum type rather than a dataclass-style bundle of mutually exclusive
/// optional fields: each variant carries exactly the parameters its
/// dispatch algorithm needs, so there is no runtime guard separating
/// "peak shaving fields" from "stacked fields" — the compiler does it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Policy {
    PvSurplus,
    PeakShaving { peak_limit_kw: f64 },
    Stacked { peak_limit_kw: f64, reserve_fraction: f64 },
    LoadOnly { peak_limit_kw: f64 },
}

impl Policy {
    pub fn validate(&self, battery: &BatterySpec) -> Result<()> {
        match *self {
            Policy::PvSurplus => Ok(()),
            Policy::PeakShaving { peak_limit_kw } | Policy::LoadOnly { peak_limit_kw } => {
                if peak_limit_kw <= 0.0 {
                    Err(EngineError::invalid("peak_limit_kw must be > 0"))
                } else {
                    Ok(())
                }
            }
            Policy::Stacked {
                peak_limit_kw,
                reserve_fraction,
            } => {
                if peak_limit_kw <= 0.0 {
                    return Err(EngineError::invalid("peak_limit_kw must be > 0"));
                }
                let band = battery.soc_max - battery.soc_min;
                if !(0.0..=band).contains(&reserve_fraction) {
                    return Err(EngineError::invalid(
                        "stacked.reserve_fraction must lie within [0, soc_max - soc_min]",
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::PvSurplus => "PV_SURPLUS",
            Policy::PeakShaving { .. } => "PEAK_SHAVING",
            Policy::Stacked { .. } => "STACKED",
            Policy::LoadOnly { .. } => "LOAD_ONLY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_accepts_only_15_or_60_minutes() {
        assert_eq!(Interval::from_minutes(15).unwrap().hours(), 0.25);
        assert_eq!(Interval::from_minutes(60).unwrap().hours(), 1.0);
        assert!(Interval::from_minutes(30).is_err());
    }

    #[test]
    fn battery_spec_decomposes_round_trip_efficiency_symmetrically() {
        let b = BatterySpec::new(100.0, 400.0, 0.1, 0.9, 0.5, 0.81).unwrap();
        assert!((b.eta_charge() - 0.9).abs() < 1e-9);
        assert!((b.eta_discharge() - 0.9).abs() < 1e-9);
        assert!((b.usable_capacity_kwh() - 320.0).abs() < 1e-9);
    }

    #[test]
    fn battery_spec_rejects_bad_soc_bounds() {
        assert!(BatterySpec::new(100.0, 400.0, 0.9, 0.1, 0.5, 0.9).is_err());
        assert!(BatterySpec::new(100.0, 400.0, 0.1, 0.9, 0.95, 0.9).is_err());
    }

    #[test]
    fn stacked_policy_validates_reserve_fraction_against_band() {
        let b = BatterySpec::new(100.0, 400.0, 0.1, 0.9, 0.5, 0.9).unwrap();
        let ok = Policy::Stacked {
            peak_limit_kw: 50.0,
            reserve_fraction: 0.3,
        };
        assert!(ok.validate(&b).is_ok());
        let bad = Policy::Stacked {
            peak_limit_kw: 50.0,
            reserve_fraction: 0.9,
        };
        assert!(bad.validate(&b).is_err());
    }
}
