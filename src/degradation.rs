//! Throughput, equivalent-full-cycle, and budget accounting for a dispatch run.

use crate::types::DegradationBudget;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a dispatch run's throughput compares against an optional budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationStatus {
    Ok,
    Warning,
    Exceeded,
}

impl fmt::Display for DegradationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradationStatus::Ok => write!(f, "OK"),
            DegradationStatus::Warning => write!(f, "WARNING"),
            DegradationStatus::Exceeded => write!(f, "EXCEEDED"),
        }
    }
}

/// Per-service throughput split, populated only for the STACKED policy;
/// both fields are zero for every other policy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceSplit {
    pub peak_shaving_mwh: f64,
    pub pv_shifting_mwh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationMetrics {
    pub throughput_mwh: f64,
    pub equivalent_full_cycles: f64,
    pub service_split: ServiceSplit,
    pub utilization_pct: f64,
    pub status: DegradationStatus,
    pub warning: Option<&'static str>,
}

impl fmt::Display for DegradationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degradation: {:.2} MWh throughput, {:.2} EFC, status={} ({:.0}% of budget)",
            self.throughput_mwh, self.equivalent_full_cycles, self.status, self.utilization_pct
        )
    }
}

/// Computes throughput/EFC and, when a budget is supplied, its utilization
/// and status. `status` rises from `Ok` (<=90%) through `Warning` (90-100%)
/// to `Exceeded` (>100%); with no budget, utilization is always 0 and
/// status is always `Ok`.
pub fn assess(
    total_charge_kwh: f64,
    total_discharge_kwh: f64,
    usable_capacity_kwh: f64,
    service_split: ServiceSplit,
    budget: Option<DegradationBudget>,
) -> DegradationMetrics {
    let throughput_mwh = (total_charge_kwh + total_discharge_kwh) / 1000.0;
    let equivalent_full_cycles = if usable_capacity_kwh > 0.0 {
        total_discharge_kwh / usable_capacity_kwh
    } else {
        0.0
    };

    let mut utilization_pct = 0.0_f64;
    if let Some(budget) = budget {
        if let Some(max_efc) = budget.max_efc_per_year {
            if max_efc > 0.0 {
                utilization_pct = utilization_pct.max(equivalent_full_cycles / max_efc * 100.0);
            }
        }
        if let Some(max_mwh) = budget.max_throughput_mwh_per_year {
            if max_mwh > 0.0 {
                utilization_pct = utilization_pct.max(throughput_mwh / max_mwh * 100.0);
            }
        }
    }

    let (status, warning) = if utilization_pct > 100.0 {
        (
            DegradationStatus::Exceeded,
            Some("degradation budget exceeded for the analyzed period"),
        )
    } else if utilization_pct > 90.0 {
        (
            DegradationStatus::Warning,
            Some("degradation budget utilization above 90%"),
        )
    } else {
        (DegradationStatus::Ok, None)
    };

    DegradationMetrics {
        throughput_mwh,
        equivalent_full_cycles,
        service_split,
        utilization_pct,
        status,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_budget_is_always_ok() {
        let m = assess(1000.0, 1000.0, 400.0, ServiceSplit::default(), None);
        assert_eq!(m.status, DegradationStatus::Ok);
        assert_eq!(m.utilization_pct, 0.0);
    }

    #[test]
    fn exceeding_max_efc_reports_exceeded() {
        let budget = DegradationBudget {
            max_efc_per_year: Some(100.0),
            max_throughput_mwh_per_year: None,
        };
        let m = assess(0.0, 40_100.0, 400.0, ServiceSplit::default(), Some(budget));
        assert_eq!(m.status, DegradationStatus::Exceeded);
        assert!(m.warning.is_some());
    }

    #[test]
    fn ninety_to_hundred_percent_is_warning() {
        let budget = DegradationBudget {
            max_efc_per_year: Some(100.0),
            max_throughput_mwh_per_year: None,
        };
        let m = assess(0.0, 38_000.0, 400.0, ServiceSplit::default(), Some(budget));
        assert_eq!(m.status, DegradationStatus::Warning);
    }

    #[test]
    fn utilization_is_max_across_both_budgeted_quantities() {
        let budget = DegradationBudget {
            max_efc_per_year: Some(1000.0),
            max_throughput_mwh_per_year: Some(1.0),
        };
        let m = assess(600.0, 600.0, 400.0, ServiceSplit::default(), Some(budget));
        assert_eq!(m.status, DegradationStatus::Exceeded);
    }
}
