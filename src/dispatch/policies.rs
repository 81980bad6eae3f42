//! Per-step dispatch algorithms for each of the four policies.
//!
//! Each function is a pure step transition: given the instantaneous PV and
//! load power, the battery spec, the timestep length, and the battery's
//! current stored energy, it returns the step's power flows together with
//! the battery's stored energy *after* the step. The caller (the engine
//! loop in `dispatch::mod`) owns the sequencing; nothing here depends on
//! `t` directly, which keeps every policy trivially testable in isolation.

use crate::types::{BatterySpec, Policy};

/// Non-negative power/energy flows produced by a single dispatch step.
///
/// All fields are kW-scale instantaneous powers except where noted; the
/// caller multiplies by `dt_hours` to get per-step energy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepFlows {
    pub direct_pv: f64,
    pub charge: f64,
    pub discharge_total: f64,
    pub discharge_peak: f64,
    pub discharge_pv: f64,
    pub charge_from_pv: f64,
    pub charge_from_grid: f64,
    pub grid_import: f64,
    pub grid_export: f64,
    pub curtailment: f64,
}

/// `(charge_headroom_kw, discharge_headroom_kw)` implied by SOC bounds
/// `[floor_energy_kwh, battery.soc_max_energy_kwh()]` at the given stored
/// energy, converted through the battery's efficiencies. `floor_energy_kwh`
/// lets STACKED restrict discharge to the reserve-protected band while
/// still charging to the full ceiling.
fn soc_headroom_kw(
    battery: &BatterySpec,
    stored_kwh: f64,
    floor_energy_kwh: f64,
    dt_hours: f64,
) -> (f64, f64) {
    let charge_headroom = (battery.soc_max_energy_kwh() - stored_kwh).max(0.0);
    let discharge_headroom = (stored_kwh - floor_energy_kwh).max(0.0);
    let max_charge_kw = charge_headroom / (battery.eta_charge() * dt_hours);
    let max_discharge_kw = discharge_headroom * battery.eta_discharge() / dt_hours;
    (max_charge_kw, max_discharge_kw)
}

fn apply_charge(battery: &BatterySpec, stored_kwh: f64, charge_kw: f64, dt_hours: f64) -> f64 {
    stored_kwh + battery.eta_charge() * dt_hours * charge_kw
}

fn apply_discharge(battery: &BatterySpec, stored_kwh: f64, discharge_kw: f64, dt_hours: f64) -> f64 {
    stored_kwh - dt_hours * discharge_kw / battery.eta_discharge()
}

fn clamp_to_band(battery: &BatterySpec, stored_kwh: f64) -> f64 {
    stored_kwh.clamp(battery.soc_min_energy_kwh(), battery.soc_max_energy_kwh())
}

/// Returns `(flows, stored_energy_after_kwh)`.
pub fn step(
    policy: &Policy,
    battery: &BatterySpec,
    pv_kw: f64,
    load_kw: f64,
    stored_kwh: f64,
    dt_hours: f64,
) -> (StepFlows, f64) {
    match *policy {
        Policy::PvSurplus => step_pv_surplus(battery, pv_kw, load_kw, stored_kwh, dt_hours),
        Policy::PeakShaving { peak_limit_kw } => {
            step_peak_shaving(battery, pv_kw, load_kw, peak_limit_kw, stored_kwh, dt_hours)
        }
        Policy::Stacked {
            peak_limit_kw,
            reserve_fraction,
        } => step_stacked(
            battery,
            pv_kw,
            load_kw,
            peak_limit_kw,
            reserve_fraction,
            stored_kwh,
            dt_hours,
        ),
        Policy::LoadOnly { peak_limit_kw } => {
            step_load_only(battery, load_kw, peak_limit_kw, stored_kwh, dt_hours)
        }
    }
}

fn step_pv_surplus(
    battery: &BatterySpec,
    pv_kw: f64,
    load_kw: f64,
    stored_kwh: f64,
    dt_hours: f64,
) -> (StepFlows, f64) {
    let mut flows = StepFlows::default();
    let (max_charge_kw, max_discharge_kw) =
        soc_headroom_kw(battery, stored_kwh, battery.soc_min_energy_kwh(), dt_hours);

    flows.direct_pv = pv_kw.min(load_kw);
    let surplus = (pv_kw - flows.direct_pv).max(0.0);
    let deficit = (load_kw - flows.direct_pv).max(0.0);

    let mut soc = stored_kwh;
    if surplus > 0.0 {
        flows.charge = battery.power_kw.min(max_charge_kw).min(surplus);
        flows.charge_from_pv = flows.charge;
        flows.curtailment = surplus - flows.charge;
        soc = apply_charge(battery, soc, flows.charge, dt_hours);
    }
    if deficit > 0.0 {
        flows.discharge_total = battery.power_kw.min(max_discharge_kw).min(deficit);
        flows.grid_import = deficit - flows.discharge_total;
        soc = apply_discharge(battery, soc, flows.discharge_total, dt_hours);
    }
    (flows, clamp_to_band(battery, soc))
}

fn step_peak_shaving(
    battery: &BatterySpec,
    pv_kw: f64,
    load_kw: f64,
    peak_limit_kw: f64,
    stored_kwh: f64,
    dt_hours: f64,
) -> (StepFlows, f64) {
    let mut flows = StepFlows::default();
    let (max_charge_kw, max_discharge_kw) =
        soc_headroom_kw(battery, stored_kwh, battery.soc_min_energy_kwh(), dt_hours);

    flows.direct_pv = pv_kw.min(load_kw);
    let net_load = load_kw - pv_kw;
    let mut soc = stored_kwh;

    if net_load > peak_limit_kw {
        let excess = net_load - peak_limit_kw;
        flows.discharge_total = battery.power_kw.min(max_discharge_kw).min(excess);
        flows.discharge_peak = flows.discharge_total;
        flows.grid_import = net_load - flows.discharge_total;
        soc = apply_discharge(battery, soc, flows.discharge_total, dt_hours);
    } else if net_load > 0.0 {
        let headroom = peak_limit_kw - net_load;
        flows.charge = battery.power_kw.min(max_charge_kw).min(headroom);
        flows.charge_from_grid = flows.charge;
        flows.grid_import = net_load + flows.charge;
        soc = apply_charge(battery, soc, flows.charge, dt_hours);
    } else {
        flows.curtailment = -net_load;
    }
    (flows, clamp_to_band(battery, soc))
}

fn step_stacked(
    battery: &BatterySpec,
    pv_kw: f64,
    load_kw: f64,
    peak_limit_kw: f64,
    reserve_fraction: f64,
    stored_kwh: f64,
    dt_hours: f64,
) -> (StepFlows, f64) {
    let mut flows = StepFlows::default();
    let net_load = load_kw - pv_kw;
    let mut soc = stored_kwh;
    flows.direct_pv = pv_kw.min(load_kw);

    if net_load > peak_limit_kw {
        let (_, max_discharge_full) =
            soc_headroom_kw(battery, stored_kwh, battery.soc_min_energy_kwh(), dt_hours);
        let excess = net_load - peak_limit_kw;
        flows.discharge_total = battery.power_kw.min(max_discharge_full).min(excess);
        flows.discharge_peak = flows.discharge_total;
        flows.grid_import = net_load - flows.discharge_total;
        soc = apply_discharge(battery, soc, flows.discharge_total, dt_hours);
    } else if net_load < 0.0 {
        let (max_charge_full, _) =
            soc_headroom_kw(battery, stored_kwh, battery.soc_min_energy_kwh(), dt_hours);
        let surplus = -net_load;
        flows.charge = battery.power_kw.min(max_charge_full).min(surplus);
        flows.charge_from_pv = flows.charge;
        flows.curtailment = surplus - flows.charge;
        soc = apply_charge(battery, soc, flows.charge, dt_hours);
    } else {
        let reserve_floor_kwh = battery.energy_kwh * (battery.soc_min + reserve_fraction);
        let (_, max_discharge_reserved) =
            soc_headroom_kw(battery, stored_kwh, reserve_floor_kwh, dt_hours);
        let deficit = net_load;
        flows.discharge_total = battery.power_kw.min(max_discharge_reserved).min(deficit);
        flows.discharge_pv = flows.discharge_total;
        flows.grid_import = deficit - flows.discharge_total;
        soc = apply_discharge(battery, soc, flows.discharge_total, dt_hours);
    }
    (flows, clamp_to_band(battery, soc))
}

fn step_load_only(
    battery: &BatterySpec,
    load_kw: f64,
    peak_limit_kw: f64,
    stored_kwh: f64,
    dt_hours: f64,
) -> (StepFlows, f64) {
    let mut flows = StepFlows::default();
    let (max_charge_kw, max_discharge_kw) =
        soc_headroom_kw(battery, stored_kwh, battery.soc_min_energy_kwh(), dt_hours);
    let mut soc = stored_kwh;

    if load_kw > peak_limit_kw {
        let excess = load_kw - peak_limit_kw;
        flows.discharge_total = battery.power_kw.min(max_discharge_kw).min(excess);
        flows.grid_import = load_kw - flows.discharge_total;
        soc = apply_discharge(battery, soc, flows.discharge_total, dt_hours);
    } else {
        let headroom = peak_limit_kw - load_kw;
        flows.charge = battery.power_kw.min(max_charge_kw).min(headroom);
        flows.charge_from_grid = flows.charge;
        flows.grid_import = load_kw + flows.charge;
        soc = apply_charge(battery, soc, flows.charge, dt_hours);
    }
    (flows, clamp_to_band(battery, soc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> BatterySpec {
        BatterySpec::new(100.0, 400.0, 0.1, 0.9, 0.5, 0.81).unwrap()
    }

    #[test]
    fn pv_surplus_charges_from_surplus_and_discharges_for_deficit() {
        let b = battery();
        let stored = b.initial_energy_kwh();
        let (flows, soc_after) = step_pv_surplus(&b, 100.0, 50.0, stored, 1.0);
        assert_eq!(flows.direct_pv, 50.0);
        assert!(flows.charge > 0.0);
        assert_eq!(flows.discharge_total, 0.0);
        assert!(soc_after > stored);

        let (flows, soc_after) = step_pv_surplus(&b, 0.0, 50.0, stored, 1.0);
        assert_eq!(flows.direct_pv, 0.0);
        assert!(flows.discharge_total > 0.0);
        assert!(soc_after < stored);
    }

    #[test]
    fn pv_surplus_never_exports_to_grid() {
        let b = battery();
        let (flows, _) = step_pv_surplus(&b, 1000.0, 10.0, b.soc_max_energy_kwh(), 1.0);
        assert_eq!(flows.grid_export, 0.0);
        assert!(flows.curtailment > 0.0);
    }

    #[test]
    fn peak_shaving_caps_import_at_limit() {
        let b = battery();
        let stored = b.soc_max_energy_kwh();
        let (flows, _) = step_peak_shaving(&b, 0.0, 500.0, 200.0, stored, 1.0);
        assert!((flows.grid_import - 200.0).abs() < 1e-9);
        assert!((flows.discharge_total - 300.0).abs() < 1e-9);
    }

    #[test]
    fn peak_shaving_curtails_surplus_without_charging() {
        let b = battery();
        let stored = b.initial_energy_kwh();
        let (flows, soc_after) = step_peak_shaving(&b, 100.0, 10.0, 50.0, stored, 1.0);
        assert_eq!(flows.charge, 0.0);
        assert!((flows.curtailment - 90.0).abs() < 1e-9);
        assert_eq!(soc_after, stored);
    }

    #[test]
    fn stacked_discharge_for_deficit_respects_reserve_floor() {
        let b = battery();
        let reserve_floor = b.energy_kwh * (b.soc_min + 0.3);
        let (flows, soc_after) = step_stacked(&b, 0.0, 50.0, 200.0, 0.3, reserve_floor + 1.0, 1.0);
        assert!(flows.discharge_pv > 0.0);
        assert!(soc_after >= reserve_floor - 1e-6);
        assert!(flows.discharge_peak == 0.0);
    }

    #[test]
    fn stacked_peak_event_may_draw_below_reserve_floor() {
        let b = battery();
        let reserve_floor = b.energy_kwh * (b.soc_min + 0.3);
        let (flows, soc_after) = step_stacked(&b, 0.0, 500.0, 100.0, 0.3, reserve_floor + 1.0, 1.0);
        assert!(flows.discharge_peak > 0.0);
        assert!(soc_after < reserve_floor);
    }

    #[test]
    fn load_only_has_no_pv_term_and_charges_from_grid() {
        let b = battery();
        let stored = b.initial_energy_kwh();
        let (flows, soc_after) = step_load_only(&b, 50.0, 100.0, stored, 1.0);
        assert_eq!(flows.direct_pv, 0.0);
        assert!(flows.charge_from_grid > 0.0);
        assert!(soc_after > stored);
    }
}
