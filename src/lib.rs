//! PV + BESS sizing, dispatch, and risk engine.
//!
//! A pure, deterministic numerical core: given a PV generation trace, a
//! load trace, a battery specification, and an operating policy, [`dispatch`]
//! simulates hour-by-hour (or quarter-hour-by-quarter-hour) charge/discharge
//! behavior; [`economics`] turns one dispatched year into a life-cycle
//! cash-flow model; [`sizing`] searches the power/energy/duration space for
//! Pareto-optimal battery configurations; [`montecarlo`] and [`sensitivity`]
//! propagate uncertain economic inputs into risk metrics and tornado charts;
//! [`seasonality`] classifies a load profile's demand banding over a year.

/// TOML engine configuration and named presets.
pub mod config;
pub mod degradation;
pub mod dispatch;
pub mod economics;
pub mod error;
/// I/O utilities for exporting dispatch results.
pub mod io;
pub mod montecarlo;
pub mod seasonality;
pub mod sensitivity;
pub mod sizing;
pub mod types;
