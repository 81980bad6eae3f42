//! Seasonality classification for guiding sizing search defaults.
//!
//! Classifies each day of a load time series as `High`, `Mid`, or `Low`
//! demand from its 95th-percentile power, smoothed and robust-standardized
//! across the period, then rolls the same banding up to calendar months.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Ordering matters: `derive(Ord)` follows declaration order, giving
/// `Low < Mid < High` directly for neighbor-strength comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    Low,
    Mid,
    High,
}

/// Non-leap-year month lengths, used only to derive a default calendar
/// mapping when the caller doesn't supply one.
const DAYS_PER_MONTH: [usize; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalityRequest {
    /// Flattened load power series, `steps_per_day` samples per day.
    pub load_kw: Vec<f64>,
    pub dt_hours: f64,
    /// Calendar month (0-11) for each day; if absent, a standard
    /// non-leap-year calendar is assumed starting on day 0 and repeating.
    pub month_index: Option<Vec<usize>>,
    pub z_high: f64,
    pub z_low: f64,
    pub min_run_len: usize,
}

impl SeasonalityRequest {
    pub fn new(load_kw: Vec<f64>, dt_hours: f64) -> Self {
        Self {
            load_kw,
            dt_hours,
            month_index: None,
            z_high: 0.7,
            z_low: -0.7,
            min_run_len: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyBand {
    pub month: usize,
    pub total_consumption_kwh: f64,
    pub band: Band,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalityResult {
    pub daily_p95_kw: Vec<f64>,
    pub daily_band: Vec<Band>,
    pub monthly: Vec<MonthlyBand>,
    pub seasonality_score: f64,
    pub detected: bool,
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
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

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    percentile_sorted(&sorted, 0.5)
}

fn mad(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

fn default_month_index(num_days: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(num_days);
    let mut day = 0usize;
    'outer: loop {
        for (month, &len) in DAYS_PER_MONTH.iter().enumerate() {
            for _ in 0..len {
                out.push(month);
                day += 1;
                if day >= num_days {
                    break 'outer;
                }
            }
        }
    }
    out
}

/// Runs the daily and monthly seasonality classification.
pub fn classify(req: &SeasonalityRequest) -> Result<SeasonalityResult> {
    if req.dt_hours != 0.25 && req.dt_hours != 1.0 {
        return Err(EngineError::invalid("dt_hours must be 0.25 or 1.0"));
    }
    if req.load_kw.iter().any(|v| *v < 0.0) {
        return Err(EngineError::invalid("load values must be non-negative"));
    }
    let steps_per_day = (24.0 / req.dt_hours).round() as usize;
    if req.load_kw.is_empty() || req.load_kw.len() % steps_per_day != 0 {
        return Err(EngineError::invalid("load series must be a whole number of days"));
    }
    let num_days = req.load_kw.len() / steps_per_day;
    if req.min_run_len == 0 {
        return Err(EngineError::invalid("min_run_len must be >= 1"));
    }

    let mut daily_p95 = Vec::with_capacity(num_days);
    for day in 0..num_days {
        let slice = &req.load_kw[day * steps_per_day..(day + 1) * steps_per_day];
        let mut sorted = slice.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        daily_p95.push(percentile_sorted(&sorted, 0.95));
    }

    // 7-day centered rolling median, window truncated at the series edges.
    let mut smoothed = Vec::with_capacity(num_days);
    for i in 0..num_days {
        let lo = i.saturating_sub(3);
        let hi = (i + 3).min(num_days - 1);
        smoothed.push(median(&daily_p95[lo..=hi]));
    }

    let global_median = median(&smoothed);
    let global_mad = mad(&smoothed, global_median);
    const EPS: f64 = 1e-9;

    let mut daily_band: Vec<Band> = smoothed
        .iter()
        .map(|v| {
            let z = (v - global_median) / (global_mad + EPS);
            if z >= req.z_high {
                Band::High
            } else if z <= req.z_low {
                Band::Low
            } else {
                Band::Mid
            }
        })
        .collect();

    clean_short_runs(&mut daily_band, req.min_run_len);

    let month_index = req
        .month_index
        .clone()
        .unwrap_or_else(|| default_month_index(num_days));
    if month_index.len() != num_days {
        return Err(EngineError::invalid("month_index must have one entry per day"));
    }

    let mut monthly_total = vec![0.0_f64; 12];
    for day in 0..num_days {
        let slice = &req.load_kw[day * steps_per_day..(day + 1) * steps_per_day];
        let day_kwh: f64 = slice.iter().sum::<f64>() * req.dt_hours;
        monthly_total[month_index[day]] += day_kwh;
    }
    let months_present: Vec<usize> = {
        let mut seen: Vec<usize> = month_index.clone();
        seen.sort_unstable();
        seen.dedup();
        seen
    };
    let annual_mean = monthly_total.iter().sum::<f64>() / months_present.len().max(1) as f64;

    let monthly: Vec<MonthlyBand> = months_present
        .into_iter()
        .map(|m| {
            let total = monthly_total[m];
            let band = if total > 1.15 * annual_mean {
                Band::High
            } else if total < 0.85 * annual_mean {
                Band::Low
            } else {
                Band::Mid
            };
            MonthlyBand { month: m, total_consumption_kwh: total, band }
        })
        .collect();

    let non_mid_days = daily_band.iter().filter(|b| !matches!(b, Band::Mid)).count();
    let seasonality_score = non_mid_days as f64 / num_days as f64;
    let detected = seasonality_score >= 0.3;

    Ok(SeasonalityResult {
        daily_p95_kw: daily_p95,
        daily_band,
        monthly,
        seasonality_score,
        detected,
    })
}

/// Absorbs runs shorter than `min_run_len` into the stronger of their two
/// neighboring runs (`Low < Mid < High`); a run at either edge of the series
/// with only one neighbor takes that neighbor's band.
fn clean_short_runs(bands: &mut [Band], min_run_len: usize) {
    loop {
        let runs = run_boundaries(bands);
        let mut changed = false;
        for (start, end, band) in &runs {
            let len = end - start;
            if len >= min_run_len || runs.len() == 1 {
                continue;
            }
            let left = if *start > 0 { Some(bands[*start - 1]) } else { None };
            let right = if *end < bands.len() { Some(bands[*end]) } else { None };
            let replacement = match (left, right) {
                (Some(l), Some(r)) => l.max(r),
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (None, None) => *band,
            };
            if replacement != *band {
                for b in bands.iter_mut().take(*end).skip(*start) {
                    *b = replacement;
                }
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn run_boundaries(bands: &[Band]) -> Vec<(usize, usize, Band)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=bands.len() {
        if i == bands.len() || bands[i] != bands[start] {
            runs.push((start, i, bands[start]));
            start = i;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_series(days: usize, steps_per_day: usize, kw: f64) -> Vec<f64> {
        vec![kw; days * steps_per_day]
    }

    #[test]
    fn flat_load_has_no_seasonality() {
        let req = SeasonalityRequest::new(flat_series(60, 24, 10.0), 1.0);
        let result = classify(&req).unwrap();
        assert!(result.daily_band.iter().all(|b| matches!(b, Band::Mid)));
        assert!(!result.detected);
    }

    #[test]
    fn summer_peak_is_classified_high() {
        let mut series = flat_series(120, 24, 10.0);
        // Days 40..80 run hot (summer peak).
        for day in 40..80 {
            for step in 0..24 {
                series[day * 24 + step] = 30.0;
            }
        }
        let req = SeasonalityRequest::new(series, 1.0);
        let result = classify(&req).unwrap();
        assert!(result.daily_band[60] == Band::High);
        assert!(result.seasonality_score > 0.0);
    }

    #[test]
    fn short_runs_are_absorbed_into_stronger_neighbor() {
        let mut bands = vec![Band::High; 20];
        bands[10] = Band::Low; // a single-day dip inside a High run
        clean_short_runs(&mut bands, 10);
        assert!(bands.iter().all(|b| *b == Band::High));
    }

    #[test]
    fn rejects_series_not_a_whole_number_of_days() {
        let req = SeasonalityRequest::new(vec![1.0; 25], 1.0);
        assert!(classify(&req).is_err());
    }

    #[test]
    fn monthly_bands_cover_every_month_present() {
        let req = SeasonalityRequest::new(flat_series(365, 24, 10.0), 1.0);
        let result = classify(&req).unwrap();
        assert_eq!(result.monthly.len(), 12);
        assert!(result.monthly.iter().all(|m| matches!(m.band, Band::Mid)));
    }
}
