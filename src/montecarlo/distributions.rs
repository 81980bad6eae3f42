//! Parameter distributions, correlated sampling, and named presets.

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal, Triangular, Uniform};
use serde::{Deserialize, Serialize};

/// A single uncertain input: its base value, the shape of its uncertainty,
/// and optional hard clips applied after sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDistribution {
    pub name: String,
    pub kind: DistributionKind,
    pub base_value: f64,
    pub clip_min: Option<f64>,
    pub clip_max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DistributionKind {
    Normal { std_dev: f64 },
    LogNormal { std_dev: f64 },
    Triangular { min: f64, max: f64, mode: f64 },
    Uniform { min: f64, max: f64 },
}

impl ParameterDistribution {
    /// Standard deviation actually used, defaulting to 10% of the base
    /// value when the distribution kind doesn't carry one directly (mirrors
    /// the original Monte Carlo model's `get_effective_std_dev`).
    pub fn effective_std_dev(&self) -> f64 {
        match self.kind {
            DistributionKind::Normal { std_dev } | DistributionKind::LogNormal { std_dev } => {
                std_dev
            }
            _ => 0.1 * self.base_value.abs(),
        }
    }

    fn clip(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.clip_min {
            v = v.max(min);
        }
        if let Some(max) = self.clip_max {
            v = v.min(max);
        }
        v
    }

    /// Draws an independent sample ignoring correlations.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        let raw = match self.kind {
            DistributionKind::Normal { std_dev } => {
                Normal::new(self.base_value, std_dev).unwrap().sample(rng)
            }
            DistributionKind::LogNormal { std_dev } => {
                let sigma = (1.0 + (std_dev / self.base_value).powi(2)).ln().sqrt();
                let mu = self.base_value.ln() - 0.5 * sigma * sigma;
                LogNormal::new(mu, sigma).unwrap().sample(rng)
            }
            DistributionKind::Triangular { min, max, mode } => {
                Triangular::new(min, max, mode).unwrap().sample(rng)
            }
            DistributionKind::Uniform { min, max } => Uniform::new(min, max).unwrap().sample(rng),
        };
        self.clip(raw)
    }

    /// Inverts the target distribution's CDF at `u ∈ (0, 1)`, used when
    /// transforming correlated standard-normal draws into this
    /// distribution's space.
    pub fn inverse_cdf(&self, u: f64) -> f64 {
        let u = u.clamp(1e-12, 1.0 - 1e-12);
        let raw = match self.kind {
            DistributionKind::Normal { std_dev } => self.base_value + std_dev * standard_normal_ppf(u),
            DistributionKind::LogNormal { std_dev } => {
                let sigma = (1.0 + (std_dev / self.base_value).powi(2)).ln().sqrt();
                let mu = self.base_value.ln() - 0.5 * sigma * sigma;
                (mu + sigma * standard_normal_ppf(u)).exp()
            }
            DistributionKind::Triangular { min, max, mode } => triangular_ppf(u, min, max, mode),
            DistributionKind::Uniform { min, max } => min + u * (max - min),
        };
        self.clip(raw)
    }
}

fn triangular_ppf(u: f64, min: f64, max: f64, mode: f64) -> f64 {
    let fc = (mode - min) / (max - min);
    if u < fc {
        min + (u * (max - min) * (mode - min)).sqrt()
    } else {
        max - ((1.0 - u) * (max - min) * (max - mode)).sqrt()
    }
}

/// Acklam's rational approximation to the standard normal inverse CDF,
/// accurate to ~1.15e-9 — sufficient for Monte Carlo input transforms.
fn standard_normal_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;
    let p_high = 1.0 - P_LOW;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// `Phi(x)`, used only to map correlated standard normals to uniforms.
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 approximation, good to ~1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub i: usize,
    pub j: usize,
    pub correlation: f64,
}

/// Builds the Cholesky factor of the correlation matrix implied by
/// `pairs`, projecting to the nearest positive-semidefinite matrix by
/// eigen-clipping at `1e-8` and renormalizing to a unit diagonal when the
/// raw matrix is not already PSD. `n` is the number of parameters.
pub fn correlation_cholesky(n: usize, pairs: &[CorrelationPair]) -> Vec<Vec<f64>> {
    let mut corr = vec![vec![0.0; n]; n];
    for i in 0..n {
        corr[i][i] = 1.0;
    }
    for pair in pairs {
        if pair.i < n && pair.j < n && pair.i != pair.j {
            corr[pair.i][pair.j] = pair.correlation;
            corr[pair.j][pair.i] = pair.correlation;
        }
    }

    match cholesky(&corr) {
        Some(l) => l,
        None => {
            let fixed = nearest_psd(&corr);
            cholesky(&fixed).unwrap_or_else(|| identity(n))
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    let mut m = vec![vec![0.0; n]; n];
    for i in 0..n {
        m[i][i] = 1.0;
    }
    m
}

/// Plain Cholesky decomposition; returns `None` if the matrix is not
/// positive-definite (a negative value would appear under a square root).
fn cholesky(m: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = m.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = m[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// Symmetric-eigendecomposition via the cyclic Jacobi method, clips
/// eigenvalues to `>= 1e-8`, reconstructs, and renormalizes the diagonal
/// back to 1 — the fallback path the original Monte Carlo engine takes
/// when a supplied correlation matrix is not positive-semidefinite.
fn nearest_psd(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = m.len();
    let (eigenvalues, eigenvectors) = jacobi_eigen(m);
    let clipped: Vec<f64> = eigenvalues.iter().map(|v| v.max(1e-8)).collect();

    let mut reconstructed = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += eigenvectors[i][k] * clipped[k] * eigenvectors[j][k];
            }
            reconstructed[i][j] = sum;
        }
    }

    let mut result = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let norm = (reconstructed[i][i] * reconstructed[j][j]).sqrt();
            result[i][j] = if norm > 0.0 {
                reconstructed[i][j] / norm
            } else {
                0.0
            };
        }
    }
    for i in 0..n {
        result[i][i] = 1.0;
    }
    result
}

/// Classic cyclic Jacobi rotation eigensolver for small symmetric matrices
/// (Monte Carlo parameter counts here are single digits; an O(n^3)
/// iterative method is more than fast enough and easy to verify by hand).
fn jacobi_eigen(m: &[Vec<f64>]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = m.len();
    let mut a = m.to_vec();
    let mut v = identity(n);

    for _ in 0..100 {
        let mut off_diag_max = 0.0;
        let mut p = 0;
        let mut q = 1;
        for i in 0..n {
            for j in (i + 1)..n {
                if a[i][j].abs() > off_diag_max {
                    off_diag_max = a[i][j].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if off_diag_max < 1e-12 {
            break;
        }

        let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
        let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
        let t = if theta == 0.0 { 1.0 } else { t };
        let c = 1.0 / (1.0 + t * t).sqrt();
        let s = t * c;

        for k in 0..n {
            let a_kp = a[k][p];
            let a_kq = a[k][q];
            a[k][p] = c * a_kp - s * a_kq;
            a[k][q] = s * a_kp + c * a_kq;
        }
        for k in 0..n {
            let a_pk = a[p][k];
            let a_qk = a[q][k];
            a[p][k] = c * a_pk - s * a_qk;
            a[q][k] = s * a_pk + c * a_qk;
        }
        for k in 0..n {
            let v_kp = v[k][p];
            let v_kq = v[k][q];
            v[k][p] = c * v_kp - s * v_kq;
            v[k][q] = s * v_kp + c * v_kq;
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

/// Draws `n_params` correlated samples for one simulation trial: `z`
/// independent standard normals, `l * z` correlated standard normals,
/// `Phi(.)` to uniforms, then each parameter's inverse CDF.
pub fn sample_correlated(
    params: &[ParameterDistribution],
    cholesky_factor: &[Vec<f64>],
    rng: &mut impl Rng,
) -> Vec<f64> {
    let n = params.len();
    let z: Vec<f64> = (0..n)
        .map(|_| Normal::new(0.0, 1.0).unwrap().sample(rng))
        .collect();
    (0..n)
        .map(|i| {
            let mut correlated_z = 0.0;
            for k in 0..n {
                correlated_z += cholesky_factor[i][k] * z[k];
            }
            let u = standard_normal_cdf(correlated_z);
            params[i].inverse_cdf(u)
        })
        .collect()
}

/// Named presets for the six standard uncertain inputs, mirroring the
/// `moderate` / `conservative` / `optimistic` bundles the original Monte
/// Carlo module ships (electricity price, production factor, degradation
/// rate, investment cost, inflation rate, discount rate), each sourced
/// from publicly documented uncertainty bands (NREL, SolarGIS, FfE, IMF).
pub fn preset(name: &str, base: &PresetBaseValues) -> Option<Vec<ParameterDistribution>> {
    let pct = match name {
        "moderate" => [0.12, 0.08, 0.25, 0.08, 0.015, 0.10],
        "conservative" => [0.18, 0.12, 0.35, 0.12, 0.02, 0.15],
        "optimistic" => [0.08, 0.05, 0.15, 0.05, 0.01, 0.05],
        _ => return None,
    };
    Some(vec![
        ParameterDistribution {
            name: "electricity_price".into(),
            kind: DistributionKind::Normal {
                std_dev: pct[0] * base.electricity_price,
            },
            base_value: base.electricity_price,
            clip_min: Some(0.0),
            clip_max: None,
        },
        ParameterDistribution {
            name: "production_factor".into(),
            kind: DistributionKind::Normal {
                std_dev: pct[1] * base.production_factor,
            },
            base_value: base.production_factor,
            clip_min: Some(0.0),
            clip_max: Some(2.0),
        },
        ParameterDistribution {
            name: "degradation_rate".into(),
            kind: DistributionKind::Normal {
                std_dev: pct[2] * base.degradation_rate.max(1e-6),
            },
            base_value: base.degradation_rate,
            clip_min: Some(0.0),
            clip_max: Some(0.05),
        },
        ParameterDistribution {
            name: "investment_cost".into(),
            kind: DistributionKind::Normal {
                std_dev: pct[3] * base.investment_cost,
            },
            base_value: base.investment_cost,
            clip_min: Some(0.0),
            clip_max: None,
        },
        ParameterDistribution {
            name: "inflation_rate".into(),
            kind: DistributionKind::Normal { std_dev: pct[4] },
            base_value: base.inflation_rate,
            clip_min: Some(-0.02),
            clip_max: Some(0.15),
        },
        ParameterDistribution {
            name: "discount_rate".into(),
            kind: DistributionKind::Normal {
                std_dev: pct[5] * base.discount_rate,
            },
            base_value: base.discount_rate,
            clip_min: Some(0.0),
            clip_max: Some(0.3),
        },
    ])
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresetBaseValues {
    pub electricity_price: f64,
    pub production_factor: f64,
    pub degradation_rate: f64,
    pub investment_cost: f64,
    pub inflation_rate: f64,
    pub discount_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn cholesky_recovers_identity_for_zero_correlation() {
        let l = correlation_cholesky(3, &[]);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((l[i][j] - expected).abs() < 1e-9 || (i != j && l[i][j].abs() < 1e-9) || i < j);
            }
        }
    }

    #[test]
    fn near_psd_projection_keeps_unit_diagonal() {
        // An inconsistent (non-PSD) correlation matrix: three pairwise
        // correlations of -0.9 cannot simultaneously hold for 3 variables.
        let pairs = vec![
            CorrelationPair { i: 0, j: 1, correlation: -0.9 },
            CorrelationPair { i: 0, j: 2, correlation: -0.9 },
            CorrelationPair { i: 1, j: 2, correlation: -0.9 },
        ];
        let l = correlation_cholesky(3, &pairs);
        // reconstruct L L^T and check the diagonal is ~1
        let n = 3;
        for i in 0..n {
            let mut diag = 0.0;
            for k in 0..n {
                diag += l[i][k] * l[i][k];
            }
            assert!((diag - 1.0).abs() < 1e-6, "diag[{i}] = {diag}");
        }
    }

    #[test]
    fn inverse_cdf_round_trips_uniform_distribution() {
        let p = ParameterDistribution {
            name: "x".into(),
            kind: DistributionKind::Uniform { min: 10.0, max: 20.0 },
            base_value: 15.0,
            clip_min: None,
            clip_max: None,
        };
        assert!((p.inverse_cdf(0.5) - 15.0).abs() < 1e-6);
        assert!((p.inverse_cdf(0.0) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn sampling_is_deterministic_given_a_seed() {
        let params = vec![ParameterDistribution {
            name: "x".into(),
            kind: DistributionKind::Normal { std_dev: 1.0 },
            base_value: 0.0,
            clip_min: None,
            clip_max: None,
        }];
        let l = correlation_cholesky(1, &[]);
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        let a = sample_correlated(&params, &l, &mut rng1);
        let b = sample_correlated(&params, &l, &mut rng2);
        assert_eq!(a, b);
    }
}
