//! Confidence-adjusted Sharpe statistics and parameter-plateau analysis.
//!
//! Implements from first principles:
//! - Normal CDF via the Abramowitz-Stegun erf approximation
//! - Inverse normal CDF via the Acklam rational approximation
//! - Probabilistic Sharpe Ratio (PSR)
//! - Deflated Sharpe Ratio (DSR) with expected-maximum benchmark
//! - Minimum Track Record Length (MinTRL)
//! - Walk-Forward Efficiency (WFE)
//! - Plateau width ratio for 1-D parameter sweeps
//!
//! Every function returns a typed error on precondition failure. Nothing here
//! is ever silently coerced to 0 or NaN; a failed metric aborts the enclosing
//! decision upstream.

use thiserror::Error;

/// Euler-Mascheroni constant, used by the expected-maximum-Sharpe benchmark.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Precondition failures from statistical computations.
#[derive(Debug, Error, PartialEq)]
pub enum StatError {
    #[error("insufficient sample: {got} observations < minimum {min}")]
    InsufficientSample { got: usize, min: usize },
    #[error("PSR denominator non-positive ({0:.6}); skew/kurtosis inconsistent with Sharpe")]
    NonPositiveDenominator(f64),
    #[error("walk-forward efficiency undefined: train Sharpe is zero")]
    ZeroTrainSharpe,
    #[error("deflated Sharpe requires trials_count >= 1, got {0}")]
    NoTrials(usize),
    #[error("track record target unreachable: observed Sharpe {observed:.4} <= benchmark {benchmark:.4}")]
    TargetUnreachable { observed: f64, benchmark: f64 },
    #[error("target confidence {0} outside (0, 1)")]
    BadConfidence(f64),
    #[error("plateau undefined: sweep has {0} points, need at least 3")]
    SweepTooSmall(usize),
    #[error("plateau undefined: peak objective {0:.6} is not positive")]
    NonPositivePeak(f64),
    #[error("plateau undefined: optimum parameter value is zero")]
    ZeroOptimumParam,
}

// ─── Normal distribution primitives ─────────────────────────────────

/// Standard normal CDF Φ(x).
///
/// Uses erf via Abramowitz & Stegun 7.1.26 (max abs error ~1.5e-7), which is
/// ample for gate thresholds quoted to two decimals.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Inverse standard normal CDF Φ⁻¹(p), p in (0, 1).
///
/// Acklam's rational approximation (relative error < 1.15e-9).
pub fn norm_inv(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0, "norm_inv requires p in (0, 1)");

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

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
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

// ─── Probabilistic / Deflated Sharpe ────────────────────────────────

/// Probabilistic Sharpe Ratio: confidence that the true Sharpe exceeds
/// `benchmark`, given sample size and return non-normality.
///
/// `PSR = Φ((ŜR - SR*) · √(n-1) / √(1 - γ3·ŜR + (γ4-1)/4 · ŜR²))`
///
/// `kurtosis` is the full fourth standardized moment (Gaussian = 3.0).
pub fn probabilistic_sharpe_ratio(
    observed_sharpe: f64,
    benchmark: f64,
    n: usize,
    skew: f64,
    kurtosis: f64,
) -> Result<f64, StatError> {
    if n < 2 {
        return Err(StatError::InsufficientSample { got: n, min: 2 });
    }
    let sr = observed_sharpe;
    let denom_sq = 1.0 - skew * sr + (kurtosis - 1.0) / 4.0 * sr * sr;
    if denom_sq <= 0.0 {
        return Err(StatError::NonPositiveDenominator(denom_sq));
    }
    let z = (sr - benchmark) * ((n - 1) as f64).sqrt() / denom_sq.sqrt();
    Ok(norm_cdf(z))
}

/// Expected maximum Sharpe among `trials` independent trials with Sharpe
/// estimate variance `sharpe_variance`.
///
/// `SR* = √V · ((1-γ)·Φ⁻¹(1 - 1/T) + γ·Φ⁻¹(1 - 1/(T·e)))`
///
/// For a single trial there is no selection effect; returns 0.0.
pub fn expected_max_sharpe(trials: usize, sharpe_variance: f64) -> Result<f64, StatError> {
    if trials == 0 {
        return Err(StatError::NoTrials(trials));
    }
    if trials == 1 || sharpe_variance <= 0.0 {
        return Ok(0.0);
    }
    let t = trials as f64;
    let z1 = norm_inv(1.0 - 1.0 / t);
    let z2 = norm_inv(1.0 - 1.0 / (t * std::f64::consts::E));
    Ok(sharpe_variance.sqrt() * ((1.0 - EULER_GAMMA) * z1 + EULER_GAMMA * z2))
}

/// Deflated Sharpe Ratio: PSR measured against the expected maximum Sharpe
/// from `trials` parameter combinations, correcting for multiple testing.
///
/// Callers who do not know the true trial count must supply a conservative
/// estimate (the number of optimization combinations evaluated).
pub fn deflated_sharpe_ratio(
    observed_sharpe: f64,
    n: usize,
    skew: f64,
    kurtosis: f64,
    trials: usize,
    sharpe_variance: f64,
) -> Result<f64, StatError> {
    let benchmark = expected_max_sharpe(trials, sharpe_variance)?;
    probabilistic_sharpe_ratio(observed_sharpe, benchmark, n, skew, kurtosis)
}

/// Minimum Track Record Length: smallest number of observations such that
/// PSR(n) reaches `target_confidence`.
///
/// Closed form: `n* = 1 + (1 - γ3·ŜR + (γ4-1)/4·ŜR²) · (Z_c / (ŜR - SR*))²`,
/// rounded up. The unit is observations of the same frequency the Sharpe was
/// estimated from (trades, for trade-level reports).
pub fn min_track_record_length(
    observed_sharpe: f64,
    benchmark: f64,
    skew: f64,
    kurtosis: f64,
    target_confidence: f64,
) -> Result<usize, StatError> {
    if !(0.0 < target_confidence && target_confidence < 1.0) {
        return Err(StatError::BadConfidence(target_confidence));
    }
    if observed_sharpe <= benchmark {
        return Err(StatError::TargetUnreachable {
            observed: observed_sharpe,
            benchmark,
        });
    }
    let sr = observed_sharpe;
    let denom_sq = 1.0 - skew * sr + (kurtosis - 1.0) / 4.0 * sr * sr;
    if denom_sq <= 0.0 {
        return Err(StatError::NonPositiveDenominator(denom_sq));
    }
    let z = norm_inv(target_confidence);
    let n = 1.0 + denom_sq * (z / (sr - benchmark)).powi(2);
    Ok(n.ceil() as usize)
}

/// Walk-Forward Efficiency: out-of-sample Sharpe divided by in-sample Sharpe.
pub fn walk_forward_efficiency(test_sharpe: f64, train_sharpe: f64) -> Result<f64, StatError> {
    if train_sharpe == 0.0 {
        return Err(StatError::ZeroTrainSharpe);
    }
    Ok(test_sharpe / train_sharpe)
}

// ─── Parameter plateau ──────────────────────────────────────────────

/// Plateau width ratio of a 1-D parameter sweep.
///
/// Finds the contiguous parameter range around the global optimum whose
/// objective stays within `tolerance` of the peak (e.g. 0.9 keeps points at
/// >= 90% of peak), and returns `(param_max - param_min) / optimum_param`.
/// When disjoint bands tie, the one containing the global optimum wins by
/// construction. Wide plateau = parameter-insensitive = less likely overfit.
pub fn plateau_width_ratio(sweep: &[(f64, f64)], tolerance: f64) -> Result<f64, StatError> {
    if sweep.len() < 3 {
        return Err(StatError::SweepTooSmall(sweep.len()));
    }

    let mut points = sweep.to_vec();
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let opt_idx = points
        .iter()
        .enumerate()
        .max_by(|a, b| {
            a.1 .1
                .partial_cmp(&b.1 .1)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let (opt_param, peak) = points[opt_idx];
    if peak <= 0.0 {
        return Err(StatError::NonPositivePeak(peak));
    }
    if opt_param == 0.0 {
        return Err(StatError::ZeroOptimumParam);
    }

    let band = tolerance * peak;

    let mut lo = opt_idx;
    while lo > 0 && points[lo - 1].1 >= band {
        lo -= 1;
    }
    let mut hi = opt_idx;
    while hi + 1 < points.len() && points[hi + 1].1 >= band {
        hi += 1;
    }

    Ok((points[hi].0 - points[lo].0) / opt_param.abs())
}
