//! Performance metrics — pure functions over equity paths and trade P&L.
//!
//! Every function is side-effect free: sequence in, scalar out. The Monte
//! Carlo battery calls these once per resample, so they must be cheap and
//! must never panic on degenerate input.

/// Step returns of an equity path: (e[i+1] - e[i]) / e[i].
pub fn path_returns(equity_path: &[f64]) -> Vec<f64> {
    if equity_path.len() < 2 {
        return Vec::new();
    }
    equity_path
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Reconstruct an equity path from a trade P&L sequence.
///
/// The path has `pnls.len() + 1` points starting at `initial_equity`. This is
/// what makes trade order matter: returns compound against running equity.
pub fn equity_path_from_pnls(pnls: &[f64], initial_equity: f64) -> Vec<f64> {
    let mut path = Vec::with_capacity(pnls.len() + 1);
    let mut equity = initial_equity;
    path.push(equity);
    for &pnl in pnls {
        equity += pnl;
        path.push(equity);
    }
    path
}

/// Annualized Sharpe ratio of an equity path.
///
/// Sharpe = mean(step returns) / std(step returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 3 path points.
pub fn path_sharpe(equity_path: &[f64]) -> f64 {
    let returns = path_returns(equity_path);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean(&returns);
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * (252.0_f64).sqrt()
}

/// Maximum drawdown of an equity path as a positive fraction.
///
/// 0.15 means a 15% peak-to-trough decline. Returns 0.0 for constant or
/// monotonically increasing paths.
pub fn max_drawdown(equity_path: &[f64]) -> f64 {
    if equity_path.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_path[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity_path {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (peak - eq) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Fraction of values with pnl > 0.
pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let winners = pnls.iter().filter(|&&p| p > 0.0).count();
    winners as f64 / pnls.len() as f64
}

/// Total return of a path: (final - initial) / initial.
pub fn total_return(equity_path: &[f64]) -> f64 {
    match (equity_path.first(), equity_path.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

// ─── Moment helpers ─────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Sample skewness (third standardized moment, biased estimator).
///
/// Returns 0.0 for fewer than 3 values or zero variance.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let n_f = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n_f;
    if m2 < 1e-30 {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n_f;
    m3 / m2.powf(1.5)
}

/// Sample kurtosis (fourth standardized moment, biased estimator).
///
/// Normal distribution has kurtosis 3.0. Returns 3.0 for fewer than 4 values
/// or zero variance, so degenerate inputs behave as Gaussian in the PSR
/// denominator.
pub fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return 3.0;
    }
    let m = mean(values);
    let n_f = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n_f;
    if m2 < 1e-30 {
        return 3.0;
    }
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n_f;
    m4 / (m2 * m2)
}

/// Percentile of unsorted values via linear interpolation, p in [0, 100].
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, p)
}

/// Percentile of a sorted slice via linear interpolation, p in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Path construction ──

    #[test]
    fn equity_path_basic() {
        let path = equity_path_from_pnls(&[100.0, -50.0, 25.0], 1000.0);
        assert_eq!(path, vec![1000.0, 1100.0, 1050.0, 1075.0]);
    }

    #[test]
    fn equity_path_empty() {
        assert_eq!(equity_path_from_pnls(&[], 1000.0), vec![1000.0]);
    }

    #[test]
    fn path_returns_basic() {
        let r = path_returns(&[100.0, 110.0, 105.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.1).abs() < 1e-12);
        assert!((r[1] - (105.0 - 110.0) / 110.0).abs() < 1e-12);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_constant_path_is_zero() {
        assert_eq!(path_sharpe(&[100.0; 50]), 0.0);
    }

    #[test]
    fn sharpe_positive_for_uptrend_with_noise() {
        let mut path = vec![100_000.0];
        for i in 1..200 {
            let r = if i % 3 == 0 { 0.998 } else { 1.002 };
            path.push(path[i - 1] * r);
        }
        assert!(path_sharpe(&path) > 0.0);
    }

    #[test]
    fn sharpe_order_sensitive_through_compounding() {
        // Same P&L values, different order: compounding makes Sharpe differ.
        let a = equity_path_from_pnls(&[500.0, -400.0, 500.0, -400.0, 500.0], 10_000.0);
        let b = equity_path_from_pnls(&[500.0, 500.0, 500.0, -400.0, -400.0], 10_000.0);
        assert!((path_sharpe(&a) - path_sharpe(&b)).abs() > 1e-9);
    }

    // ── Drawdown ──

    #[test]
    fn drawdown_known_value() {
        let dd = max_drawdown(&[100.0, 110.0, 90.0, 95.0]);
        assert!((dd - (110.0 - 90.0) / 110.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_monotonic_is_zero() {
        let path: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        assert_eq!(max_drawdown(&path), 0.0);
    }

    #[test]
    fn drawdown_is_positive_fraction() {
        let dd = max_drawdown(&[100.0, 50.0]);
        assert!((dd - 0.5).abs() < 1e-12);
        assert!(dd >= 0.0);
    }

    // ── Win rate / total return ──

    #[test]
    fn win_rate_mixed() {
        assert!((win_rate(&[1.0, -1.0, 2.0, -2.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn win_rate_zero_pnl_not_a_win() {
        assert_eq!(win_rate(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[100.0, 110.0]) - 0.1).abs() < 1e-12);
    }

    // ── Moments ──

    #[test]
    fn skewness_symmetric_is_zero() {
        let values = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(skewness(&values).abs() < 1e-12);
    }

    #[test]
    fn skewness_right_tail_positive() {
        let values = vec![1.0, 1.0, 1.0, 1.0, 10.0];
        assert!(skewness(&values) > 0.0);
    }

    #[test]
    fn kurtosis_degenerate_is_gaussian() {
        assert_eq!(kurtosis(&[1.0, 1.0]), 3.0);
        assert_eq!(kurtosis(&[5.0; 10]), 3.0);
    }

    #[test]
    fn kurtosis_heavy_tails_above_three() {
        // Mostly small values with rare large outliers: leptokurtic.
        let mut values = vec![0.0; 96];
        values.extend_from_slice(&[10.0, -10.0, 10.0, -10.0]);
        assert!(kurtosis(&values) > 3.0);
    }

    // ── Percentiles ──

    #[test]
    fn percentile_endpoints() {
        let values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
    }

    #[test]
    fn percentile_interpolates() {
        let values = vec![0.0, 10.0];
        assert!((percentile(&values, 75.0) - 7.5).abs() < 1e-12);
    }

    #[test]
    fn percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
