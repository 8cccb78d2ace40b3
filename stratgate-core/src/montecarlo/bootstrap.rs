//! Trade-level bootstrap — tail-risk estimation by resampling with replacement.
//!
//! Draws from the trade P&L sequence (not raw returns) to preserve the
//! discrete P&L structure, reconstructs an equity path per sample, and scores
//! Sharpe and drawdown per path. The 99th-percentile drawdown is the tail
//! estimate; it routinely exceeds the single observed backtest drawdown by
//! 2-3x, which is the whole point of running it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{CancelFlag, DistributionSummary, McError};
use crate::metrics::{equity_path_from_pnls, max_drawdown, path_sharpe};

/// Configuration for the trade-level bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of resamples (default 1000, typical range 1000-10000).
    pub n_runs: usize,
    /// Minimum trades required for the resample to mean anything.
    pub min_trades: usize,
    /// RNG seed; each sample derives its own stream from `seed + index`.
    pub seed: u64,
    pub initial_equity: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_runs: 1000,
            min_trades: 10,
            seed: 42,
            initial_equity: 100_000.0,
        }
    }
}

/// Bootstrap output: full distributions plus the tail-risk headline numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapDistributions {
    pub sharpe: DistributionSummary,
    pub drawdown: DistributionSummary,
    /// 99th percentile of the bootstrap drawdown distribution.
    pub drawdown_p99: f64,
    /// Drawdown of the observed (unresampled) trade sequence.
    pub observed_drawdown: f64,
    /// `drawdown_p99 / observed_drawdown`; infinity when the observed path
    /// never drew down.
    pub drawdown_inflation: f64,
    pub n_runs: usize,
}

/// Run the trade-level bootstrap over a P&L sequence.
pub fn run_trade_bootstrap(
    pnls: &[f64],
    config: &BootstrapConfig,
    cancel: &CancelFlag,
) -> Result<BootstrapDistributions, McError> {
    if pnls.len() < config.min_trades {
        return Err(McError::InsufficientTrades {
            got: pnls.len(),
            min: config.min_trades,
        });
    }

    let n = pnls.len();
    let samples: Vec<Option<(f64, f64)>> = (0..config.n_runs)
        .into_par_iter()
        .map(|i| {
            if cancel.is_cancelled() {
                return None;
            }
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
            let mut resampled = Vec::with_capacity(n);
            for _ in 0..n {
                resampled.push(pnls[rng.gen_range(0..n)]);
            }
            let path = equity_path_from_pnls(&resampled, config.initial_equity);
            Some((path_sharpe(&path), max_drawdown(&path)))
        })
        .collect();

    let completed = samples.iter().filter(|s| s.is_some()).count();
    if completed < config.n_runs {
        return Err(McError::Cancelled {
            completed,
            requested: config.n_runs,
        });
    }

    let mut sharpes = Vec::with_capacity(config.n_runs);
    let mut drawdowns = Vec::with_capacity(config.n_runs);
    for sample in samples.into_iter().flatten() {
        sharpes.push(sample.0);
        drawdowns.push(sample.1);
    }

    let drawdown_dist = DistributionSummary::from_samples(drawdowns);
    let drawdown_p99 = drawdown_dist.percentile(99.0);

    let observed_path = equity_path_from_pnls(pnls, config.initial_equity);
    let observed_drawdown = max_drawdown(&observed_path);
    let drawdown_inflation = if observed_drawdown > 0.0 {
        drawdown_p99 / observed_drawdown
    } else {
        f64::INFINITY
    };

    Ok(BootstrapDistributions {
        sharpe: DistributionSummary::from_samples(sharpes),
        drawdown: drawdown_dist,
        drawdown_p99,
        observed_drawdown,
        drawdown_inflation,
        n_runs: config.n_runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mild-drawdown synthetic sequence: three wins then a small loss.
    fn mild_sequence(cycles: usize) -> Vec<f64> {
        let mut pnls = Vec::with_capacity(cycles * 4);
        for _ in 0..cycles {
            pnls.extend_from_slice(&[200.0, 200.0, 200.0, -100.0]);
        }
        pnls
    }

    #[test]
    fn bootstrap_too_few_trades_rejected() {
        let config = BootstrapConfig::default();
        let result = run_trade_bootstrap(&[100.0, -50.0], &config, &CancelFlag::new());
        assert!(matches!(
            result,
            Err(McError::InsufficientTrades { got: 2, min: 10 })
        ));
    }

    #[test]
    fn bootstrap_deterministic_for_seed() {
        let pnls = mild_sequence(20);
        let config = BootstrapConfig {
            n_runs: 200,
            ..Default::default()
        };
        let a = run_trade_bootstrap(&pnls, &config, &CancelFlag::new()).unwrap();
        let b = run_trade_bootstrap(&pnls, &config, &CancelFlag::new()).unwrap();
        assert_eq!(a.sharpe.raw_samples, b.sharpe.raw_samples);
        assert_eq!(a.drawdown_p99, b.drawdown_p99);
    }

    #[test]
    fn bootstrap_drawdown_inflation_property() {
        // Resampling can stack the -100 losses consecutively, so the p99
        // drawdown must exceed the observed single-path drawdown.
        let pnls = mild_sequence(25);
        let config = BootstrapConfig {
            n_runs: 1000,
            ..Default::default()
        };
        let result = run_trade_bootstrap(&pnls, &config, &CancelFlag::new()).unwrap();
        assert!(result.observed_drawdown > 0.0);
        assert!(
            result.drawdown_inflation > 1.0,
            "expected p99 drawdown above observed, got inflation {}",
            result.drawdown_inflation
        );
    }

    #[test]
    fn bootstrap_cancelled_batch_discarded() {
        let pnls = mild_sequence(20);
        let config = BootstrapConfig {
            n_runs: 500,
            ..Default::default()
        };
        let flag = CancelFlag::new();
        flag.cancel();
        let result = run_trade_bootstrap(&pnls, &config, &flag);
        assert!(matches!(result, Err(McError::Cancelled { .. })));
    }

    #[test]
    fn bootstrap_sample_count_matches_config() {
        let pnls = mild_sequence(15);
        let config = BootstrapConfig {
            n_runs: 300,
            ..Default::default()
        };
        let result = run_trade_bootstrap(&pnls, &config, &CancelFlag::new()).unwrap();
        assert_eq!(result.sharpe.raw_samples.len(), 300);
        assert_eq!(result.drawdown.raw_samples.len(), 300);
    }
}
