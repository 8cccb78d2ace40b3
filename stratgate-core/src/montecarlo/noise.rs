//! Noise robustness — re-run the strategy on perturbed price data.
//!
//! Unlike the resampling tests, this one needs the real backtester: each run
//! injects a fresh noise seed into the request and the executor replays the
//! strategy on the perturbed series. A strategy whose edge survives small
//! price jitter stays profitable in most runs; one fit to exact historical
//! ticks does not. Runs are sequential because executors own the backtest
//! engine and are not assumed thread-safe.

use serde::{Deserialize, Serialize};

use super::{CancelFlag, DistributionSummary, McError};
use crate::executor::{BacktestExecutor, BacktestRequest, FailureKind, NoisePerturbation};

/// Configuration for noise-robustness runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Number of perturbed re-runs (default 100; each one is a full backtest).
    pub n_runs: usize,
    /// Maximum relative price perturbation, e.g. 0.10 for ±10%.
    pub perturbation_pct: f64,
    pub seed: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            n_runs: 100,
            perturbation_pct: 0.10,
            seed: 42,
        }
    }
}

/// Outcome of the noise-robustness battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseRobustness {
    /// Fraction of perturbed runs that ended with a positive total return.
    pub profitable_fraction: f64,
    pub sharpe: DistributionSummary,
    pub n_completed: usize,
}

/// Run the strategy `n_runs` times on noise-perturbed data.
///
/// Individual run failures are tolerated (the perturbation can push a
/// strategy into taking no trades at all); the fraction is computed over
/// completed runs. An all-failed battery is an error.
pub fn run_noise_robustness<E: BacktestExecutor + ?Sized>(
    executor: &E,
    base_request: &BacktestRequest,
    config: &NoiseConfig,
    cancel: &CancelFlag,
) -> Result<NoiseRobustness, McError> {
    let mut sharpes = Vec::with_capacity(config.n_runs);
    let mut profitable = 0usize;
    let mut completed = 0usize;

    for i in 0..config.n_runs {
        if cancel.is_cancelled() {
            return Err(McError::Cancelled {
                completed: i,
                requested: config.n_runs,
            });
        }
        let request = base_request.clone().with_noise(NoisePerturbation {
            perturbation_pct: config.perturbation_pct,
            seed: config.seed.wrapping_add(i as u64),
        });
        match executor.run(&request) {
            Ok(report) => {
                completed += 1;
                if report.summary.total_return > 0.0 {
                    profitable += 1;
                }
                sharpes.push(report.summary.sharpe_ratio);
            }
            Err(f) if f.kind == FailureKind::DataMissing => {
                // Noise cannot create or destroy data files; this is a real
                // environment problem, not a robustness signal.
                return Err(McError::Execution(f.to_string()));
            }
            Err(_) => {}
        }
    }

    if completed == 0 {
        return Err(McError::Execution(
            "every noise run failed to execute".into(),
        ));
    }

    Ok(NoiseRobustness {
        profitable_fraction: profitable as f64 / completed as f64,
        sharpe: DistributionSummary::from_samples(sharpes),
        n_completed: completed,
    })
}
