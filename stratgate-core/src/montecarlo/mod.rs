//! Monte Carlo battery — resampling tests over trade sequences.
//!
//! Five independent tests, each scoring resamples with the pure functions in
//! `metrics`/`stats` and aggregating into a `DistributionSummary`:
//!
//! 1. **bootstrap** — trade-level sampling with replacement; tail-risk
//!    drawdown estimate.
//! 2. **permutation** — trade-order shuffling; sequential-edge p-value.
//! 3. **regime** — block resampling; consistency across regime orderings.
//! 4. **cpcv** — combinatorial purged cross-validation; leakage-free
//!    out-of-sample Sharpe.
//! 5. **noise** — price perturbation through the external executor.
//!
//! Every sample is independent and side-effect free; loops run on rayon with
//! one seeded `StdRng` per sample index, so results are deterministic for a
//! fixed seed regardless of thread scheduling. A cancelled batch returns
//! `McError::Cancelled` and its partial aggregates are dropped as a unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{mean, percentile_sorted, std_dev};
use crate::stats::StatError;

pub mod bootstrap;
pub mod cpcv;
pub mod noise;
pub mod permutation;
pub mod regime;

pub use bootstrap::{run_trade_bootstrap, BootstrapConfig, BootstrapDistributions};
pub use cpcv::{run_cpcv, CpcvConfig, CpcvResult, SplitResult};
pub use noise::{run_noise_robustness, NoiseConfig, NoiseRobustness};
pub use permutation::{run_permutation_test, PermutationConfig, PermutationResult};
pub use regime::{run_block_randomization, RegimeConfig, RegimeConsistency};

/// Errors from Monte Carlo batches.
#[derive(Debug, Error)]
pub enum McError {
    #[error("insufficient trades: {got} < minimum {min}")]
    InsufficientTrades { got: usize, min: usize },
    #[error("batch cancelled after {completed} of {requested} samples")]
    Cancelled { completed: usize, requested: usize },
    #[error("degenerate sample distribution: {0}")]
    Degenerate(String),
    #[error("cross-validation split infeasible: {0}")]
    SplitInfeasible(String),
    #[error(transparent)]
    Stat(#[from] StatError),
    #[error("external execution failed: {0}")]
    Execution(String),
}

/// Cooperative cancellation flag shared with a running batch.
///
/// Cheap to clone; checked once per sample. Cancellation discards the whole
/// batch rather than returning a truncated distribution.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a metric distribution across resamples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionSummary {
    pub mean: f64,
    pub std: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    /// Raw per-sample values, kept for audit and visualization.
    pub raw_samples: Vec<f64>,
}

impl DistributionSummary {
    pub fn from_samples(samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
                p10: 0.0,
                p25: 0.0,
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                raw_samples: samples,
            };
        }
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            mean: mean(&samples),
            std: std_dev(&samples),
            p10: percentile_sorted(&sorted, 10.0),
            p25: percentile_sorted(&sorted, 25.0),
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            raw_samples: samples,
        }
    }

    /// Arbitrary percentile of the sample set, p in [0, 100].
    pub fn percentile(&self, p: f64) -> f64 {
        let mut sorted = self.raw_samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        percentile_sorted(&sorted, p)
    }

    /// Coefficient of variation: std / |mean|.
    ///
    /// Returns an error when the mean is too close to zero for the ratio to
    /// carry meaning.
    pub fn coefficient_of_variation(&self) -> Result<f64, McError> {
        if self.mean.abs() < 1e-12 {
            return Err(McError::Degenerate(
                "mean near zero; coefficient of variation undefined".into(),
            ));
        }
        Ok(self.std / self.mean.abs())
    }
}
