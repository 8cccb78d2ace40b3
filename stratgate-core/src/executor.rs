//! Backtest execution boundary.
//!
//! The engine never runs strategy code itself; it hands a [`BacktestRequest`]
//! to whatever implements [`BacktestExecutor`] and judges the returned
//! [`PerformanceReport`]. Tests plug in canned executors, production plugs in
//! the real backtester.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::PerformanceReport;

/// Strategy parameters keyed by name. `BTreeMap` keeps serialization and
/// audit hashes stable across runs.
pub type ParamSet = BTreeMap<String, f64>;

/// Inclusive date range a backtest should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Price-noise injection settings for a robustness run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoisePerturbation {
    /// Maximum relative perturbation applied to input prices, e.g. 0.10 for
    /// up to ±10%.
    pub perturbation_pct: f64,
    pub seed: u64,
}

/// A single backtest to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub strategy_id: String,
    pub params: ParamSet,
    pub date_range: Option<DateRange>,
    pub noise: Option<NoisePerturbation>,
}

impl BacktestRequest {
    pub fn new(strategy_id: impl Into<String>, params: ParamSet) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            params,
            date_range: None,
            noise: None,
        }
    }

    pub fn with_noise(mut self, noise: NoisePerturbation) -> Self {
        self.noise = Some(noise);
        self
    }
}

/// Why an execution failed. Retry policy keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Required market data is absent. Retrying cannot help.
    DataMissing,
    /// The strategy or harness crashed. Worth a bounded number of retries.
    RuntimeError,
    /// The run exceeded its wall-clock budget.
    Timeout,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("backtest failed ({kind:?}): {message}")]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Runs one backtest.
pub trait BacktestExecutor {
    fn run(&self, request: &BacktestRequest) -> Result<PerformanceReport, ExecutionFailure>;
}

/// Runs a parameter sweep. The default implementation runs each request
/// through [`BacktestExecutor::run`]; real backends may batch.
pub trait SweepExecutor: BacktestExecutor {
    fn sweep(
        &self,
        requests: &[BacktestRequest],
    ) -> Vec<Result<PerformanceReport, ExecutionFailure>> {
        requests.iter().map(|r| self.run(r)).collect()
    }
}

/// Cartesian parameter grid for optimization sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    /// Axis name paired with the values it sweeps over.
    pub axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self { axes: Vec::new() }
    }

    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push((name.into(), values));
        self
    }

    /// Total number of parameter combinations.
    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerate every combination in axis order.
    pub fn generate(&self) -> Vec<ParamSet> {
        let mut combos: Vec<ParamSet> = vec![ParamSet::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for &v in values {
                    let mut c = combo.clone();
                    c.insert(name.clone(), v);
                    next.push(c);
                }
            }
            combos = next;
        }
        combos
    }
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a request, retrying runtime crashes up to `fix_attempts` times.
/// `DataMissing` and `Timeout` fail immediately.
pub fn run_with_retry<E: BacktestExecutor + ?Sized>(
    executor: &E,
    request: &BacktestRequest,
    fix_attempts: usize,
) -> Result<PerformanceReport, ExecutionFailure> {
    let mut last = None;
    for _ in 0..=fix_attempts {
        match executor.run(request) {
            Ok(report) => return Ok(report),
            Err(f) if f.kind == FailureKind::RuntimeError => last = Some(f),
            Err(f) => return Err(f),
        }
    }
    Err(last.unwrap_or_else(|| {
        ExecutionFailure::new(FailureKind::RuntimeError, "no attempts made")
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyExecutor {
        calls: AtomicUsize,
        succeed_on: usize,
        kind: FailureKind,
    }

    impl BacktestExecutor for FlakyExecutor {
        fn run(&self, _request: &BacktestRequest) -> Result<PerformanceReport, ExecutionFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                Ok(PerformanceReport::default())
            } else {
                Err(ExecutionFailure::new(self.kind, "boom"))
            }
        }
    }

    #[test]
    fn grid_generates_cartesian_product() {
        let grid = ParamGrid::new()
            .axis("fast", vec![5.0, 10.0])
            .axis("slow", vec![20.0, 50.0, 100.0]);
        let combos = grid.generate();
        assert_eq!(grid.len(), 6);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0]["fast"], 5.0);
        assert_eq!(combos[0]["slow"], 20.0);
        assert_eq!(combos[5]["fast"], 10.0);
        assert_eq!(combos[5]["slow"], 100.0);
    }

    #[test]
    fn empty_grid_yields_single_empty_combo() {
        assert_eq!(ParamGrid::new().generate().len(), 1);
    }

    #[test]
    fn retry_recovers_from_runtime_errors() {
        let exec = FlakyExecutor {
            calls: AtomicUsize::new(0),
            succeed_on: 3,
            kind: FailureKind::RuntimeError,
        };
        let request = BacktestRequest::new("s", ParamSet::new());
        assert!(run_with_retry(&exec, &request, 3).is_ok());
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_gives_up_after_fix_attempts() {
        let exec = FlakyExecutor {
            calls: AtomicUsize::new(0),
            succeed_on: usize::MAX,
            kind: FailureKind::RuntimeError,
        };
        let request = BacktestRequest::new("s", ParamSet::new());
        assert!(run_with_retry(&exec, &request, 2).is_err());
        // 1 initial try + 2 fix attempts.
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn data_missing_fails_immediately() {
        let exec = FlakyExecutor {
            calls: AtomicUsize::new(0),
            succeed_on: 2,
            kind: FailureKind::DataMissing,
        };
        let request = BacktestRequest::new("s", ParamSet::new());
        let err = run_with_retry(&exec, &request, 5).unwrap_err();
        assert_eq!(err.kind, FailureKind::DataMissing);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
    }
}
