//! Combinatorial purged cross-validation (CPCV).
//!
//! Partitions the trade timeline into `k` contiguous date groups and forms
//! one split per pair of groups held out as test data. Train trades whose
//! holding period can leak into a test window are purged, and trades entered
//! immediately after a test window are embargoed. The p10 of the test-side
//! Sharpe distribution is the headline number: a strategy that only looks
//! good on one slice of history fails it.

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{CancelFlag, DistributionSummary, McError};
use crate::metrics::{equity_path_from_pnls, path_sharpe};
use crate::report::Trade;

/// Configuration for combinatorial purged cross-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpcvConfig {
    /// Number of contiguous date groups the timeline is partitioned into.
    pub k_groups: usize,
    /// Upper bound on how long a position can stay open. Train trades within
    /// this many days of a test window are purged.
    pub max_holding_period_days: i64,
    /// Days after each test window during which train entries are dropped.
    pub embargo_days: i64,
    /// Cap on evaluated splits; excess combinations are subsampled.
    pub max_splits: usize,
    /// Minimum trades required on each side of a split for it to count.
    pub min_trades_per_split: usize,
    pub seed: u64,
    pub initial_equity: f64,
}

impl Default for CpcvConfig {
    fn default() -> Self {
        Self {
            k_groups: 8,
            max_holding_period_days: 30,
            embargo_days: 5,
            max_splits: 64,
            min_trades_per_split: 5,
            seed: 42,
            initial_equity: 100_000.0,
        }
    }
}

/// One train/test split and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitResult {
    /// Indices of the two date groups held out as test data.
    pub test_groups: (usize, usize),
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub n_train: usize,
    pub n_test: usize,
    /// Train trades removed by purging or the embargo.
    pub purged_count: usize,
}

/// Aggregate CPCV outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpcvResult {
    pub splits: Vec<SplitResult>,
    pub test_sharpe: DistributionSummary,
    /// 10th percentile of test-side Sharpe across splits. The institutional
    /// gate wants this above its threshold, not just the mean.
    pub p10_test_sharpe: f64,
}

/// Half-open date window covering one group of the partition.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Window {
    fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t < self.end
    }
}

/// Run CPCV over a chronologically ordered trade list.
pub fn run_cpcv(
    trades: &[Trade],
    config: &CpcvConfig,
    cancel: &CancelFlag,
) -> Result<CpcvResult, McError> {
    if config.k_groups < 3 {
        return Err(McError::SplitInfeasible(format!(
            "k_groups must be at least 3, got {}",
            config.k_groups
        )));
    }
    if trades.len() < config.k_groups * config.min_trades_per_split {
        return Err(McError::InsufficientTrades {
            got: trades.len(),
            min: config.k_groups * config.min_trades_per_split,
        });
    }

    let windows = partition_windows(trades, config.k_groups)?;

    // Every unordered pair of groups is a candidate test set.
    let mut combos: Vec<(usize, usize)> = Vec::new();
    for a in 0..config.k_groups {
        for b in (a + 1)..config.k_groups {
            combos.push((a, b));
        }
    }
    if combos.len() > config.max_splits {
        let mut rng = StdRng::seed_from_u64(config.seed);
        combos.shuffle(&mut rng);
        combos.truncate(config.max_splits);
        combos.sort_unstable();
    }

    let requested = combos.len();
    let mut splits = Vec::with_capacity(combos.len());
    for (done, &(a, b)) in combos.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(McError::Cancelled {
                completed: done,
                requested,
            });
        }
        if let Some(split) = evaluate_split(trades, &windows, (a, b), config) {
            splits.push(split);
        }
    }

    if splits.is_empty() {
        return Err(McError::SplitInfeasible(
            "no split retained enough trades after purging".into(),
        ));
    }

    let test_sharpes: Vec<f64> = splits.iter().map(|s| s.test_sharpe).collect();
    let test_sharpe = DistributionSummary::from_samples(test_sharpes);
    let p10_test_sharpe = test_sharpe.p10;

    Ok(CpcvResult {
        splits,
        test_sharpe,
        p10_test_sharpe,
    })
}

/// Split the entry-time span into `k` equal-duration contiguous windows.
fn partition_windows(trades: &[Trade], k: usize) -> Result<Vec<Window>, McError> {
    let (first, last) = match (trades.first(), trades.last()) {
        (Some(f), Some(l)) => (f.entry_time, l.entry_time),
        _ => return Err(McError::SplitInfeasible("no trades to partition".into())),
    };
    let span = last - first;
    if span <= Duration::zero() {
        return Err(McError::SplitInfeasible(
            "all trades share a single entry timestamp".into(),
        ));
    }
    let mut windows = Vec::with_capacity(k);
    for g in 0..k {
        let start = first + span * g as i32 / k as i32;
        let end = if g + 1 == k {
            // Closed on the right so the final trade lands in the last group.
            last + Duration::seconds(1)
        } else {
            first + span * (g + 1) as i32 / k as i32
        };
        windows.push(Window { start, end });
    }
    Ok(windows)
}

/// Trade indices of one split, by role.
struct SplitMembers {
    train: Vec<usize>,
    test: Vec<usize>,
    purged: usize,
}

fn classify_split(trades: &[Trade], test_windows: &[Window; 2], config: &CpcvConfig) -> SplitMembers {
    let holding = Duration::days(config.max_holding_period_days);
    let embargo = Duration::days(config.embargo_days);

    let mut members = SplitMembers {
        train: Vec::new(),
        test: Vec::new(),
        purged: 0,
    };

    'trade: for (i, t) in trades.iter().enumerate() {
        for w in test_windows {
            if w.contains(t.entry_time) {
                members.test.push(i);
                continue 'trade;
            }
        }
        for w in test_windows {
            // Purge: the trade's holding interval, padded by the maximum
            // holding period, touches the test window.
            let overlaps =
                t.entry_time < w.end + holding && t.exit_time + holding > w.start;
            // Embargo: entered too soon after the test window closed.
            let embargoed = t.entry_time >= w.end && t.entry_time < w.end + embargo;
            if overlaps || embargoed {
                members.purged += 1;
                continue 'trade;
            }
        }
        members.train.push(i);
    }

    members
}

fn evaluate_split(
    trades: &[Trade],
    windows: &[Window],
    (a, b): (usize, usize),
    config: &CpcvConfig,
) -> Option<SplitResult> {
    let members = classify_split(trades, &[windows[a], windows[b]], config);

    if members.train.len() < config.min_trades_per_split
        || members.test.len() < config.min_trades_per_split
    {
        return None;
    }

    let train_pnls: Vec<f64> = members.train.iter().map(|&i| trades[i].pnl).collect();
    let test_pnls: Vec<f64> = members.test.iter().map(|&i| trades[i].pnl).collect();
    let train_path = equity_path_from_pnls(&train_pnls, config.initial_equity);
    let test_path = equity_path_from_pnls(&test_pnls, config.initial_equity);
    Some(SplitResult {
        test_groups: (a, b),
        train_sharpe: path_sharpe(&train_path),
        test_sharpe: path_sharpe(&test_path),
        n_train: train_pnls.len(),
        n_test: test_pnls.len(),
        purged_count: members.purged,
    })
}
