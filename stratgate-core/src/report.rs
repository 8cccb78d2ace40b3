//! Performance report — normalized output of one backtest run.
//!
//! Produced by the external execution engine and validated here before any
//! decision logic sees it. The decision engine itself never checks
//! preconditions; malformed reports are rejected at this boundary.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single round-trip trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub pnl: f64,
    pub symbol: String,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Holding period in whole days (rounded down).
    pub fn holding_days(&self) -> i64 {
        (self.exit_time - self.entry_time).num_days()
    }
}

/// One point on the equity curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Summary statistics reported by the execution engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub sharpe_ratio: f64,
    /// Maximum drawdown as a positive fraction in [0, 1].
    pub max_drawdown: f64,
    pub total_return: f64,
    pub total_trades: usize,
    /// Fraction of trades with pnl > 0, in [0, 1].
    pub win_rate: f64,
}

/// Normalized output of one completed backtest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    /// Time-ordered trade list, immutable once recorded.
    pub trades: Vec<Trade>,
    /// Equity curve with strictly increasing timestamps.
    pub equity_curve: Vec<EquityPoint>,
    pub summary: Summary,
}

/// Violations of the report invariants.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("trade count mismatch: summary says {summary} but {actual} trades recorded")]
    TradeCountMismatch { summary: usize, actual: usize },
    #[error("win rate mismatch: summary says {summary:.4} but trades imply {actual:.4}")]
    WinRateMismatch { summary: f64, actual: f64 },
    #[error("win rate {0} outside [0, 1]")]
    WinRateOutOfRange(f64),
    #[error("max drawdown {0} outside [0, 1]")]
    DrawdownOutOfRange(f64),
    #[error("equity curve timestamps not strictly increasing at index {0}")]
    NonMonotonicEquityCurve(usize),
    #[error("trades not time-ordered at index {0}")]
    UnorderedTrades(usize),
    #[error("trade {0} exits before it enters")]
    InvertedTrade(usize),
    #[error("non-finite value in {field}")]
    NonFinite { field: &'static str },
}

impl PerformanceReport {
    /// Check all report invariants. Must pass before the report reaches the
    /// decision engine or the Monte Carlo battery.
    pub fn validate(&self) -> Result<(), ReportError> {
        let s = &self.summary;

        if s.total_trades != self.trades.len() {
            return Err(ReportError::TradeCountMismatch {
                summary: s.total_trades,
                actual: self.trades.len(),
            });
        }
        if !(0.0..=1.0).contains(&s.win_rate) {
            return Err(ReportError::WinRateOutOfRange(s.win_rate));
        }
        if !(0.0..=1.0).contains(&s.max_drawdown) {
            return Err(ReportError::DrawdownOutOfRange(s.max_drawdown));
        }
        for (field, v) in [
            ("sharpe_ratio", s.sharpe_ratio),
            ("total_return", s.total_return),
        ] {
            if !v.is_finite() {
                return Err(ReportError::NonFinite { field });
            }
        }

        if !self.trades.is_empty() {
            let winners = self.trades.iter().filter(|t| t.is_winner()).count();
            let actual = winners as f64 / self.trades.len() as f64;
            if (actual - s.win_rate).abs() > 1e-9 {
                return Err(ReportError::WinRateMismatch {
                    summary: s.win_rate,
                    actual,
                });
            }
        }

        for (i, t) in self.trades.iter().enumerate() {
            if t.exit_time < t.entry_time {
                return Err(ReportError::InvertedTrade(i));
            }
            if !t.pnl.is_finite() {
                return Err(ReportError::NonFinite { field: "trade pnl" });
            }
            if i > 0 && t.entry_time < self.trades[i - 1].entry_time {
                return Err(ReportError::UnorderedTrades(i));
            }
        }

        for i in 1..self.equity_curve.len() {
            if self.equity_curve[i].timestamp <= self.equity_curve[i - 1].timestamp {
                return Err(ReportError::NonMonotonicEquityCurve(i));
            }
        }

        Ok(())
    }

    /// Trade P&L values in recorded order.
    pub fn pnl_sequence(&self) -> Vec<f64> {
        self.trades.iter().map(|t| t.pnl).collect()
    }

    /// Equity values in curve order.
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}
