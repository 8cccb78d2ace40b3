//! Phase verdicts.
//!
//! Each phase has a pure decision function `(metrics, thresholds, counters)
//! -> Decision`. No hidden state, no randomness, no I/O: the same inputs
//! always produce the same verdict, and every verdict carries the reason
//! string of the exact rule that fired. Reason strings are load-bearing; the
//! systematic-failure detector pattern-matches on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ParamSet;

mod backtest;
mod gate;
mod optimization;
mod validation;

pub use backtest::{decide_backtest, BacktestMetrics};
pub use gate::{institutional_gate, GateCheck, GateOutcome, InstitutionalMetrics};
pub use optimization::{decide_optimization, OptimizationMetrics, SweepPoint};
pub use validation::{decide_validation, ValidationMetrics};

/// What the engine decided to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Stop and ask a human; the numbers are suspicious, not merely bad.
    Escalate,
    /// Stop; the hypothesis is not worth more budget.
    Abandon,
    ProceedToValidation,
    ProceedToOptimization,
    /// Walk-forward re-optimization, if attempts remain.
    RetryOptimization,
    /// Validated and production-ready.
    Complete,
    /// Validated but below the production bar; usable, flagged.
    ValidatedSuboptimal,
}

impl Verdict {
    /// Terminal verdicts end the hypothesis; the rest advance it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Verdict::Escalate
                | Verdict::Abandon
                | Verdict::Complete
                | Verdict::ValidatedSuboptimal
        )
    }
}

/// Which decision function produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    PostBacktest,
    PostOptimization,
    PostValidation,
    InstitutionalGate,
}

/// The metrics snapshot a decision was made from, kept verbatim so the
/// verdict can be audited without re-running the statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum MetricsBundle {
    Backtest(BacktestMetrics),
    Optimization(OptimizationMetrics),
    Validation(ValidationMetrics),
    Institutional(InstitutionalMetrics),
}

/// One audited decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub stage: DecisionStage,
    pub verdict: Verdict,
    /// Human-readable statement of the rule that fired, with the observed
    /// value and the threshold it was compared against.
    pub reason: String,
    pub metrics: MetricsBundle,
    /// Parameters to carry into the next phase, when the stage picks them
    /// (the post-optimization robust-median override lands here).
    pub chosen_params: Option<ParamSet>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    fn new(
        stage: DecisionStage,
        verdict: Verdict,
        reason: String,
        metrics: MetricsBundle,
    ) -> Self {
        Self {
            stage,
            verdict,
            reason,
            metrics,
            chosen_params: None,
            decided_at: Utc::now(),
        }
    }
}
