//! Institutional conjunction gate.
//!
//! Every check must pass. This is deliberately not a weighted score: each
//! criterion names an independent failure mode (multiple-testing inflation,
//! sequence luck, regime dependence, parameter fragility), and blending them
//! would let a strong score on one mask a concrete failure on another.

use serde::{Deserialize, Serialize};

use super::{Decision, DecisionStage, MetricsBundle, Verdict};
use crate::thresholds::ThresholdConfig;

/// Everything the institutional gate looks at, computed upstream by the
/// statistics and Monte Carlo batteries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalMetrics {
    pub psr: f64,
    /// 10th percentile of PSR across bootstrap resamples.
    pub psr_p10: f64,
    pub dsr: f64,
    pub walk_forward_efficiency: f64,
    pub permutation_p: f64,
    /// Bootstrap p99 drawdown over the backtest drawdown.
    pub drawdown_inflation: f64,
    pub regime_cv: f64,
    pub plateau_width_ratio: f64,
    /// Of bull, bear, and sideways regimes, how many were profitable.
    pub profitable_regimes: usize,
}

/// One criterion of the conjunction, recorded pass or fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub criterion: String,
    pub observed: f64,
    pub limit: f64,
    pub passed: bool,
}

/// Full gate outcome with the per-criterion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub passed: bool,
    pub checks: Vec<GateCheck>,
}

impl GateOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Evaluate the conjunction gate and wrap it as an audited decision.
pub fn institutional_gate(metrics: &InstitutionalMetrics, config: &ThresholdConfig) -> (GateOutcome, Decision) {
    let i = &config.institutional;
    let at_least = |name: &str, observed: f64, limit: f64| GateCheck {
        criterion: name.to_string(),
        observed,
        limit,
        passed: observed >= limit,
    };
    let below = |name: &str, observed: f64, limit: f64| GateCheck {
        criterion: name.to_string(),
        observed,
        limit,
        passed: observed < limit,
    };

    let checks = vec![
        at_least("psr", metrics.psr, i.min_psr),
        at_least("psr_p10", metrics.psr_p10, i.min_psr_p10),
        at_least("dsr", metrics.dsr, i.min_dsr),
        at_least("walk_forward_efficiency", metrics.walk_forward_efficiency, i.min_wfe),
        below("permutation_p", metrics.permutation_p, i.max_permutation_p),
        below("drawdown_inflation", metrics.drawdown_inflation, i.max_drawdown_inflation),
        below("regime_cv", metrics.regime_cv, i.max_regime_cv),
        GateCheck {
            criterion: "plateau_width_ratio".to_string(),
            observed: metrics.plateau_width_ratio,
            limit: i.min_plateau_width,
            passed: metrics.plateau_width_ratio > i.min_plateau_width,
        },
        at_least(
            "profitable_regimes",
            metrics.profitable_regimes as f64,
            i.min_profitable_regimes as f64,
        ),
    ];

    let passed = checks.iter().all(|c| c.passed);
    let outcome = GateOutcome { passed, checks };

    let (verdict, reason) = if passed {
        (
            Verdict::Complete,
            "all institutional criteria passed".to_string(),
        )
    } else {
        let failed: Vec<String> = outcome
            .failures()
            .map(|c| format!("{} {:.3} vs limit {:.3}", c.criterion, c.observed, c.limit))
            .collect();
        (
            Verdict::ValidatedSuboptimal,
            format!("institutional gate failed: {}", failed.join("; ")),
        )
    };
    let decision = Decision::new(
        DecisionStage::InstitutionalGate,
        verdict,
        reason,
        MetricsBundle::Institutional(*metrics),
    );
    (outcome, decision)
}
