//! Post-validation decision.
//!
//! Compares the in-sample report the strategy was tuned on against the
//! out-of-sample walk-forward result. Degradation tiers decide the outcome:
//! mild degradation is expected, heavy degradation is confirmed overfitting.

use serde::{Deserialize, Serialize};

use super::{Decision, DecisionStage, MetricsBundle, Verdict};
use crate::hypothesis::IterationCounters;
use crate::thresholds::ThresholdConfig;

/// In-sample versus out-of-sample comparison inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub in_sample_sharpe: f64,
    pub oos_sharpe: f64,
    pub oos_drawdown: f64,
    pub oos_trades: usize,
}

impl ValidationMetrics {
    /// Relative Sharpe loss from in-sample to out-of-sample.
    pub fn degradation(&self) -> f64 {
        (self.in_sample_sharpe - self.oos_sharpe) / self.in_sample_sharpe
    }
}

pub fn decide_validation(
    metrics: &ValidationMetrics,
    config: &ThresholdConfig,
    counters: &IterationCounters,
) -> Decision {
    let bundle = MetricsBundle::Validation(*metrics);
    let (verdict, reason) = validation_rules(metrics, config, counters);
    Decision::new(DecisionStage::PostValidation, verdict, reason, bundle)
}

fn validation_rules(
    m: &ValidationMetrics,
    c: &ThresholdConfig,
    counters: &IterationCounters,
) -> (Verdict, String) {
    if m.in_sample_sharpe <= 0.0 {
        return (
            Verdict::Abandon,
            format!(
                "non-positive in-sample Sharpe {:.2}, nothing to validate against",
                m.in_sample_sharpe
            ),
        );
    }

    let v = &c.validation;
    let degradation = m.degradation();

    // Confirmed overfitting: the edge did not survive out of sample.
    if degradation > v.max_degradation_conditional {
        if counters.optimization_attempts < v.max_optimization_attempts {
            return (
                Verdict::RetryOptimization,
                format!(
                    "degradation {:.1}% above {:.1}% confirms overfitting; retrying with \
                     walk-forward re-optimization (attempt {} of {})",
                    degradation * 100.0,
                    v.max_degradation_conditional * 100.0,
                    counters.optimization_attempts + 1,
                    v.max_optimization_attempts
                ),
            );
        }
        return (
            Verdict::Abandon,
            format!(
                "degradation {:.1}% above {:.1}% and re-optimization attempts exhausted",
                degradation * 100.0,
                v.max_degradation_conditional * 100.0
            ),
        );
    }

    // Conditional band: accept only if out-of-sample still clears the
    // minimum-viable bar, and flag reduced sizing.
    if degradation > v.max_degradation_accept {
        let mv = &c.minimum_viable;
        let clears = m.oos_sharpe >= mv.min_sharpe
            && m.oos_drawdown <= mv.max_drawdown
            && m.oos_trades >= mv.min_trades;
        if clears {
            return (
                Verdict::ValidatedSuboptimal,
                format!(
                    "degradation {:.1}% in conditional band ({:.1}%-{:.1}%]; accepted at \
                     reduced size, out-of-sample still clears minimum viable",
                    degradation * 100.0,
                    v.max_degradation_accept * 100.0,
                    v.max_degradation_conditional * 100.0
                ),
            );
        }
        return (
            Verdict::Abandon,
            format!(
                "degradation {:.1}% in conditional band and out-of-sample Sharpe {:.2} \
                 fails minimum viable",
                degradation * 100.0,
                m.oos_sharpe
            ),
        );
    }

    // Accepted. Production bar on out-of-sample Sharpe picks the tier.
    if m.oos_sharpe >= c.production_ready.min_sharpe {
        (
            Verdict::Complete,
            format!(
                "degradation {:.1}% within {:.1}% and out-of-sample Sharpe {:.2} \
                 clears production bar {:.2}",
                degradation * 100.0,
                v.max_degradation_accept * 100.0,
                m.oos_sharpe,
                c.production_ready.min_sharpe
            ),
        )
    } else {
        (
            Verdict::ValidatedSuboptimal,
            format!(
                "degradation {:.1}% acceptable but out-of-sample Sharpe {:.2} below \
                 production bar {:.2}",
                degradation * 100.0,
                m.oos_sharpe,
                c.production_ready.min_sharpe
            ),
        )
    }
}
