//! Post-optimization decision.
//!
//! The naive answer after a sweep is "take the best parameters". This stage
//! second-guesses that answer twice: an implausibly large improvement over
//! the baseline is escalated as probable overfitting, and a narrow parameter
//! plateau triggers a robust-median override that deliberately gives up a few
//! points of backtested Sharpe for parameters that sit in stable territory.

use serde::{Deserialize, Serialize};

use super::{Decision, DecisionStage, MetricsBundle, Verdict};
use crate::executor::ParamSet;
use crate::hypothesis::IterationCounters;
use crate::thresholds::ThresholdConfig;

/// One evaluated point of the optimization sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub params: ParamSet,
    pub sharpe: f64,
}

/// Metrics the post-optimization rules compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    /// Sharpe of the un-optimized baseline backtest.
    pub baseline_sharpe: f64,
    pub best: SweepPoint,
    /// Full sweep, used for the robust-median override.
    pub sweep: Vec<SweepPoint>,
    /// Plateau width ratio around the optimum; sensitivity is its inverse.
    pub plateau_width_ratio: f64,
}

impl OptimizationMetrics {
    /// Inverse plateau width. A narrow plateau means small parameter nudges
    /// destroy performance.
    pub fn parameter_sensitivity(&self) -> f64 {
        if self.plateau_width_ratio > 0.0 {
            1.0 / self.plateau_width_ratio
        } else {
            f64::INFINITY
        }
    }
}

pub fn decide_optimization(
    metrics: &OptimizationMetrics,
    config: &ThresholdConfig,
    _counters: &IterationCounters,
) -> Decision {
    let bundle = MetricsBundle::Optimization(metrics.clone());

    if metrics.baseline_sharpe <= 0.0 {
        return Decision::new(
            DecisionStage::PostOptimization,
            Verdict::Escalate,
            format!(
                "non-positive baseline Sharpe {:.2}, improvement ratio undefined",
                metrics.baseline_sharpe
            ),
            bundle,
        );
    }

    let improvement =
        (metrics.best.sharpe - metrics.baseline_sharpe) / metrics.baseline_sharpe;
    if improvement > config.validation.max_improvement_plausible {
        return Decision::new(
            DecisionStage::PostOptimization,
            Verdict::Escalate,
            format!(
                "optimization improved Sharpe by {:.0}%, above the {:.0}% plausibility cap; \
                 likely overfit to the sweep",
                improvement * 100.0,
                config.validation.max_improvement_plausible * 100.0
            ),
            bundle,
        );
    }

    let sensitivity = metrics.parameter_sensitivity();
    let (chosen, reason) = if sensitivity > config.validation.max_parameter_sensitivity {
        (
            robust_median_params(&metrics.sweep),
            format!(
                "parameter sensitivity {:.2} above {:.2}; overriding best parameters \
                 with the top-quartile median for robustness",
                sensitivity, config.validation.max_parameter_sensitivity
            ),
        )
    } else {
        (
            metrics.best.params.clone(),
            format!(
                "optimization improved Sharpe by {:.0}% with acceptable parameter \
                 sensitivity {:.2}",
                improvement * 100.0,
                sensitivity
            ),
        )
    };

    let mut decision = Decision::new(
        DecisionStage::PostOptimization,
        Verdict::ProceedToValidation,
        reason,
        bundle,
    );
    decision.chosen_params = Some(chosen);
    decision
}

/// Per-axis median over the top quartile of the sweep by Sharpe.
///
/// The lower middle is taken for even counts so the result stays on the
/// swept grid.
fn robust_median_params(sweep: &[SweepPoint]) -> ParamSet {
    let mut ranked: Vec<&SweepPoint> = sweep.iter().collect();
    ranked.sort_by(|a, b| b.sharpe.total_cmp(&a.sharpe));
    let quartile = ranked.len().div_ceil(4).max(1);
    let top = &ranked[..quartile.min(ranked.len())];

    let mut result = ParamSet::new();
    let Some(first) = top.first() else {
        return result;
    };
    for key in first.params.keys() {
        let mut values: Vec<f64> = top.iter().filter_map(|p| p.params.get(key)).copied().collect();
        values.sort_by(f64::total_cmp);
        if let Some(&median) = values.get((values.len().saturating_sub(1)) / 2) {
            result.insert(key.clone(), median);
        }
    }
    result
}
