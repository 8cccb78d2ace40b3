//! Post-backtest decision table.

use serde::{Deserialize, Serialize};

use super::{Decision, DecisionStage, MetricsBundle, Verdict};
use crate::hypothesis::IterationCounters;
use crate::report::PerformanceReport;
use crate::thresholds::{SuspicionAction, ThresholdConfig};

/// Metrics the post-backtest rules compare against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub win_rate: f64,
}

impl From<&PerformanceReport> for BacktestMetrics {
    fn from(report: &PerformanceReport) -> Self {
        Self {
            sharpe: report.summary.sharpe_ratio,
            max_drawdown: report.summary.max_drawdown,
            total_trades: report.summary.total_trades,
            win_rate: report.summary.win_rate,
        }
    }
}

/// Ordered post-backtest rules, first match wins.
///
/// Overfitting signatures are checked before any performance bar: a strategy
/// that looks excellent but trips one must never silently advance, because a
/// high Sharpe by itself is not evidence of quality.
pub fn decide_backtest(
    metrics: &BacktestMetrics,
    config: &ThresholdConfig,
    counters: &IterationCounters,
) -> Decision {
    let (verdict, reason) = backtest_rules(metrics, config, counters);
    Decision::new(
        DecisionStage::PostBacktest,
        verdict,
        reason,
        MetricsBundle::Backtest(*metrics),
    )
}

type BacktestRule = fn(&BacktestMetrics, &ThresholdConfig) -> Option<(Verdict, String)>;

/// The rule table IS the precedence order. Overfitting signatures sit above
/// the performance bars so a suspicious report can never advance on raw
/// numbers; reordering this slice changes decision semantics.
const BACKTEST_RULES: &[BacktestRule] = &[
    too_perfect_sharpe,
    too_few_trades,
    win_rate_too_high,
    below_minimum_viable,
    production_ready,
    optimization_worthy,
];

fn backtest_rules(
    m: &BacktestMetrics,
    c: &ThresholdConfig,
    counters: &IterationCounters,
) -> (Verdict, String) {
    for rule in BACKTEST_RULES {
        if let Some(outcome) = rule(m, c) {
            return outcome;
        }
    }
    marginal_fallback(m, c, counters)
}

// Almost always lookahead or a fill-model bug.
fn too_perfect_sharpe(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    if m.sharpe > c.overfitting.too_perfect_sharpe {
        return Some((
            Verdict::Escalate,
            format!(
                "suspiciously high Sharpe {:.2} exceeds {:.2}, likely overfitting or lookahead",
                m.sharpe, c.overfitting.too_perfect_sharpe
            ),
        ));
    }
    None
}

// Too few trades for any statistic to mean anything.
fn too_few_trades(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    if m.total_trades >= c.overfitting.too_few_trades {
        return None;
    }
    let verdict = match c.overfitting.too_few_trades_action {
        SuspicionAction::Escalate => Verdict::Escalate,
        SuspicionAction::Abandon => Verdict::Abandon,
    };
    Some((
        verdict,
        format!(
            "insufficient trades: {} below minimum {} for statistical significance",
            m.total_trades, c.overfitting.too_few_trades
        ),
    ))
}

fn win_rate_too_high(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    if m.win_rate > c.overfitting.win_rate_too_high {
        return Some((
            Verdict::Escalate,
            format!(
                "win rate {:.1}% exceeds {:.1}%, rarely survives out of sample",
                m.win_rate * 100.0,
                c.overfitting.win_rate_too_high * 100.0
            ),
        ));
    }
    None
}

// Any axis below the minimum-viable bar kills the hypothesis; the reason
// lists every violation so the failure detector sees the full picture.
fn below_minimum_viable(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    let mv = &c.minimum_viable;
    let mut violations = Vec::new();
    if m.sharpe < mv.min_sharpe {
        violations.push(format!("Sharpe {:.2} below {:.2}", m.sharpe, mv.min_sharpe));
    }
    if m.max_drawdown > mv.max_drawdown {
        violations.push(format!(
            "drawdown {:.1}% above {:.1}%",
            m.max_drawdown * 100.0,
            mv.max_drawdown * 100.0
        ));
    }
    if m.total_trades < mv.min_trades {
        violations.push(format!(
            "trades {} below {}",
            m.total_trades, mv.min_trades
        ));
    }
    if violations.is_empty() {
        return None;
    }
    Some((
        Verdict::Abandon,
        format!("below minimum viable: {}", violations.join("; ")),
    ))
}

// Clears the production bar outright: skip optimization.
fn production_ready(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    let pr = &c.production_ready;
    if m.sharpe >= pr.min_sharpe
        && m.max_drawdown <= pr.max_drawdown
        && m.total_trades >= pr.min_trades
    {
        return Some((
            Verdict::ProceedToValidation,
            format!(
                "production-ready as-is: Sharpe {:.2} >= {:.2}, drawdown {:.1}% <= {:.1}%, {} trades",
                m.sharpe,
                pr.min_sharpe,
                m.max_drawdown * 100.0,
                pr.max_drawdown * 100.0,
                m.total_trades
            ),
        ));
    }
    None
}

fn optimization_worthy(m: &BacktestMetrics, c: &ThresholdConfig) -> Option<(Verdict, String)> {
    if m.sharpe >= c.optimization_worthy_sharpe {
        return Some((
            Verdict::ProceedToOptimization,
            format!(
                "Sharpe {:.2} clears optimization-worthy threshold {:.2}",
                m.sharpe, c.optimization_worthy_sharpe
            ),
        ));
    }
    None
}

// Marginal strategies get one more shot at optimization until the iteration
// budget runs dry.
fn marginal_fallback(
    m: &BacktestMetrics,
    c: &ThresholdConfig,
    counters: &IterationCounters,
) -> (Verdict, String) {
    if counters.total_iterations > c.max_iterations {
        (
            Verdict::Abandon,
            format!(
                "marginal Sharpe {:.2} and iteration budget exhausted ({} > {})",
                m.sharpe, counters.total_iterations, c.max_iterations
            ),
        )
    } else {
        (
            Verdict::ProceedToOptimization,
            format!(
                "marginal Sharpe {:.2}, attempting optimization before abandoning",
                m.sharpe
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(sharpe: f64, max_drawdown: f64, total_trades: usize, win_rate: f64) -> BacktestMetrics {
        BacktestMetrics {
            sharpe,
            max_drawdown,
            total_trades,
            win_rate,
        }
    }

    fn decide(m: &BacktestMetrics) -> Decision {
        decide_backtest(m, &ThresholdConfig::default(), &IterationCounters::default())
    }

    // ── overfitting signals ──

    #[test]
    fn too_perfect_sharpe_escalates_over_everything() {
        let d = decide(&metrics(3.5, 0.05, 80, 0.55));
        assert_eq!(d.verdict, Verdict::Escalate);
        assert!(d.reason.contains("suspiciously high Sharpe"));
    }

    #[test]
    fn too_few_trades_escalates_by_default() {
        let d = decide(&metrics(1.5, 0.10, 8, 0.55));
        assert_eq!(d.verdict, Verdict::Escalate);
        assert!(d.reason.contains("insufficient trades"));
    }

    #[test]
    fn too_few_trades_can_be_configured_to_abandon() {
        let mut config = ThresholdConfig::default();
        config.overfitting.too_few_trades_action = SuspicionAction::Abandon;
        let d = decide_backtest(
            &metrics(1.5, 0.10, 8, 0.55),
            &config,
            &IterationCounters::default(),
        );
        assert_eq!(d.verdict, Verdict::Abandon);
    }

    #[test]
    fn implausible_win_rate_escalates() {
        let d = decide(&metrics(1.2, 0.10, 80, 0.85));
        assert_eq!(d.verdict, Verdict::Escalate);
        assert!(d.reason.contains("win rate"));
    }

    // ── performance bars ──

    #[test]
    fn weak_report_abandons_with_all_violations_listed() {
        let d = decide(&metrics(0.3, 0.45, 15, 0.40));
        assert_eq!(d.verdict, Verdict::Abandon);
        assert!(d.reason.contains("below minimum viable"));
        assert!(d.reason.contains("Sharpe 0.30 below 0.50"));
        assert!(d.reason.contains("drawdown 45.0% above 30.0%"));
        assert!(d.reason.contains("trades 15 below 30"));
    }

    #[test]
    fn production_ready_skips_optimization() {
        let d = decide(&metrics(1.3, 0.12, 90, 0.52));
        assert_eq!(d.verdict, Verdict::ProceedToValidation);
    }

    #[test]
    fn optimization_worthy_cites_threshold() {
        let d = decide(&metrics(0.85, 0.22, 67, 0.42));
        assert_eq!(d.verdict, Verdict::ProceedToOptimization);
        assert!(d.reason.contains("0.70"));
    }

    #[test]
    fn marginal_case_tries_optimization_then_abandons() {
        let m = metrics(0.6, 0.25, 40, 0.45);
        let d = decide(&m);
        assert_eq!(d.verdict, Verdict::ProceedToOptimization);

        let exhausted = IterationCounters {
            total_iterations: 51,
            ..Default::default()
        };
        let d = decide_backtest(&m, &ThresholdConfig::default(), &exhausted);
        assert_eq!(d.verdict, Verdict::Abandon);
        assert!(d.reason.contains("budget exhausted"));
    }

    // ── properties ──

    #[test]
    fn deterministic_for_fixed_inputs() {
        let m = metrics(0.85, 0.22, 67, 0.42);
        let a = decide(&m);
        let b = decide(&m);
        assert_eq!(a.verdict, b.verdict);
        assert_eq!(a.reason, b.reason);
    }

    #[test]
    fn more_trades_never_worsens_the_tier() {
        // Favorability order, best to worst.
        fn tier(v: Verdict) -> u8 {
            match v {
                Verdict::ProceedToValidation => 0,
                Verdict::ProceedToOptimization => 1,
                Verdict::RetryOptimization => 1,
                Verdict::Escalate => 2,
                Verdict::Abandon => 3,
                Verdict::Complete | Verdict::ValidatedSuboptimal => 0,
            }
        }
        let config = ThresholdConfig::default();
        for &(sharpe, dd, wr) in &[(1.2, 0.15, 0.52), (0.85, 0.22, 0.42), (0.6, 0.25, 0.45)] {
            let mut prev: Option<u8> = None;
            for trades in config.overfitting.too_few_trades..200 {
                let d = decide_backtest(
                    &metrics(sharpe, dd, trades, wr),
                    &config,
                    &IterationCounters::default(),
                );
                let t = tier(d.verdict);
                if let Some(p) = prev {
                    assert!(t <= p, "verdict tier worsened at {trades} trades");
                }
                prev = Some(t);
            }
        }
    }
}
