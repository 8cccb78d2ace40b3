//! Decision thresholds and budgets.
//!
//! Every number the decision engine compares against lives here, loadable
//! from TOML so a desk can tighten or loosen the gates without recompiling.
//! Defaults are deliberately conservative; they are the values the decision
//! tables in `decision/` are calibrated against.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What to do when a check fires that is suspicious rather than damning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionAction {
    Escalate,
    Abandon,
}

/// Signatures of results too good to trust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverfittingThresholds {
    /// Sharpe above this is treated as a bug or lookahead, not skill.
    pub too_perfect_sharpe: f64,
    /// Below this many trades no statistic is meaningful.
    pub too_few_trades: usize,
    /// Tiny samples are ambiguous (could be a filter bug), so the action is
    /// configurable rather than a hard abandon.
    pub too_few_trades_action: SuspicionAction,
    /// Win rates above this almost never survive out of sample.
    pub win_rate_too_high: f64,
}

impl Default for OverfittingThresholds {
    fn default() -> Self {
        Self {
            too_perfect_sharpe: 3.0,
            too_few_trades: 10,
            too_few_trades_action: SuspicionAction::Escalate,
            win_rate_too_high: 0.78,
        }
    }
}

/// A performance bar: minimum Sharpe, maximum drawdown, minimum trades.
///
/// The two bars carry different defaults, so a bar section in TOML must be
/// specified in full when overridden.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBar {
    pub min_sharpe: f64,
    pub max_drawdown: f64,
    pub min_trades: usize,
}

impl PerformanceBar {
    fn minimum_viable_default() -> Self {
        Self {
            min_sharpe: 0.5,
            max_drawdown: 0.30,
            min_trades: 30,
        }
    }

    fn production_ready_default() -> Self {
        Self {
            min_sharpe: 1.0,
            max_drawdown: 0.20,
            min_trades: 50,
        }
    }
}

/// Thresholds applied after walk-forward validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// In-sample to out-of-sample degradation accepted outright.
    pub max_degradation_accept: f64,
    /// Degradation accepted only with a reduced-size recommendation.
    pub max_degradation_conditional: f64,
    /// Optimization gains above this smell like overfitting, not edge.
    pub max_improvement_plausible: f64,
    /// Inverse plateau width above this triggers the robust-median override.
    pub max_parameter_sensitivity: f64,
    /// Walk-forward re-optimization rounds allowed on confirmed overfitting.
    pub max_optimization_attempts: usize,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            max_degradation_accept: 0.30,
            max_degradation_conditional: 0.50,
            max_improvement_plausible: 0.30,
            max_parameter_sensitivity: 0.5,
            max_optimization_attempts: 3,
        }
    }
}

/// The institutional conjunction gate. Every bar must clear; a single miss
/// names a concrete failure mode that a blended score would hide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionalThresholds {
    pub min_psr: f64,
    /// 10th percentile of PSR across bootstrap resamples.
    pub min_psr_p10: f64,
    pub min_dsr: f64,
    pub min_wfe: f64,
    pub max_permutation_p: f64,
    /// Bootstrap p99 drawdown over backtest drawdown.
    pub max_drawdown_inflation: f64,
    pub max_regime_cv: f64,
    pub min_plateau_width: f64,
    /// Of the three canonical regimes (bull, bear, sideways), how many must
    /// show positive returns.
    pub min_profitable_regimes: usize,
}

impl Default for InstitutionalThresholds {
    fn default() -> Self {
        Self {
            min_psr: 0.95,
            min_psr_p10: 0.90,
            min_dsr: 0.95,
            min_wfe: 0.50,
            max_permutation_p: 0.05,
            max_drawdown_inflation: 2.5,
            max_regime_cv: 0.40,
            min_plateau_width: 0.20,
            min_profitable_regimes: 2,
        }
    }
}

/// Complete threshold set for the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub overfitting: OverfittingThresholds,
    #[serde(default = "PerformanceBar::minimum_viable_default")]
    pub minimum_viable: PerformanceBar,
    #[serde(default = "PerformanceBar::production_ready_default")]
    pub production_ready: PerformanceBar,
    /// Sharpe floor at which a backtest is worth optimizing at all.
    pub optimization_worthy_sharpe: f64,
    /// Iterations after which the marginal-case fallback abandons instead of
    /// sending yet another round to optimization.
    pub max_iterations: usize,
    pub validation: ValidationThresholds,
    pub institutional: InstitutionalThresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            overfitting: OverfittingThresholds::default(),
            minimum_viable: PerformanceBar::minimum_viable_default(),
            production_ready: PerformanceBar::production_ready_default(),
            optimization_worthy_sharpe: 0.7,
            max_iterations: 50,
            validation: ValidationThresholds::default(),
            institutional: InstitutionalThresholds::default(),
        }
    }
}

impl ThresholdConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// Budget caps that force terminal states regardless of local decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Hard cap on iterations across all phases for one hypothesis.
    pub max_total_iterations: usize,
    /// Monetary budget in the caller's currency unit; `None` means uncapped.
    pub max_cost: Option<f64>,
    /// Retries for transient execution failures before escalating.
    pub fix_attempts: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_iterations: 50,
            max_cost: None,
            fix_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn defaults_match_calibrated_gates() {
        let config = ThresholdConfig::default();
        assert_eq!(config.overfitting.too_perfect_sharpe, 3.0);
        assert_eq!(config.overfitting.too_few_trades, 10);
        assert_eq!(config.minimum_viable.min_sharpe, 0.5);
        assert_eq!(config.production_ready.min_trades, 50);
        assert_eq!(config.optimization_worthy_sharpe, 0.7);
        assert_eq!(config.institutional.min_profitable_regimes, 2);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let text = r#"
            optimization_worthy_sharpe = 0.9

            [overfitting]
            too_perfect_sharpe = 2.5

            [production_ready]
            min_sharpe = 1.2
            max_drawdown = 0.15
            min_trades = 60
        "#;
        let config: ThresholdConfig = toml::from_str(text).unwrap();
        assert_eq!(config.optimization_worthy_sharpe, 0.9);
        assert_eq!(config.overfitting.too_perfect_sharpe, 2.5);
        assert_eq!(config.production_ready.min_sharpe, 1.2);
        // Untouched sections keep defaults.
        assert_eq!(config.overfitting.win_rate_too_high, 0.78);
        assert_eq!(config.minimum_viable.min_trades, 30);
    }

    #[test]
    fn suspicion_action_round_trips_snake_case() {
        let text = r#"
            [overfitting]
            too_few_trades_action = "abandon"
        "#;
        let config: ThresholdConfig = toml::from_str(text).unwrap();
        assert_eq!(
            config.overfitting.too_few_trades_action,
            SuspicionAction::Abandon
        );
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[institutional]\nmin_psr = 0.99").unwrap();
        let config = ThresholdConfig::load(file.path()).unwrap();
        assert_eq!(config.institutional.min_psr, 0.99);
        assert_eq!(config.institutional.min_dsr, 0.95);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid [toml").unwrap();
        assert!(matches!(
            ThresholdConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
