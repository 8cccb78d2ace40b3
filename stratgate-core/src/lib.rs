//! StratGate — autonomous strategy-validation decision engine.
//!
//! This crate judges backtested trading strategies so a human does not have
//! to stare at every report:
//! - Performance report ingestion with consistency validation
//! - Probabilistic/Deflated Sharpe, MinTRL, WFE and plateau statistics
//! - Monte Carlo batteries (bootstrap, permutation, block randomization,
//!   purged cross-validation, noise robustness)
//! - Tiered phase decisions plus an institutional conjunction gate
//! - Per-hypothesis iteration state machine with budget guards
//! - JSON-file state persistence and a JSONL/CSV audit trail

pub mod audit;
pub mod decision;
pub mod executor;
pub mod export;
pub mod hypothesis;
pub mod metrics;
pub mod montecarlo;
pub mod report;
pub mod stats;
pub mod store;
pub mod thresholds;

pub use audit::{AuditError, AuditLog, AuditRecord};
pub use decision::{
    decide_backtest, decide_optimization, decide_validation, institutional_gate,
    BacktestMetrics, Decision, DecisionStage, GateCheck, GateOutcome, InstitutionalMetrics,
    MetricsBundle, OptimizationMetrics, SweepPoint, ValidationMetrics, Verdict,
};
pub use executor::{
    run_with_retry, BacktestExecutor, BacktestRequest, DateRange, ExecutionFailure,
    FailureKind, NoisePerturbation, ParamGrid, ParamSet, SweepExecutor,
};
pub use export::write_decision_csv;
pub use hypothesis::{
    detect_systematic_failure, HypothesisState, IterationCounters, IterationStateMachine,
    Phase, RootCause, SystemicDiagnosis, TerminalStatus, TransitionError,
};
pub use montecarlo::{
    run_block_randomization, run_cpcv, run_noise_robustness, run_permutation_test,
    run_trade_bootstrap, BootstrapConfig, BootstrapDistributions, CancelFlag, CpcvConfig,
    CpcvResult, DistributionSummary, McError, NoiseConfig, NoiseRobustness, PermutationConfig,
    PermutationResult, RegimeConfig, RegimeConsistency, SplitResult,
};
pub use report::{EquityPoint, PerformanceReport, ReportError, Summary, Trade};
pub use stats::{
    deflated_sharpe_ratio, expected_max_sharpe, min_track_record_length,
    plateau_width_ratio, probabilistic_sharpe_ratio, walk_forward_efficiency, StatError,
};
pub use store::{load_or_create, JsonFileStore, StateStore, StoreError};
pub use thresholds::{BudgetConfig, ConfigError, SuspicionAction, ThresholdConfig};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn decisions_are_shareable() {
        assert_send::<Decision>();
        assert_sync::<Decision>();
        assert_send::<MetricsBundle>();
        assert_sync::<MetricsBundle>();
    }

    #[test]
    fn reports_are_shareable() {
        assert_send::<PerformanceReport>();
        assert_sync::<PerformanceReport>();
    }

    #[test]
    fn cancel_flag_is_shareable() {
        assert_send::<CancelFlag>();
        assert_sync::<CancelFlag>();
    }

    #[test]
    fn hypothesis_state_is_shareable() {
        assert_send::<HypothesisState>();
        assert_sync::<HypothesisState>();
    }
}
