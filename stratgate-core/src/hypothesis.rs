//! Hypothesis lifecycle state machine.
//!
//! One state machine instance per strategy hypothesis. Phases run strictly
//! in order and every edge is driven by a decision verdict; the machine
//! itself never looks at metrics. Budget guards are checked before any
//! verdict is honored, so a hypothesis can never out-run its iteration or
//! cost budget no matter what the local decision says.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::{Decision, Verdict};
use crate::executor::{ExecutionFailure, FailureKind, ParamSet};
use crate::thresholds::BudgetConfig;

/// Workflow phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Implementation,
    Backtest,
    Optimization,
    Validation,
    Terminal,
}

/// How a hypothesis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    ValidatedSuboptimal,
    Abandoned,
    Escalated,
}

/// Counters shared with the decision functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounters {
    /// Phase transitions consumed by this hypothesis.
    pub total_iterations: usize,
    /// Transient-failure retries used in the current phase.
    pub fix_attempts: usize,
    /// Optimization rounds run, including walk-forward retries.
    pub optimization_attempts: usize,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("hypothesis {0} is already terminal")]
    AlreadyTerminal(String),
    #[error("verdict {verdict:?} is not a legal edge out of phase {from:?}")]
    InvalidTransition { from: Phase, verdict: Verdict },
    #[error("phase {0:?} advances on a decision verdict, not linearly")]
    DecisionDriven(Phase),
    #[error("hypothesis {id} is already bound to external resource {existing}")]
    ResourceAlreadyBound { id: String, existing: String },
}

/// Full per-hypothesis state. Single-writer: one active workflow owns the
/// state at a time, and persistence serializes this struct verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisState {
    pub id: String,
    pub description: String,
    pub phase: Phase,
    pub counters: IterationCounters,
    pub terminal_status: Option<TerminalStatus>,
    /// Reason string of the rule that ended the hypothesis. Load-bearing:
    /// the systematic-failure detector classifies on it.
    pub terminal_reason: Option<String>,
    /// Parameters carried forward from the latest decision that chose any.
    pub active_params: Option<ParamSet>,
    /// Backing resource in the execution engine (project, workspace, job).
    /// At most one per hypothesis; bound once through [`bind_resource`].
    ///
    /// [`bind_resource`]: HypothesisState::bind_resource
    #[serde(default)]
    pub external_resource_id: Option<String>,
    /// Cumulative spend in the caller's cost unit.
    pub total_cost: f64,
    /// Complete audit trail of decisions, oldest first.
    pub decisions: Vec<Decision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HypothesisState {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            description: description.into(),
            phase: Phase::Research,
            counters: IterationCounters::default(),
            terminal_status: None,
            terminal_reason: None,
            active_params: None,
            external_resource_id: None,
            total_cost: 0.0,
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    /// Attach the external execution resource. Rebinding is rejected so a
    /// hypothesis can never silently point at two projects.
    pub fn bind_resource(&mut self, resource_id: impl Into<String>) -> Result<(), TransitionError> {
        if let Some(existing) = &self.external_resource_id {
            return Err(TransitionError::ResourceAlreadyBound {
                id: self.id.clone(),
                existing: existing.clone(),
            });
        }
        self.external_resource_id = Some(resource_id.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record spend against the budget.
    pub fn charge(&mut self, cost: f64) {
        self.total_cost += cost;
        self.updated_at = Utc::now();
    }

    fn finish(&mut self, status: TerminalStatus, reason: String) {
        self.phase = Phase::Terminal;
        self.terminal_status = Some(status);
        self.terminal_reason = Some(reason);
        self.updated_at = Utc::now();
    }
}

/// Drives [`HypothesisState`] through its phases.
#[derive(Debug, Clone, Default)]
pub struct IterationStateMachine {
    pub budget: BudgetConfig,
}

impl IterationStateMachine {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    /// Linear edges before any decision exists: research to implementation
    /// to backtest.
    pub fn progress(&self, state: &mut HypothesisState) -> Result<Phase, TransitionError> {
        if state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(state.id.clone()));
        }
        if let Some(reason) = self.budget_breach(state) {
            state.finish(TerminalStatus::Escalated, reason);
            return Ok(Phase::Terminal);
        }
        let next = match state.phase {
            Phase::Research => Phase::Implementation,
            Phase::Implementation => Phase::Backtest,
            other => return Err(TransitionError::DecisionDriven(other)),
        };
        state.phase = next;
        state.counters.total_iterations += 1;
        state.counters.fix_attempts = 0;
        state.updated_at = Utc::now();
        Ok(next)
    }

    /// Apply a decision verdict. Budget guards win over the verdict.
    pub fn advance(
        &self,
        state: &mut HypothesisState,
        decision: &Decision,
    ) -> Result<Phase, TransitionError> {
        if state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(state.id.clone()));
        }

        state.decisions.push(decision.clone());
        if let Some(params) = &decision.chosen_params {
            state.active_params = Some(params.clone());
        }

        if let Some(reason) = self.budget_breach(state) {
            state.finish(TerminalStatus::Escalated, reason);
            return Ok(Phase::Terminal);
        }

        let next = match (state.phase, decision.verdict) {
            (_, Verdict::Escalate) => {
                state.finish(TerminalStatus::Escalated, decision.reason.clone());
                Phase::Terminal
            }
            (_, Verdict::Abandon) => {
                state.finish(TerminalStatus::Abandoned, decision.reason.clone());
                Phase::Terminal
            }
            (Phase::Backtest | Phase::Optimization, Verdict::ProceedToValidation) => {
                Phase::Validation
            }
            (Phase::Backtest, Verdict::ProceedToOptimization)
            | (Phase::Validation, Verdict::RetryOptimization) => {
                state.counters.optimization_attempts += 1;
                Phase::Optimization
            }
            (Phase::Validation, Verdict::Complete) => {
                state.finish(TerminalStatus::Completed, decision.reason.clone());
                Phase::Terminal
            }
            (Phase::Validation, Verdict::ValidatedSuboptimal) => {
                state.finish(TerminalStatus::ValidatedSuboptimal, decision.reason.clone());
                Phase::Terminal
            }
            (from, verdict) => {
                return Err(TransitionError::InvalidTransition { from, verdict })
            }
        };

        if next != Phase::Terminal {
            state.phase = next;
            state.counters.total_iterations += 1;
            state.counters.fix_attempts = 0;
            state.updated_at = Utc::now();
        }
        Ok(next)
    }

    /// Handle a structured execution failure from the backtest collaborator.
    ///
    /// Missing data and timeouts are fatal; runtime crashes are retried up
    /// to the configured bound, then escalated.
    pub fn on_execution_failure(
        &self,
        state: &mut HypothesisState,
        failure: &ExecutionFailure,
    ) -> Result<Phase, TransitionError> {
        if state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(state.id.clone()));
        }
        match failure.kind {
            FailureKind::DataMissing => {
                state.finish(
                    TerminalStatus::Escalated,
                    format!("data unavailable: {}", failure.message),
                );
                Ok(Phase::Terminal)
            }
            FailureKind::Timeout => {
                state.finish(
                    TerminalStatus::Escalated,
                    format!("execution timeout treated as fatal: {}", failure.message),
                );
                Ok(Phase::Terminal)
            }
            FailureKind::RuntimeError => {
                state.counters.fix_attempts += 1;
                if state.counters.fix_attempts > self.budget.fix_attempts {
                    state.finish(
                        TerminalStatus::Escalated,
                        format!(
                            "transient failures exceeded {} fix attempts: {}",
                            self.budget.fix_attempts, failure.message
                        ),
                    );
                    Ok(Phase::Terminal)
                } else {
                    state.updated_at = Utc::now();
                    Ok(state.phase)
                }
            }
        }
    }

    fn budget_breach(&self, state: &HypothesisState) -> Option<String> {
        if state.counters.total_iterations >= self.budget.max_total_iterations {
            return Some(format!(
                "iteration budget exceeded: {} >= {}",
                state.counters.total_iterations, self.budget.max_total_iterations
            ));
        }
        if let Some(cap) = self.budget.max_cost {
            if state.total_cost >= cap {
                return Some(format!(
                    "cost budget exceeded: {:.2} >= {:.2}",
                    state.total_cost, cap
                ));
            }
        }
        None
    }
}

// ─── Systematic-failure detection ───

/// Root-cause buckets the detector classifies abandonment reasons into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    InsufficientTrades,
    Overfitting,
    ExcessiveDrawdown,
    WeakPerformance,
    DataUnavailable,
    Other,
}

impl RootCause {
    /// Classify a terminal reason string. Order matters: trade-count
    /// language wins over generic performance language because reasons from
    /// the minimum-viable rule can mention several violations.
    pub fn classify(reason: &str) -> Self {
        let r = reason.to_ascii_lowercase();
        if r.contains("insufficient trades") || (r.contains("trades") && r.contains("below")) {
            RootCause::InsufficientTrades
        } else if r.contains("overfit") || r.contains("degradation") || r.contains("suspiciously")
        {
            RootCause::Overfitting
        } else if r.contains("drawdown") {
            RootCause::ExcessiveDrawdown
        } else if r.contains("data unavailable") || r.contains("data missing") {
            RootCause::DataUnavailable
        } else if r.contains("sharpe") {
            RootCause::WeakPerformance
        } else {
            RootCause::Other
        }
    }
}

/// Diagnosis produced when abandonments repeat a root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemicDiagnosis {
    pub root_cause: RootCause,
    /// How many of the inspected abandonments shared the cause.
    pub occurrences: usize,
    pub window: usize,
    /// Synthesized summary for the human taking over.
    pub summary: String,
}

/// Inspect the last `window` abandoned hypotheses; if at least
/// `min_shared` share a classifiable root cause, escalate with a synthesized
/// diagnosis instead of cycling through more doomed hypotheses.
pub fn detect_systematic_failure(
    history: &[HypothesisState],
    window: usize,
    min_shared: usize,
) -> Option<SystemicDiagnosis> {
    let recent: Vec<&HypothesisState> = history
        .iter()
        .rev()
        .filter(|h| h.terminal_status == Some(TerminalStatus::Abandoned))
        .take(window)
        .collect();

    let mut counts: std::collections::HashMap<RootCause, usize> = std::collections::HashMap::new();
    for h in &recent {
        if let Some(reason) = &h.terminal_reason {
            let cause = RootCause::classify(reason);
            if cause != RootCause::Other {
                *counts.entry(cause).or_default() += 1;
            }
        }
    }

    let (&root_cause, &occurrences) = counts.iter().max_by_key(|(_, &n)| n)?;
    if occurrences < min_shared {
        return None;
    }
    Some(SystemicDiagnosis {
        root_cause,
        occurrences,
        window,
        summary: format!(
            "{occurrences} of the last {} abandoned hypotheses failed for the same root \
             cause ({root_cause:?}); stopping to avoid cycling through more doomed \
             hypotheses",
            recent.len()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decide_backtest, BacktestMetrics};
    use crate::thresholds::ThresholdConfig;

    fn machine() -> IterationStateMachine {
        IterationStateMachine::new(BudgetConfig::default())
    }

    fn backtest_ready(id: &str) -> HypothesisState {
        let mut state = HypothesisState::new(id, "momentum over lunch hours");
        let m = machine();
        m.progress(&mut state).unwrap();
        m.progress(&mut state).unwrap();
        assert_eq!(state.phase, Phase::Backtest);
        state
    }

    fn decision_for(m: &BacktestMetrics, state: &HypothesisState) -> Decision {
        decide_backtest(m, &ThresholdConfig::default(), &state.counters)
    }

    // ── transitions ──

    #[test]
    fn full_happy_path_to_validation() {
        let mut state = backtest_ready("h1");
        let d = decision_for(
            &BacktestMetrics {
                sharpe: 0.85,
                max_drawdown: 0.22,
                total_trades: 67,
                win_rate: 0.42,
            },
            &state,
        );
        assert_eq!(machine().advance(&mut state, &d).unwrap(), Phase::Optimization);
        assert_eq!(state.counters.optimization_attempts, 1);
        assert_eq!(state.decisions.len(), 1);
    }

    #[test]
    fn abandon_records_reason() {
        let mut state = backtest_ready("h2");
        let d = decision_for(
            &BacktestMetrics {
                sharpe: 0.3,
                max_drawdown: 0.45,
                total_trades: 15,
                win_rate: 0.4,
            },
            &state,
        );
        assert_eq!(machine().advance(&mut state, &d).unwrap(), Phase::Terminal);
        assert_eq!(state.terminal_status, Some(TerminalStatus::Abandoned));
        assert!(state.terminal_reason.as_deref().unwrap().contains("below minimum viable"));
    }

    #[test]
    fn terminal_state_rejects_further_edges() {
        let mut state = backtest_ready("h3");
        state.finish(TerminalStatus::Completed, "done".into());
        assert!(matches!(
            machine().progress(&mut state),
            Err(TransitionError::AlreadyTerminal(_))
        ));
    }

    #[test]
    fn illegal_verdict_for_phase_is_an_error() {
        // RetryOptimization only makes sense out of validation.
        let mut state = backtest_ready("h4");
        let mut d = decision_for(
            &BacktestMetrics {
                sharpe: 0.85,
                max_drawdown: 0.22,
                total_trades: 67,
                win_rate: 0.42,
            },
            &state,
        );
        d.verdict = Verdict::RetryOptimization;
        assert!(matches!(
            machine().advance(&mut state, &d),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn resource_binds_once() {
        let mut state = HypothesisState::new("h-res", "momentum breakout");
        assert!(state.external_resource_id.is_none());
        state.bind_resource("proj-042").unwrap();
        assert_eq!(state.external_resource_id.as_deref(), Some("proj-042"));
        assert!(matches!(
            state.bind_resource("proj-043"),
            Err(TransitionError::ResourceAlreadyBound { .. })
        ));
        assert_eq!(state.external_resource_id.as_deref(), Some("proj-042"));
    }

    // ── budget guards ──

    #[test]
    fn iteration_budget_forces_escalated_over_any_verdict() {
        let m = IterationStateMachine::new(BudgetConfig {
            max_total_iterations: 2,
            ..Default::default()
        });
        let mut state = HypothesisState::new("h5", "x");
        m.progress(&mut state).unwrap();
        m.progress(&mut state).unwrap();
        let d = decision_for(
            &BacktestMetrics {
                sharpe: 1.3,
                max_drawdown: 0.12,
                total_trades: 90,
                win_rate: 0.5,
            },
            &state,
        );
        // The verdict alone would proceed to validation.
        assert_eq!(d.verdict, Verdict::ProceedToValidation);
        assert_eq!(m.advance(&mut state, &d).unwrap(), Phase::Terminal);
        assert_eq!(state.terminal_status, Some(TerminalStatus::Escalated));
        assert!(state.terminal_reason.as_deref().unwrap().contains("iteration budget"));
    }

    #[test]
    fn cost_budget_forces_escalated() {
        let m = IterationStateMachine::new(BudgetConfig {
            max_cost: Some(100.0),
            ..Default::default()
        });
        let mut state = HypothesisState::new("h6", "x");
        state.charge(150.0);
        assert_eq!(m.progress(&mut state).unwrap(), Phase::Terminal);
        assert!(state.terminal_reason.as_deref().unwrap().contains("cost budget"));
    }

    // ── execution failures ──

    #[test]
    fn data_missing_is_fatal() {
        let mut state = backtest_ready("h7");
        let f = ExecutionFailure::new(FailureKind::DataMissing, "no bars for 2019");
        assert_eq!(machine().on_execution_failure(&mut state, &f).unwrap(), Phase::Terminal);
        assert!(state.terminal_reason.as_deref().unwrap().contains("data unavailable"));
    }

    #[test]
    fn runtime_errors_retry_then_escalate() {
        let mut state = backtest_ready("h8");
        let m = machine();
        let f = ExecutionFailure::new(FailureKind::RuntimeError, "segfault in indicator");
        for _ in 0..3 {
            assert_eq!(m.on_execution_failure(&mut state, &f).unwrap(), Phase::Backtest);
        }
        assert_eq!(m.on_execution_failure(&mut state, &f).unwrap(), Phase::Terminal);
        assert_eq!(state.terminal_status, Some(TerminalStatus::Escalated));
    }

    #[test]
    fn fix_attempts_reset_on_phase_change() {
        let mut state = backtest_ready("h9");
        let m = machine();
        let f = ExecutionFailure::new(FailureKind::RuntimeError, "flaky");
        m.on_execution_failure(&mut state, &f).unwrap();
        assert_eq!(state.counters.fix_attempts, 1);
        let d = decision_for(
            &BacktestMetrics {
                sharpe: 0.85,
                max_drawdown: 0.22,
                total_trades: 67,
                win_rate: 0.42,
            },
            &state,
        );
        m.advance(&mut state, &d).unwrap();
        assert_eq!(state.counters.fix_attempts, 0);
    }

    // ── systematic-failure detection ──

    fn abandoned(id: &str, reason: &str) -> HypothesisState {
        let mut state = HypothesisState::new(id, "x");
        state.finish(TerminalStatus::Abandoned, reason.into());
        state
    }

    #[test]
    fn three_shared_causes_trigger_diagnosis() {
        let history = vec![
            abandoned("a", "below minimum viable: trades 12 below 30"),
            abandoned("b", "below minimum viable: trades 18 below 30"),
            abandoned("c", "below minimum viable: Sharpe 0.20 below 0.50"),
            abandoned("d", "below minimum viable: trades 9 below 30"),
        ];
        let diagnosis = detect_systematic_failure(&history, 10, 3).unwrap();
        assert_eq!(diagnosis.root_cause, RootCause::InsufficientTrades);
        assert_eq!(diagnosis.occurrences, 3);
        assert!(diagnosis.summary.contains("same root cause"));
    }

    #[test]
    fn scattered_causes_do_not_trigger() {
        let history = vec![
            abandoned("a", "below minimum viable: trades 12 below 30"),
            abandoned("b", "degradation 60.0% above 50.0%"),
            abandoned("c", "below minimum viable: drawdown 41.0% above 30.0%"),
        ];
        assert!(detect_systematic_failure(&history, 10, 3).is_none());
    }

    #[test]
    fn only_abandoned_hypotheses_are_inspected() {
        let mut completed = HypothesisState::new("ok", "x");
        completed.finish(TerminalStatus::Completed, "degradation 10% fine".into());
        let history = vec![
            completed,
            abandoned("a", "below minimum viable: trades 12 below 30"),
            abandoned("b", "below minimum viable: trades 8 below 30"),
        ];
        assert!(detect_systematic_failure(&history, 10, 3).is_none());
    }

    #[test]
    fn classify_covers_the_reason_vocabulary() {
        assert_eq!(
            RootCause::classify("insufficient trades: 8 below minimum 10"),
            RootCause::InsufficientTrades
        );
        assert_eq!(
            RootCause::classify("degradation 60.0% above 50.0% confirms overfitting"),
            RootCause::Overfitting
        );
        assert_eq!(
            RootCause::classify("below minimum viable: drawdown 45.0% above 30.0%"),
            RootCause::ExcessiveDrawdown
        );
        assert_eq!(
            RootCause::classify("below minimum viable: Sharpe 0.30 below 0.50"),
            RootCause::WeakPerformance
        );
        assert_eq!(RootCause::classify("data unavailable: no bars"), RootCause::DataUnavailable);
        assert_eq!(RootCause::classify("operator stopped the run"), RootCause::Other);
    }
}
