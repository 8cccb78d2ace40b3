//! CSV export of the decision trail for spreadsheet review.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::audit::AuditRecord;
use crate::decision::{DecisionStage, MetricsBundle, Verdict};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export error: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One flattened row of the decision log. Sharpe is the headline number of
/// whichever stage produced the decision.
#[derive(Debug, Serialize)]
struct DecisionRow<'a> {
    record_id: &'a str,
    hypothesis_id: &'a str,
    stage: DecisionStage,
    verdict: Verdict,
    sharpe: Option<f64>,
    decided_at: String,
    reason: &'a str,
}

fn headline_sharpe(metrics: &MetricsBundle) -> Option<f64> {
    match metrics {
        MetricsBundle::Backtest(m) => Some(m.sharpe),
        MetricsBundle::Optimization(m) => Some(m.best.sharpe),
        MetricsBundle::Validation(m) => Some(m.oos_sharpe),
        MetricsBundle::Institutional(_) => None,
    }
}

/// Write the audit records to `path` as CSV, one row per decision.
pub fn write_decision_csv(
    records: &[AuditRecord],
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(DecisionRow {
            record_id: &record.record_id,
            hypothesis_id: &record.hypothesis_id,
            stage: record.decision.stage,
            verdict: record.decision.verdict,
            sharpe: headline_sharpe(&record.decision.metrics),
            decided_at: record.decision.decided_at.to_rfc3339(),
            reason: &record.decision.reason,
        })?;
    }
    writer.flush()?;
    Ok(())
}
