//! Decision audit trail.
//!
//! Every decision is written out with the metrics snapshot and the full
//! threshold set it was judged against, so "why did this get abandoned"
//! is answerable months later without re-running the Monte Carlo suite.
//! Records append to a JSONL file, one document per line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::Decision;
use crate::thresholds::ThresholdConfig;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One audited decision, self-contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Content hash of the record body; stable across re-serialization and
    /// usable as a cross-reference key.
    pub record_id: String,
    pub hypothesis_id: String,
    pub decision: Decision,
    /// The exact thresholds in force when the verdict was produced.
    pub thresholds: ThresholdConfig,
}

impl AuditRecord {
    pub fn new(
        hypothesis_id: impl Into<String>,
        decision: Decision,
        thresholds: &ThresholdConfig,
    ) -> Result<Self, AuditError> {
        let hypothesis_id = hypothesis_id.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(hypothesis_id.as_bytes());
        hasher.update(&serde_json::to_vec(&decision)?);
        let record_id = hasher.finalize().to_hex().to_string();
        Ok(Self {
            record_id,
            hypothesis_id,
            decision,
            thresholds: thresholds.clone(),
        })
    }
}

/// Append-only JSONL audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read the whole trail, oldest first. An absent file is an empty trail.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Records for one hypothesis, oldest first.
    pub fn for_hypothesis(&self, id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.hypothesis_id == id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decide_backtest, BacktestMetrics};
    use crate::hypothesis::IterationCounters;

    fn sample_decision(sharpe: f64) -> Decision {
        decide_backtest(
            &BacktestMetrics {
                sharpe,
                max_drawdown: 0.22,
                total_trades: 67,
                win_rate: 0.42,
            },
            &ThresholdConfig::default(),
            &IterationCounters::default(),
        )
    }

    #[test]
    fn record_id_is_stable_for_identical_content() {
        let thresholds = ThresholdConfig::default();
        let decision = sample_decision(0.85);
        let a = AuditRecord::new("h-1", decision.clone(), &thresholds).unwrap();
        let b = AuditRecord::new("h-1", decision, &thresholds).unwrap();
        assert_eq!(a.record_id, b.record_id);
        assert_eq!(a.record_id.len(), 64);
    }

    #[test]
    fn record_id_differs_across_hypotheses() {
        let thresholds = ThresholdConfig::default();
        let decision = sample_decision(0.85);
        let a = AuditRecord::new("h-1", decision.clone(), &thresholds).unwrap();
        let b = AuditRecord::new("h-2", decision, &thresholds).unwrap();
        assert_ne!(a.record_id, b.record_id);
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("decisions.jsonl"));
        let thresholds = ThresholdConfig::default();
        for (id, sharpe) in [("h-1", 0.85), ("h-2", 0.3), ("h-1", 1.3)] {
            let record = AuditRecord::new(id, sample_decision(sharpe), &thresholds).unwrap();
            log.append(&record).unwrap();
        }
        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 3);
        let h1 = log.for_hypothesis("h-1").unwrap();
        assert_eq!(h1.len(), 2);
        assert!(h1.iter().all(|r| r.hypothesis_id == "h-1"));
    }

    #[test]
    fn absent_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nope.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
