//! Hypothesis state persistence.
//!
//! One JSON document per hypothesis, read at the start of every phase and
//! atomically rewritten at the end. Writes go to a temp file in the same
//! directory and are renamed into place, so a crash mid-write leaves the
//! previous document intact rather than a truncated one.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::hypothesis::HypothesisState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no persisted state for hypothesis {0}")]
    NotFound(String),
}

/// Persistence seam; tests and embedders can swap in their own backend.
pub trait StateStore {
    fn save(&self, state: &HypothesisState) -> Result<(), StoreError>;
    fn load(&self, id: &str) -> Result<HypothesisState, StoreError>;
    /// Hypothesis ids with persisted state, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// Directory of `<id>.json` documents.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, state: &HypothesisState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.dir.join(format!("{}.json.tmp", state.id));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.path_for(&state.id))?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<HypothesisState, StoreError> {
        let path = self.path_for(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Convenience used by the CLI: load if present, otherwise start fresh.
pub fn load_or_create<S: StateStore>(
    store: &S,
    id: &str,
    description: &str,
) -> Result<HypothesisState, StoreError> {
    match store.load(id) {
        Ok(state) => Ok(state),
        Err(StoreError::NotFound(_)) => Ok(HypothesisState::new(id, description)),
        Err(e) => Err(e),
    }
}
