use crate::error::{RepairError, Result};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RUNS_LOG: &str = "runs.jsonl";
pub const PATCHES_LOG: &str = "patches.jsonl";

/// Terminal status of a run as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub reason: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub chunks_selected: usize,
    pub attempts: usize,
    pub confidence_score: f64,
    pub artifacts_path: PathBuf,
    pub recorded_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub run_id: String,
    pub attempt_index: usize,
    pub diff_content: String,
    pub validation_passed: bool,
    pub looks_like_diff: bool,
    pub recorded_unix_ms: u64,
}

/// Write-once sink for run results and candidate patches
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record_run(&self, record: &RunRecord) -> Result<()>;

    async fn record_patch(&self, record: &PatchRecord) -> Result<()>;
}

pub(crate) fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Appends one JSON line per record under an exclusive file lock
pub struct JsonlRecorder {
    dir: PathBuf,
}

impl JsonlRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn runs_path(&self) -> PathBuf {
        self.dir.join(RUNS_LOG)
    }

    #[must_use]
    pub fn patches_path(&self) -> PathBuf {
        self.dir.join(PATCHES_LOG)
    }

    async fn append(&self, path: PathBuf, record: &impl Serialize) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        tokio::fs::create_dir_all(&self.dir).await?;

        tokio::task::spawn_blocking(move || append_locked(&path, line.as_bytes()))
            .await
            .map_err(|err| RepairError::Other(format!("join append task: {err}")))?
    }
}

fn append_locked(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let written = file.write_all(bytes).and_then(|()| file.flush());
    let _ = FileExt::unlock(&file);
    written?;
    Ok(())
}

#[async_trait]
impl RunRecorder for JsonlRecorder {
    async fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.append(self.runs_path(), record).await
    }

    async fn record_patch(&self, record: &PatchRecord) -> Result<()> {
        self.append(self.patches_path(), record).await
    }
}

/// Keeps records in memory; for tests and embedding callers
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    runs: Mutex<Vec<RunRecord>>,
    patches: Mutex<Vec<PatchRecord>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn patches(&self) -> Vec<PatchRecord> {
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn record_patch(&self, record: &PatchRecord) -> Result<()> {
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
