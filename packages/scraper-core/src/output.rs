use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::types::ProductTask;

/// Writes one JSON file per processed (domain, product) pair into the
/// configured output directory.
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    /// Create the writer, creating the output directory if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `record` as indented JSON (non-ASCII preserved) to the
    /// task's deterministic file name, overwriting any existing file.
    pub async fn write(&self, task: &ProductTask, record: &Value) -> Result<PathBuf> {
        let path = self.dir.join(task.output_filename());
        let body = serde_json::to_string_pretty(record)
            .with_context(|| format!("Failed to serialize record for {task}"))?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "saved record");
        Ok(path)
    }
}
