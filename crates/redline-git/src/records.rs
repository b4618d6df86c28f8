//! Per-branch divergence records
//!
//! Each edit branch gets a small JSON sidecar under `<git-dir>/redline/`.
//! Keeping it inside the git directory means it never shows up in the working
//! tree, is never committed, and survives server restarts.

use redline_core::{DivergenceRecord, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const RECORD_DIR: &str = "redline";

fn record_path(git_dir: &Path, branch: &str) -> PathBuf {
    git_dir.join(RECORD_DIR).join(format!("{}.json", branch))
}

/// Load the record for a branch, if one was written
pub async fn load(git_dir: &Path, branch: &str) -> Result<Option<DivergenceRecord>> {
    let path = record_path(git_dir, branch);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persist a record, replacing any previous one for the same branch
pub async fn save(git_dir: &Path, record: &DivergenceRecord) -> Result<()> {
    let path = record_path(git_dir, &record.branch);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(record)?;
    tokio::fs::write(&path, json).await?;
    debug!("Saved divergence record for {} at {}", record.branch, path.display());
    Ok(())
}

/// Remove the record for a branch (missing records are fine)
pub async fn remove(git_dir: &Path, branch: &str) -> Result<()> {
    match tokio::fs::remove_file(record_path(git_dir, branch)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
