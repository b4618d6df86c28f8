//! Core type definitions for the redline edit pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full hex id of a git commit
pub type CommitId = String;

/// Opaque reference to a stored screenshot (its filename)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenshotHandle(String);

impl ScreenshotHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A handle must be a bare file name: no separators, no parent references
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains(['/', '\\'])
            && self.0 != "."
            && self.0 != ".."
            && !self.0.starts_with('.')
    }
}

impl std::fmt::Display for ScreenshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScreenshotHandle {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One request to invoke the agent
///
/// Lives only for the duration of the streamed response. The target paths are
/// optional here because they come from configuration, and missing
/// configuration is reported as a session failure rather than a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    /// Free-text instruction from the user (may be empty)
    pub instruction: String,
    /// Prompt template containing substitution placeholders
    pub prompt_template: String,
    /// Absolute path to the annotated screenshot
    pub screenshot_path: PathBuf,
    /// Target repository (agent working directory)
    pub working_dir: Option<PathBuf>,
    /// Entry point being edited, relative to `working_dir`
    pub entry_point: Option<PathBuf>,
}

/// Advisory view of the repository's edit state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchStatus {
    pub is_edit_branch: bool,
    pub has_commits_beyond_main: bool,
}

/// Where an edit branch came from
///
/// Persisted next to the repository so undo boundaries survive a server restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceRecord {
    /// Edit branch this record belongs to
    pub branch: String,
    /// Branch that was checked out when the edit branch was created
    pub origin: String,
    /// Commit the edit branch was created from (the undo boundary)
    pub base: CommitId,
    pub created_at: DateTime<Utc>,
}

impl DivergenceRecord {
    pub fn new(branch: impl Into<String>, origin: impl Into<String>, base: impl Into<CommitId>) -> Self {
        Self {
            branch: branch.into(),
            origin: origin.into(),
            base: base.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_well_formed() {
        assert!(ScreenshotHandle::from("screenshot_2025-01-01T00-00-00-000Z.png").is_well_formed());
        assert!(!ScreenshotHandle::from("").is_well_formed());
        assert!(!ScreenshotHandle::from("../secret.png").is_well_formed());
        assert!(!ScreenshotHandle::from("a/b.png").is_well_formed());
        assert!(!ScreenshotHandle::from("..").is_well_formed());
        assert!(!ScreenshotHandle::from(".hidden").is_well_formed());
    }

    #[test]
    fn test_branch_status_serializes_camel_case() {
        let status = BranchStatus {
            is_edit_branch: true,
            has_commits_beyond_main: false,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["isEditBranch"], true);
        assert_eq!(json["hasCommitsBeyondMain"], false);
    }

    #[test]
    fn test_divergence_record_roundtrip() {
        let record = DivergenceRecord::new("claude-feature-1", "main", "abc123");
        let json = serde_json::to_string(&record).unwrap();
        let parsed: DivergenceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
