//! Git command execution abstraction

use async_trait::async_trait;
use redline_core::{RedlineError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Output from a git command
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl GitOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

impl From<Output> for GitOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for executing git commands (allows mocking in tests)
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Execute a git command with the given arguments
    ///
    /// A command that runs but exits nonzero is `Ok` with `success == false`;
    /// `Err` means git could not be invoked at all.
    async fn exec(&self, args: &[&str]) -> Result<GitOutput>;

    /// Get the repository root
    fn repo_root(&self) -> &PathBuf;
}

/// Real git command executor
#[derive(Debug, Clone)]
pub struct GitCommand {
    repo_root: PathBuf,
    identity: Option<(String, String)>,
}

impl GitCommand {
    /// Create a new git command executor for the given repository
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            identity: None,
        }
    }

    /// Commit as the given author/committer instead of the user's git config
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }
}

#[async_trait]
impl GitExecutor for GitCommand {
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        if !self.repo_root.is_dir() {
            return Err(RedlineError::Repository(format!(
                "Repository path is not a directory: {}",
                self.repo_root.display()
            )));
        }

        debug!("Executing git {:?}", args);

        let mut cmd = Command::new("git");
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", name))
                .arg("-c")
                .arg(format!("user.email={}", email));
        }

        let output = cmd
            .args(args)
            .current_dir(&self.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RedlineError::Repository(format!("Failed to execute git: {}", e)))?;

        let git_output = GitOutput::from(output);

        if !git_output.success {
            debug!("git command failed: {}", git_output.stderr.trim());
        }

        Ok(git_output)
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

/// Mock git executor for testing
///
/// Responses are keyed by the space-joined argument list. Every call is
/// recorded so tests can assert which commands ran.
#[derive(Clone)]
pub struct MockGitExecutor {
    repo_root: PathBuf,
    responses: HashMap<String, GitOutput>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockGitExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitExecutor {
    pub fn new() -> Self {
        Self {
            repo_root: PathBuf::from("/mock/repo"),
            responses: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, command: &str, output: GitOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    /// Commands executed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GitExecutor for MockGitExecutor {
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        let key = args.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| RedlineError::Repository(format!("No mock response for: {}", key)))
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_executor() {
        let executor = MockGitExecutor::new()
            .with_response("rev-parse HEAD", GitOutput::ok("abc123\n"));

        let output = executor.exec(&["rev-parse", "HEAD"]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "abc123\n");
        assert_eq!(executor.calls(), vec!["rev-parse HEAD".to_string()]);

        assert!(executor.exec(&["status"]).await.is_err());
    }

    #[tokio::test]
    async fn test_git_command_rejects_missing_dir() {
        let executor = GitCommand::new("/nonexistent/redline-repo-12345");
        let err = executor.exec(&["status"]).await.unwrap_err();
        assert!(matches!(err, RedlineError::Repository(_)));
    }
}
