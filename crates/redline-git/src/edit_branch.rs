//! Edit branch management
//!
//! Every agent edit happens on an edit branch named `claude-feature-{millis}`.
//! The commit the branch was created from is the divergence point: undo never
//! moves past it, and approval squashes everything after it into one commit on
//! the origin branch.
//!
//! Undone commits stay reachable through `refs/redline/redo/{branch}`, so redo
//! and reverting to a later history entry keep working until a new edit is
//! committed.

use chrono::{DateTime, Utc};
use redline_core::fail_open::fail_open;
use redline_core::{BranchStatus, CommitId, DivergenceRecord, RedlineError, Result};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::command::GitExecutor;
use crate::records;

/// Prefix identifying agent edit branches
pub const EDIT_BRANCH_PREFIX: &str = "claude-feature-";

const REDO_REF_PREFIX: &str = "refs/redline/redo/";
const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";
const PENDING_COMMIT_MESSAGE: &str = "Uncommitted agent changes";
const FALLBACK_ORIGINS: [&str; 2] = ["main", "master"];

/// Whether a branch name belongs to an agent edit branch
pub fn is_edit_branch(name: &str) -> bool {
    name.len() > EDIT_BRANCH_PREFIX.len() && name.starts_with(EDIT_BRANCH_PREFIX)
}

/// Edit branch name for the given creation time
pub fn edit_branch_name(now: DateTime<Utc>) -> String {
    format!("{}{}", EDIT_BRANCH_PREFIX, now.timestamp_millis())
}

fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}

/// Outcome of approving an edit branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    /// The edit branch that was merged and deleted
    pub branch: String,
    /// Branch that received the squash commit
    pub origin: String,
    /// The squash commit, or `None` if the branch had no net changes
    pub commit: Option<CommitId>,
}

/// Manager for edit branch operations on one repository
///
/// All public operations are serialized through an internal lock, so sharing
/// one manager per repository keeps concurrent requests from interleaving git
/// commands.
pub struct EditBranchManager<E: GitExecutor> {
    executor: E,
    lock: Mutex<()>,
}

impl<E: GitExecutor> EditBranchManager<E> {
    /// Create a new edit branch manager
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            lock: Mutex::new(()),
        }
    }

    /// Repository this manager operates on
    pub fn repo_root(&self) -> &PathBuf {
        self.executor.repo_root()
    }

    /// Run git and return stdout, failing on nonzero exit
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.executor.exec(args).await?;
        if !output.success {
            return Err(RedlineError::Repository(format!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Run a git query whose exit status is the answer
    async fn git_succeeds(&self, args: &[&str]) -> Result<bool> {
        Ok(self.executor.exec(args).await?.success)
    }

    async fn git_dir(&self) -> Result<PathBuf> {
        let out = self.git(&["rev-parse", "--absolute-git-dir"]).await?;
        Ok(PathBuf::from(out.trim()))
    }

    async fn head(&self) -> Result<Option<CommitId>> {
        let output = self.executor.exec(&["rev-parse", "--verify", "-q", "HEAD"]).await?;
        if output.success {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn require_head(&self) -> Result<CommitId> {
        self.head()
            .await?
            .ok_or_else(|| RedlineError::Repository("HEAD does not point at a commit".to_string()))
    }

    async fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", name);
        self.git_succeeds(&["rev-parse", "--verify", "-q", &refname]).await
    }

    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        self.git_succeeds(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await
    }

    async fn is_dirty(&self) -> Result<bool> {
        let out = self.git(&["status", "--porcelain"]).await?;
        Ok(!out.trim().is_empty())
    }

    async fn current_branch_unlocked(&self) -> Result<String> {
        let output = self.executor.exec(&["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if output.success {
            Ok(output.stdout.trim().to_string())
        } else {
            // Detached HEAD
            Ok("HEAD".to_string())
        }
    }

    async fn require_edit_branch(&self) -> Result<String> {
        let branch = self.current_branch_unlocked().await?;
        if is_edit_branch(&branch) {
            Ok(branch)
        } else {
            Err(RedlineError::NotOnEditBranch(branch))
        }
    }

    async fn unique_branch_name(&self) -> Result<String> {
        let base = edit_branch_name(Utc::now());
        if !self.branch_exists(&base).await? {
            return Ok(base);
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.branch_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Load the branch's divergence record, rebuilding it from `main`/`master` if missing
    async fn divergence(&self, git_dir: &std::path::Path, branch: &str) -> Result<DivergenceRecord> {
        if let Some(record) = records::load(git_dir, branch).await? {
            return Ok(record);
        }

        for origin in FALLBACK_ORIGINS {
            if self.branch_exists(origin).await? {
                let base = self.git(&["merge-base", origin, branch]).await?;
                warn!(
                    "No divergence record for {}, using merge-base with {}",
                    branch, origin
                );
                let record = DivergenceRecord::new(branch, origin, base.trim());
                records::save(git_dir, &record).await?;
                return Ok(record);
            }
        }

        Err(RedlineError::Repository(format!(
            "No divergence record for {} and no main branch to fall back to",
            branch
        )))
    }

    /// Branch that approval targets when the edit starts from a detached HEAD
    ///
    /// The first of `main`/`master` that exists; the commit itself when neither does,
    /// which `approve` refuses.
    async fn detached_origin(&self, base: &str) -> Result<String> {
        for origin in FALLBACK_ORIGINS {
            if self.branch_exists(origin).await? {
                debug!("HEAD detached at {}, edits will be approved into {}", short(base), origin);
                return Ok(origin.to_string());
            }
        }
        warn!("HEAD detached at {} and no main branch exists", short(base));
        Ok(base.to_string())
    }

    async fn redo_tip(&self, branch: &str) -> Result<Option<CommitId>> {
        let refname = format!("{}{}", REDO_REF_PREFIX, branch);
        let output = self.executor.exec(&["rev-parse", "--verify", "-q", &refname]).await?;
        if output.success {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn set_redo_tip(&self, branch: &str, commit: &str) -> Result<()> {
        let refname = format!("{}{}", REDO_REF_PREFIX, branch);
        self.git(&["update-ref", &refname, commit]).await?;
        Ok(())
    }

    async fn clear_redo_tip(&self, branch: &str) -> Result<()> {
        if self.redo_tip(branch).await?.is_some() {
            let refname = format!("{}{}", REDO_REF_PREFIX, branch);
            self.git(&["update-ref", "-d", &refname]).await?;
        }
        Ok(())
    }

    /// The furthest commit reachable by redo, keeping it in sync with HEAD
    async fn remember_tip(&self, branch: &str, head: &str) -> Result<CommitId> {
        match self.redo_tip(branch).await? {
            Some(tip) if self.is_ancestor(head, &tip).await? => Ok(tip),
            _ => {
                self.set_redo_tip(branch, head).await?;
                Ok(head.to_string())
            }
        }
    }

    async fn forget_branch(&self, git_dir: &std::path::Path, branch: &str) -> Result<()> {
        self.clear_redo_tip(branch).await?;
        records::remove(git_dir, branch).await
    }

    async fn commit_all_unlocked(&self, message: &str) -> Result<CommitId> {
        self.git(&["add", "-A"]).await?;
        if !self.is_dirty().await? {
            return Err(RedlineError::NothingToCommit);
        }
        self.git(&["commit", "-m", message]).await?;
        let commit = self.require_head().await?;

        let branch = self.current_branch_unlocked().await?;
        if is_edit_branch(&branch) {
            // A new edit replaces whatever was undone
            self.clear_redo_tip(&branch).await?;
        }

        info!("Committed {} on {}", short(&commit), branch);
        Ok(commit)
    }

    /// Name of the checked-out branch (`HEAD` when detached)
    pub async fn current_branch(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        self.current_branch_unlocked().await
    }

    /// Make sure edits land on an edit branch
    ///
    /// Creates an initial commit in an empty repository, then branches off the
    /// current position unless an edit branch is already checked out.
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn ensure_isolated_branch(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        let git_dir = self.git_dir().await?;

        if self.head().await?.is_none() {
            info!("Repository has no commits, creating initial commit");
            self.git(&["add", "-A"]).await?;
            self.git(&["commit", "--allow-empty", "-m", INITIAL_COMMIT_MESSAGE])
                .await?;
        }

        let current = self.current_branch_unlocked().await?;
        if is_edit_branch(&current) {
            debug!("Already on edit branch {}", current);
            return Ok(current);
        }

        let base = self.require_head().await?;
        let origin = if current == "HEAD" {
            self.detached_origin(&base).await?
        } else {
            current
        };
        let branch = self.unique_branch_name().await?;

        self.git(&["checkout", "-b", &branch]).await?;
        if records::load(&git_dir, &branch).await?.is_none() {
            records::save(&git_dir, &DivergenceRecord::new(&branch, &origin, &base)).await?;
        }

        info!(
            "Created edit branch {} from {} at {}",
            branch,
            origin,
            short(&base)
        );
        Ok(branch)
    }

    /// Stage everything and commit
    ///
    /// Fails with `NothingToCommit` when the working tree is clean.
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn commit_all(&self, message: &str) -> Result<CommitId> {
        let _guard = self.lock.lock().await;
        self.commit_all_unlocked(message).await
    }

    /// Step the edit branch back one commit
    ///
    /// Fails with `Boundary` at the divergence point. The undone commit stays
    /// available to `redo`.
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn undo_last_commit(&self) -> Result<CommitId> {
        let _guard = self.lock.lock().await;
        let branch = self.require_edit_branch().await?;
        let git_dir = self.git_dir().await?;
        let record = self.divergence(&git_dir, &branch).await?;
        let head = self.require_head().await?;

        if head == record.base {
            return Err(RedlineError::Boundary(format!(
                "{} is already at its divergence point {}",
                branch,
                short(&head)
            )));
        }

        self.remember_tip(&branch, &head).await?;
        self.git(&["reset", "--hard", "HEAD~1"]).await?;
        let new_head = self.require_head().await?;

        info!("Undid {} on {}, now at {}", short(&head), branch, short(&new_head));
        Ok(new_head)
    }

    /// Move forward to the first descendant of HEAD on the redo tip
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn redo(&self) -> Result<CommitId> {
        let _guard = self.lock.lock().await;
        let branch = self.require_edit_branch().await?;
        let head = self.require_head().await?;

        let tip = self.redo_tip(&branch).await?.ok_or(RedlineError::NothingToRedo)?;
        if tip == head || !self.is_ancestor(&head, &tip).await? {
            return Err(RedlineError::NothingToRedo);
        }

        let range = format!("{}..{}", head, tip);
        let out = self
            .git(&["rev-list", "--reverse", "--ancestry-path", &range])
            .await?;
        let next = out
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(RedlineError::NothingToRedo)?
            .to_string();

        self.git(&["reset", "--hard", &next]).await?;

        info!("Redid {} on {}", short(&next), branch);
        Ok(next)
    }

    /// Move the edit branch to any commit between the divergence point and the redo tip
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn revert_to(&self, commit: &str) -> Result<CommitId> {
        let _guard = self.lock.lock().await;
        let branch = self.require_edit_branch().await?;
        let git_dir = self.git_dir().await?;
        let record = self.divergence(&git_dir, &branch).await?;
        let head = self.require_head().await?;

        let spec = format!("{}^{{commit}}", commit);
        let output = self.executor.exec(&["rev-parse", "--verify", "-q", &spec]).await?;
        if !output.success {
            return Err(RedlineError::NotFound(format!("commit {}", commit)));
        }
        let target = output.stdout.trim().to_string();

        let tip = self.remember_tip(&branch, &head).await?;
        let in_range = self.is_ancestor(&record.base, &target).await?
            && self.is_ancestor(&target, &tip).await?;
        if !in_range {
            return Err(RedlineError::Boundary(format!(
                "{} is outside the edit history of {}",
                short(&target),
                branch
            )));
        }

        if target != head {
            self.git(&["reset", "--hard", &target]).await?;
            info!("Reverted {} to {}", branch, short(&target));
        }
        Ok(target)
    }

    /// Squash-merge the edit branch into its origin and delete it
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn approve(&self) -> Result<Approval> {
        let _guard = self.lock.lock().await;
        let branch = self.require_edit_branch().await?;
        let git_dir = self.git_dir().await?;
        let record = self.divergence(&git_dir, &branch).await?;

        if !self.branch_exists(&record.origin).await? {
            return Err(RedlineError::Repository(format!(
                "Cannot approve {}: origin {} is not a branch",
                branch,
                short(&record.origin)
            )));
        }

        if self.is_dirty().await? {
            self.commit_all_unlocked(PENDING_COMMIT_MESSAGE).await?;
        }

        let range = format!("{}..{}", record.base, branch);
        let subjects = self.git(&["log", "--reverse", "--format=%s", &range]).await?;

        self.git(&["checkout", &record.origin]).await?;
        if let Err(e) = self.git(&["merge", "--squash", &branch]).await {
            warn!("Squash merge of {} failed, restoring edit branch", branch);
            if let Err(rollback) = self.git(&["reset", "--merge"]).await {
                warn!("Failed to abort squash merge on {}: {}", record.origin, rollback);
            }
            if let Err(rollback) = self.git(&["checkout", &branch]).await {
                warn!("Failed to check out {} again: {}", branch, rollback);
            }
            return Err(e);
        }

        let commit = if self.is_dirty().await? {
            let message = squash_message(&branch, &subjects);
            self.git(&["commit", "-m", &message]).await?;
            Some(self.require_head().await?)
        } else {
            None
        };

        self.git(&["branch", "-D", &branch]).await?;
        self.forget_branch(&git_dir, &branch).await?;

        info!(
            "Approved {} into {}{}",
            branch,
            record.origin,
            commit
                .as_deref()
                .map(|c| format!(" as {}", short(c)))
                .unwrap_or_default()
        );

        Ok(Approval {
            branch,
            origin: record.origin,
            commit,
        })
    }

    /// Throw away the edit branch, its commits and any uncommitted changes
    ///
    /// Returns the branch that is checked out afterwards.
    #[instrument(skip(self), fields(repo = %self.repo_root().display()))]
    pub async fn reset(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        let branch = self.require_edit_branch().await?;
        let git_dir = self.git_dir().await?;
        let record = self.divergence(&git_dir, &branch).await?;

        self.git(&["reset", "--hard"]).await?;
        self.git(&["clean", "-fd"]).await?;
        self.git(&["checkout", &record.origin]).await?;
        self.git(&["branch", "-D", &branch]).await?;
        self.forget_branch(&git_dir, &branch).await?;

        info!("Discarded {}, back on {}", branch, record.origin);
        Ok(record.origin)
    }

    /// Advisory branch status; reports `{false, false}` on any git error
    pub async fn branch_status(&self) -> BranchStatus {
        fail_open("branch_status", || self.branch_status_checked())
            .await
            .unwrap_or_default()
    }

    async fn branch_status_checked(&self) -> Result<BranchStatus> {
        let _guard = self.lock.lock().await;
        let branch = self.current_branch_unlocked().await?;
        if !is_edit_branch(&branch) {
            return Ok(BranchStatus::default());
        }

        let git_dir = self.git_dir().await?;
        let record = self.divergence(&git_dir, &branch).await?;
        let range = format!("{}..HEAD", record.base);
        let count: u64 = self
            .git(&["rev-list", "--count", &range])
            .await?
            .trim()
            .parse()
            .map_err(|e| RedlineError::Repository(format!("Unexpected rev-list output: {}", e)))?;

        Ok(BranchStatus {
            is_edit_branch: true,
            has_commits_beyond_main: count > 0,
        })
    }
}

fn squash_message(branch: &str, subjects: &str) -> String {
    let mut message = format!("Approve visual edits from {}", branch);
    let lines: Vec<&str> = subjects
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if !lines.is_empty() {
        message.push_str("\n\n");
        for line in lines {
            message.push_str("- ");
            message.push_str(line);
            message.push('\n');
        }
    }
    message
}
