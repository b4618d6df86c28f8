//! Integration tests for the edit branch lifecycle against real git.
//!
//! Each test builds a scratch repository in a temp directory. Tests return
//! early when git is not installed.

use redline_core::{BranchStatus, RedlineError};
use redline_git::{is_edit_branch, EditBranchManager, GitCommand, EDIT_BRANCH_PREFIX};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn empty_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    git(temp.path(), &["init", "-q", "-b", "main"]);
    git(temp.path(), &["config", "user.name", "Redline Test"]);
    git(temp.path(), &["config", "user.email", "test@redline.local"]);
    temp
}

fn repo_with_commit() -> TempDir {
    let temp = empty_repo();
    std::fs::write(temp.path().join("App.jsx"), "export default () => <h1>Hi</h1>;\n").unwrap();
    git(temp.path(), &["add", "-A"]);
    git(temp.path(), &["commit", "-q", "-m", "Initial app"]);
    temp
}

fn manager(dir: &Path) -> EditBranchManager<GitCommand> {
    EditBranchManager::new(GitCommand::new(dir).with_identity("Redline Test", "test@redline.local"))
}

fn head(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

fn commit_count(dir: &Path, rev: &str) -> usize {
    git(dir, &["rev-list", "--count", rev]).parse().unwrap()
}

async fn edit(manager: &EditBranchManager<GitCommand>, dir: &Path, content: &str) -> String {
    std::fs::write(dir.join("App.jsx"), content).unwrap();
    manager.commit_all("Applied visual edit").await.unwrap()
}

#[tokio::test]
async fn test_empty_repository_gets_initial_commit_and_edit_branch() {
    if !git_available() {
        return;
    }
    let repo = empty_repo();
    let manager = manager(repo.path());

    let branch = manager.ensure_isolated_branch().await.unwrap();

    assert!(branch.starts_with(EDIT_BRANCH_PREFIX));
    let suffix = &branch[EDIT_BRANCH_PREFIX.len()..];
    assert!(!suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(git(repo.path(), &["symbolic-ref", "--short", "HEAD"]), branch);
    assert_eq!(commit_count(repo.path(), "HEAD"), 1);
    assert_eq!(commit_count(repo.path(), "main"), 1);
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());

    let first = manager.ensure_isolated_branch().await.unwrap();
    let head_after_first = head(repo.path());
    let second = manager.ensure_isolated_branch().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(head(repo.path()), head_after_first);
    assert_eq!(commit_count(repo.path(), "HEAD"), 1);
}

#[tokio::test]
async fn test_commit_moves_past_divergence_point() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let base = head(repo.path());
    let manager = manager(repo.path());

    manager.ensure_isolated_branch().await.unwrap();
    assert_eq!(
        manager.branch_status().await,
        BranchStatus {
            is_edit_branch: true,
            has_commits_beyond_main: false
        }
    );

    let commit = edit(&manager, repo.path(), "export default () => <h1>Hello</h1>;\n").await;

    assert_ne!(commit, base);
    assert_eq!(commit, head(repo.path()));
    assert!(is_edit_branch(&manager.current_branch().await.unwrap()));
    assert!(manager.branch_status().await.has_commits_beyond_main);
}

#[tokio::test]
async fn test_commit_with_clean_tree_reports_nothing_to_commit() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());
    manager.ensure_isolated_branch().await.unwrap();

    let err = manager.commit_all("Applied visual edit").await.unwrap_err();
    assert!(matches!(err, RedlineError::NothingToCommit));
}

#[tokio::test]
async fn test_undo_at_boundary_fails_and_changes_nothing() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());
    let branch = manager.ensure_isolated_branch().await.unwrap();
    let before = head(repo.path());

    let err = manager.undo_last_commit().await.unwrap_err();

    assert!(matches!(err, RedlineError::Boundary(_)));
    assert_eq!(head(repo.path()), before);
    assert_eq!(manager.current_branch().await.unwrap(), branch);
}

#[tokio::test]
async fn test_undo_then_redo() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());
    manager.ensure_isolated_branch().await.unwrap();
    let base = head(repo.path());

    let first = edit(&manager, repo.path(), "one\n").await;
    let second = edit(&manager, repo.path(), "two\n").await;

    assert_eq!(manager.undo_last_commit().await.unwrap(), first);
    assert_eq!(manager.undo_last_commit().await.unwrap(), base);
    assert!(matches!(
        manager.undo_last_commit().await,
        Err(RedlineError::Boundary(_))
    ));

    assert_eq!(manager.redo().await.unwrap(), first);
    assert_eq!(std::fs::read_to_string(repo.path().join("App.jsx")).unwrap(), "one\n");
    assert_eq!(manager.redo().await.unwrap(), second);
    assert!(matches!(manager.redo().await, Err(RedlineError::NothingToRedo)));
}

#[tokio::test]
async fn test_new_commit_after_undo_discards_redo() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());
    manager.ensure_isolated_branch().await.unwrap();

    edit(&manager, repo.path(), "one\n").await;
    edit(&manager, repo.path(), "two\n").await;
    manager.undo_last_commit().await.unwrap();
    edit(&manager, repo.path(), "three\n").await;

    assert!(matches!(manager.redo().await, Err(RedlineError::NothingToRedo)));
}

#[tokio::test]
async fn test_revert_to_history_entry() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let manager = manager(repo.path());
    manager.ensure_isolated_branch().await.unwrap();
    let base = head(repo.path());

    let first = edit(&manager, repo.path(), "one\n").await;
    let second = edit(&manager, repo.path(), "two\n").await;
    let third = edit(&manager, repo.path(), "three\n").await;

    assert_eq!(manager.revert_to(&first).await.unwrap(), first);
    assert_eq!(std::fs::read_to_string(repo.path().join("App.jsx")).unwrap(), "one\n");

    // Forward again along the undone history
    assert_eq!(manager.revert_to(&third).await.unwrap(), third);
    assert_eq!(manager.revert_to(&base).await.unwrap(), base);
    assert_eq!(manager.redo().await.unwrap(), first);
    assert_eq!(manager.redo().await.unwrap(), second);

    assert!(matches!(
        manager.revert_to("0000000000000000000000000000000000000000").await,
        Err(RedlineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_revert_outside_edit_history_is_rejected() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let root = head(repo.path());
    std::fs::write(repo.path().join("README.md"), "readme\n").unwrap();
    git(repo.path(), &["add", "-A"]);
    git(repo.path(), &["commit", "-q", "-m", "Add readme"]);

    let manager = manager(repo.path());
    manager.ensure_isolated_branch().await.unwrap();
    edit(&manager, repo.path(), "one\n").await;
    let before = head(repo.path());

    let err = manager.revert_to(&root).await.unwrap_err();
    assert!(matches!(err, RedlineError::Boundary(_)));
    assert_eq!(head(repo.path()), before);
}

#[tokio::test]
async fn test_approve_squashes_into_one_commit() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let main_commits = commit_count(repo.path(), "main");
    let manager = manager(repo.path());
    let branch = manager.ensure_isolated_branch().await.unwrap();

    edit(&manager, repo.path(), "one\n").await;
    edit(&manager, repo.path(), "two\n").await;
    edit(&manager, repo.path(), "three\n").await;

    let approval = manager.approve().await.unwrap();

    assert_eq!(approval.branch, branch);
    assert_eq!(approval.origin, "main");
    assert!(approval.commit.is_some());
    assert_eq!(manager.current_branch().await.unwrap(), "main");
    assert_eq!(commit_count(repo.path(), "main"), main_commits + 1);
    assert_eq!(std::fs::read_to_string(repo.path().join("App.jsx")).unwrap(), "three\n");
    assert!(git(repo.path(), &["branch", "--list", &branch]).is_empty());
    assert_eq!(manager.branch_status().await, BranchStatus::default());
}

#[tokio::test]
async fn test_approve_from_detached_head_lands_on_main() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let main_commits = commit_count(repo.path(), "main");
    git(repo.path(), &["checkout", "-q", "--detach"]);
    let manager = manager(repo.path());

    manager.ensure_isolated_branch().await.unwrap();
    edit(&manager, repo.path(), "detached edit\n").await;
    let approval = manager.approve().await.unwrap();

    assert_eq!(approval.origin, "main");
    assert_eq!(manager.current_branch().await.unwrap(), "main");
    assert_eq!(commit_count(repo.path(), "main"), main_commits + 1);
    assert_eq!(approval.commit.as_deref(), Some(head(repo.path()).as_str()));
}

#[tokio::test]
async fn test_approve_refuses_commit_origin() {
    if !git_available() {
        return;
    }
    let repo = TempDir::new().unwrap();
    git(repo.path(), &["init", "-q", "-b", "trunk"]);
    git(repo.path(), &["config", "user.name", "Redline Test"]);
    git(repo.path(), &["config", "user.email", "test@redline.local"]);
    std::fs::write(repo.path().join("App.jsx"), "start\n").unwrap();
    git(repo.path(), &["add", "-A"]);
    git(repo.path(), &["commit", "-q", "-m", "Initial app"]);
    git(repo.path(), &["checkout", "-q", "--detach"]);
    let manager = manager(repo.path());

    let branch = manager.ensure_isolated_branch().await.unwrap();
    let tip = edit(&manager, repo.path(), "edit\n").await;
    let err = manager.approve().await.unwrap_err();

    assert!(matches!(err, RedlineError::Repository(ref m) if m.contains("not a branch")));
    assert_eq!(manager.current_branch().await.unwrap(), branch);
    assert_eq!(head(repo.path()), tip);
    assert_eq!(commit_count(repo.path(), "trunk"), 1);
}

#[tokio::test]
async fn test_approve_off_edit_branch_changes_nothing() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let before = head(repo.path());
    let manager = manager(repo.path());

    let err = manager.approve().await.unwrap_err();

    assert!(matches!(err, RedlineError::NotOnEditBranch(ref b) if b == "main"));
    assert_eq!(head(repo.path()), before);
    assert_eq!(commit_count(repo.path(), "main"), 1);
}

#[tokio::test]
async fn test_reset_discards_everything() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let main_head = head(repo.path());
    let manager = manager(repo.path());
    let branch = manager.ensure_isolated_branch().await.unwrap();

    edit(&manager, repo.path(), "one\n").await;
    std::fs::write(repo.path().join("App.jsx"), "uncommitted\n").unwrap();
    std::fs::write(repo.path().join("Extra.jsx"), "untracked\n").unwrap();

    let origin = manager.reset().await.unwrap();

    assert_eq!(origin, "main");
    assert_eq!(head(repo.path()), main_head);
    assert!(!repo.path().join("Extra.jsx").exists());
    assert_eq!(
        std::fs::read_to_string(repo.path().join("App.jsx")).unwrap(),
        "export default () => <h1>Hi</h1>;\n"
    );
    assert!(git(repo.path(), &["branch", "--list", &branch]).is_empty());
    assert_eq!(manager.branch_status().await, BranchStatus::default());
}

#[tokio::test]
async fn test_undo_boundary_survives_restart() {
    if !git_available() {
        return;
    }
    let repo = repo_with_commit();
    let base = head(repo.path());
    {
        let manager = manager(repo.path());
        manager.ensure_isolated_branch().await.unwrap();
        edit(&manager, repo.path(), "one\n").await;
    }

    let restarted = manager(repo.path());
    assert_eq!(restarted.undo_last_commit().await.unwrap(), base);
    assert!(matches!(
        restarted.undo_last_commit().await,
        Err(RedlineError::Boundary(_))
    ));
}

#[tokio::test]
async fn test_invalid_repository_path() {
    let manager = manager(Path::new("/nonexistent/redline/repo"));
    let err = manager.ensure_isolated_branch().await.unwrap_err();
    assert!(matches!(err, RedlineError::Repository(_)));
    assert_eq!(manager.branch_status().await, BranchStatus::default());
}
