//! # redline-git
//!
//! Git isolation layer for redline.
//!
//! This crate provides:
//! - Git command execution abstraction (real and mock executors)
//! - Edit branch lifecycle: ensure, commit, undo/redo, approve, reset
//! - Per-branch divergence records that survive restarts

mod command;
mod edit_branch;
mod records;

pub use command::{GitCommand, GitExecutor, GitOutput, MockGitExecutor};
pub use edit_branch::{
    edit_branch_name, is_edit_branch, Approval, EditBranchManager, EDIT_BRANCH_PREFIX,
};
