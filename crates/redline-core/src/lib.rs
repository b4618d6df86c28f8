//! # redline-core
//!
//! Core types for the redline visual edit pipeline.
//!
//! A user annotates a screenshot of a running web app, describes the change,
//! and a coding agent edits the target project. Every edit lands on an
//! isolated git branch so it can be undone, approved, or thrown away.
//!
//! ## Core paradigm
//!
//! - Edits ARE commits on an edit branch (one commit per successful run)
//! - The undo boundary IS the commit the edit branch diverged from
//! - Approval IS a squash-merge back onto the origin branch

mod error;
mod types;

pub mod config;
pub mod fail_open;

pub use config::{AgentConfig, GitSettings, RedlineConfig, ServerSettings, TargetConfig};
pub use error::{RedlineError, Result};
pub use types::*;
