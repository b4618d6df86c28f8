//! # redline-agent
//!
//! Runs the coding agent as a subprocess for one edit session.
//!
//! This crate provides:
//! - Prompt templates and placeholder substitution
//! - The process driver streaming stdout/stderr as events
//! - Incremental UTF-8 decoding of pipe output

mod driver;
mod utf8;

pub mod prompt;

pub use driver::{AgentDriver, AgentEvent, AgentFailure, AgentRun, PreparedRun};
pub use prompt::{default_template, presets, render, validate_template, PromptPreset, PromptVars};
pub use utf8::Utf8Chunker;
