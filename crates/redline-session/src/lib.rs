//! # redline-session
//!
//! One edit session: check configuration, isolate on an edit branch, run the
//! agent, commit on success.
//!
//! The control flow lives in a pure state machine ([`state_machine`]); the
//! runner executes its actions and streams the result.

mod runner;

pub mod state_machine;

pub use runner::{SessionEvent, SessionRunner};
pub use state_machine::{transition, Action, Event, State};
