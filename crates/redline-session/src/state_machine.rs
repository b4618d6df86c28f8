//! Pure state machine for one edit session
//!
//! This module has NO I/O. The runner feeds it events and executes the
//! actions it returns.
//!
//! Key design principles:
//! - Pure function: transition(state, event) -> (state, actions)
//! - Invalid transitions go to Failed state (never panic)
//! - A terminal state is reached exactly once per session, together with
//!   exactly one Emit action

use redline_core::CommitId;

/// Session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing has happened yet
    Idle,
    /// Branch isolation was attempted; `branch` is `None` if it failed
    BranchEnsured { branch: Option<String> },
    /// The agent process is running
    AgentRunning,
    /// The agent succeeded; `commit` is `None` if it changed nothing
    Committed { commit: Option<CommitId> },
    /// The session failed
    Failed { error: String },
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Committed { .. } | State::Failed { .. })
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Configuration is present; begin the session
    Start,
    /// Required configuration is missing
    ConfigurationInvalid { message: String },
    /// Branch isolation finished (successfully or not)
    BranchReady { branch: Option<String> },
    /// The agent process was started
    AgentStarted,
    /// The agent exited cleanly
    AgentSucceeded,
    /// The agent failed to start or exited unsuccessfully
    AgentFailed { message: String },
    /// Commit after a successful run finished
    CommitFinished { commit: Option<CommitId> },
    /// Unexpected error
    Error { message: String },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Best-effort branch isolation
    EnsureBranch,
    /// Start the agent and relay its output
    SpawnAgent,
    /// Stage and commit the working tree
    CommitAll,
    /// Report success to the client
    EmitCompleted { commit: Option<CommitId> },
    /// Report failure to the client
    EmitFailed { message: String },
    /// Log activity
    LogActivity { message: String },
}

/// Pure state transition function
///
/// Takes current state and event, returns new state and actions to execute.
///
/// # Invalid Transitions
/// Any invalid transition results in a Failed state with a descriptive error
/// and no actions. This function never panics.
pub fn transition(state: State, event: Event) -> (State, Vec<Action>) {
    match (state, event) {
        // From Idle state
        (State::Idle, Event::Start) => (
            State::Idle,
            vec![
                Action::LogActivity {
                    message: "Starting edit session".to_string(),
                },
                Action::EnsureBranch,
            ],
        ),

        (State::Idle, Event::ConfigurationInvalid { message }) => {
            let actions = vec![
                Action::LogActivity {
                    message: format!("Configuration invalid: {}", message),
                },
                Action::EmitFailed {
                    message: message.clone(),
                },
            ];
            (State::Failed { error: message }, actions)
        }

        (State::Idle, Event::BranchReady { branch }) => {
            let message = match &branch {
                Some(name) => format!("Editing on branch {}", name),
                None => "Branch isolation unavailable, continuing on current checkout".to_string(),
            };
            (
                State::BranchEnsured { branch },
                vec![Action::LogActivity { message }, Action::SpawnAgent],
            )
        }

        // From BranchEnsured state
        (State::BranchEnsured { .. }, Event::AgentStarted) => (State::AgentRunning, vec![]),

        // Preconditions are checked before spawning, so a run can fail without starting
        (State::BranchEnsured { .. }, Event::AgentFailed { message })
        | (State::AgentRunning, Event::AgentFailed { message }) => {
            let actions = vec![
                Action::LogActivity {
                    message: format!("Agent failed: {}", message),
                },
                Action::EmitFailed {
                    message: message.clone(),
                },
            ];
            (State::Failed { error: message }, actions)
        }

        // From AgentRunning state
        (State::AgentRunning, Event::AgentSucceeded) => (
            State::AgentRunning,
            vec![
                Action::LogActivity {
                    message: "Agent finished, committing changes".to_string(),
                },
                Action::CommitAll,
            ],
        ),

        (State::AgentRunning, Event::CommitFinished { commit }) => {
            let message = match &commit {
                Some(id) => format!("Edit committed as {}", id),
                None => "Agent made no changes".to_string(),
            };
            (
                State::Committed {
                    commit: commit.clone(),
                },
                vec![
                    Action::LogActivity { message },
                    Action::EmitCompleted { commit },
                ],
            )
        }

        // Error events from any non-terminal state
        (State::Idle, Event::Error { message })
        | (State::BranchEnsured { .. }, Event::Error { message })
        | (State::AgentRunning, Event::Error { message }) => {
            let actions = vec![
                Action::LogActivity {
                    message: format!("Error: {}", message),
                },
                Action::EmitFailed {
                    message: message.clone(),
                },
            ];
            (State::Failed { error: message }, actions)
        }

        // Terminal states - no valid transitions
        (State::Committed { commit }, event) => (
            State::Failed {
                error: format!(
                    "Invalid transition from Committed state (commit: {:?}) on event: {:?}",
                    commit, event
                ),
            },
            vec![],
        ),

        (State::Failed { error }, event) => (
            State::Failed {
                error: format!(
                    "Invalid transition from Failed state (error: {}) on event: {:?}",
                    error, event
                ),
            },
            vec![],
        ),

        // All other invalid transitions
        (state, event) => (
            State::Failed {
                error: format!(
                    "Invalid state transition: {:?} cannot handle event {:?}",
                    state, event
                ),
            },
            vec![],
        ),
    }
}
