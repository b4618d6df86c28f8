//! Async runner executing the session state machine
//!
//! Drives one edit session from configuration check to commit and produces
//! a stream of [`SessionEvent`]s for the client. The stream ends right after
//! its single terminal event.

use futures::Stream;
use redline_agent::{AgentDriver, AgentEvent};
use redline_core::fail_open::fail_open;
use redline_core::{CommitId, EditSession, RedlineError, TargetConfig};
use redline_git::{EditBranchManager, GitExecutor};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state_machine::{transition, Action, Event, State};

/// What the client sees of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Agent standard output
    Output(String),
    /// Agent standard error
    Diagnostic(String),
    /// Terminal: the edit succeeded
    Completed { commit: Option<CommitId> },
    /// Terminal: the edit failed
    Failed { message: String },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Completed { .. } | SessionEvent::Failed { .. })
    }
}

/// Runs edit sessions against one repository
pub struct SessionRunner<E: GitExecutor> {
    repo: Option<Arc<EditBranchManager<E>>>,
    driver: AgentDriver,
    commit_message: String,
}

impl<E: GitExecutor> Clone for SessionRunner<E> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            driver: self.driver.clone(),
            commit_message: self.commit_message.clone(),
        }
    }
}

impl<E: GitExecutor + 'static> SessionRunner<E> {
    /// Create a runner
    ///
    /// `repo` is `None` when no target repository is configured; every
    /// session then fails with a configuration error.
    pub fn new(
        repo: Option<Arc<EditBranchManager<E>>>,
        driver: AgentDriver,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            driver,
            commit_message: commit_message.into(),
        }
    }

    /// Repository this runner edits
    pub fn repo(&self) -> Option<&Arc<EditBranchManager<E>>> {
        self.repo.as_ref()
    }

    fn check_configuration(&self, session: &EditSession) -> Result<(), String> {
        let target = TargetConfig {
            working_dir: session.working_dir.clone(),
            entry_point: session.entry_point.clone(),
        };
        target.require().map_err(|e| e.to_string())?;
        if self.repo.is_none() {
            return Err(RedlineError::Configuration("no target repository is open".to_string()).to_string());
        }
        // Paths and template must hold before git touches the repository
        self.driver
            .prepare(session)
            .map(|_| ())
            .map_err(|failure| RedlineError::from(failure).to_string())
    }

    /// Run one session
    pub fn run(&self, session: EditSession) -> impl Stream<Item = SessionEvent> + Send + 'static {
        let runner = self.clone();

        async_stream::stream! {
            let first = match runner.check_configuration(&session) {
                Ok(()) => Event::Start,
                Err(message) => Event::ConfigurationInvalid { message },
            };

            let mut state = State::Idle;
            let mut queue = VecDeque::from([first]);
            let mut agent = None;

            loop {
                while let Some(event) = queue.pop_front() {
                    let (next, actions) = transition(state, event);
                    state = next;

                    for action in actions {
                        match action {
                            Action::LogActivity { message } => info!("{}", message),
                            Action::EnsureBranch => {
                                let branch = match &runner.repo {
                                    Some(repo) => {
                                        fail_open("ensure_isolated_branch", || repo.ensure_isolated_branch()).await
                                    }
                                    None => None,
                                };
                                queue.push_back(Event::BranchReady { branch });
                            }
                            Action::SpawnAgent => {
                                agent = Some(runner.driver.run(&session));
                                queue.push_back(Event::AgentStarted);
                            }
                            Action::CommitAll => {
                                queue.push_back(runner.commit().await);
                            }
                            Action::EmitCompleted { commit } => {
                                yield SessionEvent::Completed { commit };
                            }
                            Action::EmitFailed { message } => {
                                yield SessionEvent::Failed { message };
                            }
                        }
                    }

                    if state.is_terminal() {
                        return;
                    }
                }

                let Some(mut run) = agent.take() else {
                    break;
                };

                while let Some(event) = run.next_event().await {
                    match event {
                        AgentEvent::Stdout(text) => yield SessionEvent::Output(text),
                        AgentEvent::Stderr(text) => yield SessionEvent::Diagnostic(text),
                        AgentEvent::Exited(Ok(())) => queue.push_back(Event::AgentSucceeded),
                        AgentEvent::Exited(Err(failure)) => {
                            queue.push_back(Event::AgentFailed {
                                message: RedlineError::from(failure).to_string(),
                            })
                        }
                    }
                }

                if queue.is_empty() {
                    queue.push_back(Event::Error {
                        message: "Agent output ended without an exit status".to_string(),
                    });
                }
            }

            if !state.is_terminal() {
                warn!("Session stopped in non-terminal state {:?}", state);
                yield SessionEvent::Failed {
                    message: format!("Edit session stopped unexpectedly in state {:?}", state),
                };
            }
        }
    }

    async fn commit(&self) -> Event {
        let Some(repo) = &self.repo else {
            return Event::Error {
                message: "No target repository to commit to".to_string(),
            };
        };

        match repo.commit_all(&self.commit_message).await {
            Ok(commit) => Event::CommitFinished { commit: Some(commit) },
            Err(RedlineError::NothingToCommit) => {
                debug!("Working tree clean after agent run");
                Event::CommitFinished { commit: None }
            }
            Err(e) => Event::Error {
                message: format!("Failed to commit agent changes: {}", e),
            },
        }
    }
}
