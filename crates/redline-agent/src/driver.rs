//! Agent process driver
//!
//! Spawns the coding agent in the target repository, writes the composed
//! prompt to its stdin, and streams stdout/stderr back as [`AgentEvent`]s.
//! Every run ends with exactly one [`AgentEvent::Exited`].
//!
//! Dropping the [`AgentRun`] kills the subprocess.

use futures::Stream;
use redline_core::{AgentConfig, EditSession, RedlineError};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::prompt::{self, PromptVars};
use crate::utf8::Utf8Chunker;

const READ_BUFFER_SIZE: usize = 8 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why an agent run failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentFailure {
    #[error("{0}")]
    Precondition(String),

    #[error("invalid prompt template: {0}")]
    Template(String),

    #[error("failed to start {0}")]
    Spawn(String),

    #[error("exited with code {0}")]
    ExitCode(i32),

    #[error("terminated by a signal")]
    Signal,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<AgentFailure> for RedlineError {
    fn from(failure: AgentFailure) -> Self {
        match failure {
            AgentFailure::Precondition(_) | AgentFailure::Template(_) => {
                RedlineError::Configuration(failure.to_string())
            }
            _ => RedlineError::AgentProcess(failure.to_string()),
        }
    }
}

/// Output of a running agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Chunk of standard output, in arrival order
    Stdout(String),
    /// Chunk of standard error, in arrival order
    Stderr(String),
    /// Terminal event; nothing follows it
    Exited(Result<(), AgentFailure>),
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Exited(_))
    }
}

/// Live event stream of one agent run
///
/// Dropping it closes the channel; the supervisor notices and kills the process.
pub struct AgentRun {
    rx: mpsc::Receiver<AgentEvent>,
}

impl AgentRun {
    fn failed(failure: AgentFailure) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh channel: cannot be full
        let _ = tx.try_send(AgentEvent::Exited(Err(failure)));
        Self { rx }
    }

    /// Next event, or `None` after the terminal event
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }
}

impl Stream for AgentRun {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Validated inputs for a spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub working_dir: PathBuf,
    pub entry_point: PathBuf,
    pub prompt: String,
}

/// Spawns and supervises the coding agent
#[derive(Debug, Clone)]
pub struct AgentDriver {
    config: AgentConfig,
}

impl AgentDriver {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Arguments passed to the agent executable
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        if !self.config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.config.allowed_tools.join(","));
        }
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }

    /// Check the session's paths and compose the prompt
    pub fn prepare(&self, session: &EditSession) -> Result<PreparedRun, AgentFailure> {
        let working_dir = check_working_dir(session.working_dir.as_deref())?;

        let entry = session.entry_point.as_deref().ok_or_else(|| {
            AgentFailure::Precondition("Entry point is not configured".to_string())
        })?;
        let entry_point = working_dir.join(entry);
        if !entry_point.exists() {
            return Err(AgentFailure::Precondition(format!(
                "Entry point does not exist: {}",
                entry_point.display()
            )));
        }

        let target = entry_point.to_string_lossy();
        let screenshot = session.screenshot_path.to_string_lossy();
        let vars = PromptVars {
            target_component_path: &target,
            screenshot_path: &screenshot,
            user_message: &session.instruction,
        };
        let prompt = prompt::render(&session.prompt_template, &vars).map_err(AgentFailure::Template)?;

        Ok(PreparedRun {
            working_dir,
            entry_point,
            prompt,
        })
    }

    /// Start the agent for a session
    ///
    /// Precondition failures come back as a run whose only event is the
    /// failure; no process is spawned in that case.
    #[instrument(skip(self, session), fields(program = %self.config.program))]
    pub fn run(&self, session: &EditSession) -> AgentRun {
        let prepared = match self.prepare(session) {
            Ok(prepared) => prepared,
            Err(failure) => {
                warn!("Agent precondition failed: {}", failure);
                return AgentRun::failed(failure);
            }
        };

        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.command_args())
            .current_dir(&prepared.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.config.program, e);
                return AgentRun::failed(AgentFailure::Spawn(format!(
                    "{}: {}",
                    self.config.program, e
                )));
            }
        };

        info!(
            "Agent started (pid {:?}) in {}",
            child.id(),
            prepared.working_dir.display()
        );
        debug!("Prompt length: {} chars", prepared.prompt.len());

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(supervise(child, prepared.prompt, tx));
        AgentRun { rx }
    }
}

fn check_working_dir(dir: Option<&Path>) -> Result<PathBuf, AgentFailure> {
    let dir = dir.ok_or_else(|| {
        AgentFailure::Precondition("Working directory is not configured".to_string())
    })?;
    if !dir.is_absolute() {
        return Err(AgentFailure::Precondition(format!(
            "Working directory must be an absolute path: {}",
            dir.display()
        )));
    }
    if !dir.exists() {
        return Err(AgentFailure::Precondition(format!(
            "Working directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(AgentFailure::Precondition(format!(
            "Working directory is not a directory: {}",
            dir.display()
        )));
    }
    Ok(dir.to_path_buf())
}

async fn supervise(mut child: Child, prompt: String, tx: mpsc::Sender<AgentEvent>) {
    let writer = tokio::spawn(write_prompt(child.stdin.take(), prompt));

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward(stdout, tx.clone(), AgentEvent::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward(stderr, tx.clone(), AgentEvent::Stderr)));
    }

    let outcome = tokio::select! {
        outcome = wait_for_exit(&mut child, readers, writer) => Some(outcome),
        _ = tx.closed() => None,
    };

    match outcome {
        Some(outcome) => {
            match &outcome {
                Ok(()) => info!("Agent finished successfully"),
                Err(failure) => warn!("Agent failed: {}", failure),
            }
            let _ = tx.send(AgentEvent::Exited(outcome)).await;
        }
        None => {
            warn!("Event stream dropped, killing agent process");
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill agent process: {}", e);
            }
            let _ = child.wait().await;
        }
    }
}

async fn write_prompt(stdin: Option<ChildStdin>, prompt: String) -> std::io::Result<()> {
    if let Some(mut stdin) = stdin {
        stdin.write_all(prompt.as_bytes()).await?;
        stdin.shutdown().await?;
    }
    Ok(())
}

async fn forward<R>(mut reader: R, tx: mpsc::Sender<AgentEvent>, wrap: fn(String) -> AgentEvent)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Chunker::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send(wrap(text)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to read agent output: {}", e);
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(wrap(rest)).await;
    }
}

async fn wait_for_exit(
    child: &mut Child,
    readers: Vec<JoinHandle<()>>,
    writer: JoinHandle<std::io::Result<()>>,
) -> Result<(), AgentFailure> {
    // Drain both pipes before reporting the exit so the terminal event is last
    for reader in readers {
        let _ = reader.await;
    }

    match writer.await {
        Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
            warn!("Failed to write prompt to agent: {}", e);
        }
        _ => {}
    }

    let status = child
        .wait()
        .await
        .map_err(|e| AgentFailure::Io(e.to_string()))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(AgentFailure::ExitCode(code)),
        None => Err(AgentFailure::Signal),
    }
}
