//! redline CLI - visual edits applied by a coding agent on isolated git branches
//!
//! Usage:
//!   redline serve               Run the HTTP API
//!   redline status              Show edit branch status
//!   redline undo                Step back one edit
//!   redline redo                Step forward one undone edit
//!   redline revert <commit>     Move to an edit history entry
//!   redline approve             Squash the edit branch into its origin
//!   redline reset               Discard the edit branch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use redline_core::RedlineConfig;
use redline_git::{EditBranchManager, GitCommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redline")]
#[command(author, version, about = "Visual edits applied by a coding agent on isolated git branches")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./redline.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target repository (overrides config and REDLINE_WORKING_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show edit branch status
    Status,

    /// Step back one edit on the edit branch
    Undo,

    /// Step forward one undone edit
    Redo,

    /// Move the edit branch to a commit from its history
    Revert {
        /// Commit to move to
        commit: String,
    },

    /// Squash the edit branch into its origin branch and delete it
    Approve,

    /// Discard the edit branch and all its changes
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref(), cli.repo)?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(config, port).await,
        Commands::Status => cmd_status(&open_repo(&config)?).await,
        Commands::Undo => cmd_undo(&open_repo(&config)?).await,
        Commands::Redo => cmd_redo(&open_repo(&config)?).await,
        Commands::Revert { commit } => cmd_revert(&open_repo(&config)?, &commit).await,
        Commands::Approve => cmd_approve(&open_repo(&config)?).await,
        Commands::Reset => cmd_reset(&open_repo(&config)?).await,
    }
}

fn load_config(explicit: Option<&std::path::Path>, repo: Option<PathBuf>) -> Result<RedlineConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut config = RedlineConfig::load(explicit, &cwd).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Failed to apply environment configuration")?;
    if let Some(repo) = repo {
        let repo = if repo.is_absolute() { repo } else { cwd.join(repo) };
        config.target.working_dir = Some(repo);
    }
    Ok(config)
}

fn open_repo(config: &RedlineConfig) -> Result<EditBranchManager<GitCommand>> {
    let dir = config
        .target
        .working_dir
        .as_ref()
        .context("No target repository: pass --repo or set REDLINE_WORKING_DIR")?;
    debug!("Target repository: {}", dir.display());

    let mut git = GitCommand::new(dir);
    if let (Some(name), Some(email)) = (&config.git.author_name, &config.git.author_email) {
        git = git.with_identity(name, email);
    }
    Ok(EditBranchManager::new(git))
}

async fn cmd_serve(mut config: RedlineConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    println!("redline API on http://localhost:{}/api", config.server.port);
    println!("Press Ctrl+C to stop");
    redline_server::serve(config).await
}

async fn cmd_status(repo: &EditBranchManager<GitCommand>) -> Result<()> {
    let branch = repo
        .current_branch()
        .await
        .context("Failed to read current branch")?;
    let status = repo.branch_status().await;

    println!("Repository: {}", repo.repo_root().display());
    println!("Branch:     {}", branch);
    println!("Edit branch: {}", if status.is_edit_branch { "yes" } else { "no" });
    println!(
        "Unapproved edits: {}",
        if status.has_commits_beyond_main { "yes" } else { "no" }
    );
    Ok(())
}

async fn cmd_undo(repo: &EditBranchManager<GitCommand>) -> Result<()> {
    let commit = repo.undo_last_commit().await.context("Undo failed")?;
    println!("Now at {}", commit);
    Ok(())
}

async fn cmd_redo(repo: &EditBranchManager<GitCommand>) -> Result<()> {
    let commit = repo.redo().await.context("Redo failed")?;
    println!("Now at {}", commit);
    Ok(())
}

async fn cmd_revert(repo: &EditBranchManager<GitCommand>, commit: &str) -> Result<()> {
    let commit = repo
        .revert_to(commit)
        .await
        .with_context(|| format!("Failed to revert to {}", commit))?;
    println!("Now at {}", commit);
    Ok(())
}

async fn cmd_approve(repo: &EditBranchManager<GitCommand>) -> Result<()> {
    let approval = repo.approve().await.context("Approve failed")?;
    match approval.commit {
        Some(commit) => println!(
            "Merged {} into {} as {}",
            approval.branch, approval.origin, commit
        ),
        None => println!(
            "{} had no changes; deleted it and returned to {}",
            approval.branch, approval.origin
        ),
    }
    Ok(())
}

async fn cmd_reset(repo: &EditBranchManager<GitCommand>) -> Result<()> {
    let origin = repo.reset().await.context("Reset failed")?;
    println!("Discarded edit branch, back on {}", origin);
    Ok(())
}
