//! Axum routes for the edit pipeline

use crate::error::ApiResult;
use crate::sse;
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use redline_agent::{presets, AgentDriver, PromptPreset};
use redline_core::{BranchStatus, EditSession, RedlineConfig, RedlineError, Result, ScreenshotHandle};
use redline_git::{EditBranchManager, GitCommand};
use redline_session::SessionRunner;
use redline_store::ScreenshotStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub config: RedlineConfig,
    pub store: ScreenshotStore,
    pub runner: SessionRunner<GitCommand>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Open the screenshot store and the target repository named by `config`
    pub async fn new(config: RedlineConfig) -> Result<Self> {
        let store = ScreenshotStore::open(&config.server.screenshots_dir).await?;

        let repo = config.target.working_dir.as_ref().map(|dir| {
            let mut git = GitCommand::new(dir);
            if let (Some(name), Some(email)) = (&config.git.author_name, &config.git.author_email) {
                git = git.with_identity(name, email);
            }
            Arc::new(EditBranchManager::new(git))
        });

        let runner = SessionRunner::new(
            repo,
            AgentDriver::new(config.agent.clone()),
            config.git.commit_message.clone(),
        );

        Ok(Self {
            config,
            store,
            runner,
        })
    }

    fn repo(&self) -> Result<&EditBranchManager<GitCommand>> {
        self.runner
            .repo()
            .map(|repo| repo.as_ref())
            .ok_or_else(|| RedlineError::Configuration("target repository is not configured".to_string()))
    }
}

/// Build the API router
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/edit", get(edit))
        .route("/api/undo", post(undo))
        .route("/api/redo", post(redo))
        .route("/api/revert", post(revert))
        .route("/api/approve", post(approve))
        .route("/api/reset", post(reset))
        .route("/api/branch-status", get(branch_status))
        .route("/api/prompt-templates", get(prompt_templates))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub screenshot: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: ScreenshotHandle,
}

/// POST /api/upload - Store an annotated screenshot
async fn upload(
    State(app): State<SharedState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let filename = app.store.save(&request.screenshot).await?;
    Ok(Json(UploadResponse { filename }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditParams {
    pub filename: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub prompt_template: String,
}

/// GET /api/edit - Run the agent and stream its output
async fn edit(
    State(app): State<SharedState>,
    Query(params): Query<EditParams>,
) -> ApiResult<impl IntoResponse> {
    let handle = ScreenshotHandle::new(params.filename);
    let screenshot_path = app.store.resolve(&handle).await?;

    info!("Edit requested with screenshot {}", handle);

    let session = EditSession {
        instruction: params.message,
        prompt_template: params.prompt_template,
        screenshot_path,
        working_dir: app.config.target.working_dir.clone(),
        entry_point: app.config.target.entry_point.clone(),
    };

    let heartbeat = Duration::from_secs(app.config.server.heartbeat_secs.max(1));
    Ok(sse::edit_stream(app.runner.run(session), heartbeat))
}

/// POST /api/undo - Step back one commit on the edit branch
async fn undo(State(app): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let commit = app.repo()?.undo_last_commit().await?;
    Ok(Json(json!({ "success": true, "commit": commit })))
}

/// POST /api/redo - Step forward one undone commit
async fn redo(State(app): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let commit = app.repo()?.redo().await?;
    Ok(Json(json!({ "success": true, "commit": commit })))
}

#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    pub commit: String,
}

/// POST /api/revert - Move the edit branch to a history entry
async fn revert(
    State(app): State<SharedState>,
    Json(request): Json<RevertRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let commit = app.repo()?.revert_to(&request.commit).await?;
    Ok(Json(json!({ "success": true, "commit": commit })))
}

/// POST /api/approve - Squash the edit branch into its origin
async fn approve(State(app): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let approval = app.repo()?.approve().await?;
    Ok(Json(json!({
        "success": true,
        "branch": approval.origin,
        "merged": approval.branch,
        "commit": approval.commit,
    })))
}

/// POST /api/reset - Discard the edit branch
async fn reset(State(app): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let branch = app.repo()?.reset().await?;
    Ok(Json(json!({ "success": true, "branch": branch })))
}

/// GET /api/branch-status - Advisory, always 200
async fn branch_status(State(app): State<SharedState>) -> Json<BranchStatus> {
    let status = match app.runner.repo() {
        Some(repo) => repo.branch_status().await,
        None => BranchStatus::default(),
    };
    Json(status)
}

/// GET /api/prompt-templates
async fn prompt_templates() -> Json<Vec<PromptPreset>> {
    Json(presets())
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "redline"
    }))
}
