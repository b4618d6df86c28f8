//! # redline-server
//!
//! HTTP surface for the redline edit pipeline: screenshot upload, the
//! streamed edit session, and the undo/redo/approve/reset controls.

mod error;
mod server;
mod sse;

pub use error::{ApiError, ApiResult};
pub use server::{router, AppState, SharedState};
pub use sse::{edit_stream, to_sse_event};

use redline_core::RedlineConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the API server until Ctrl+C
pub async fn serve(config: RedlineConfig) -> anyhow::Result<()> {
    for problem in config.target.problems() {
        warn!("{}; edit requests will fail until this is fixed", problem);
    }

    let addr = format!("0.0.0.0:{}", config.server.port);
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("redline listening on {}", addr);
    info!("Screenshots stored in {}", state.store.dir().display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("redline stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
