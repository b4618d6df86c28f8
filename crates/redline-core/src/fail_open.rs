//! Fail-open helper for advisory operations
//!
//! Some steps of an edit are best effort: ensuring branch isolation before an
//! agent run and reporting branch status to the UI. A failure there is logged
//! and swallowed so the edit can still be attempted.
//!
//! DO NOT use fail-open for:
//! - The agent run itself
//! - Committing agent output
//! - Explicit undo/redo/approve/reset requests

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an advisory operation, logging and discarding its error
///
/// Returns `None` if the operation failed. Never retries.
///
/// ```no_run
/// use redline_core::fail_open::fail_open;
/// use redline_core::Result;
///
/// async fn ensure_branch() -> Result<String> {
///     Ok("claude-feature-1700000000000".to_string())
/// }
///
/// async fn example() {
///     let branch = fail_open("ensure_isolated_branch", || ensure_branch()).await;
///     // branch is None if ensure_branch() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RedlineError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, RedlineError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(RedlineError::Repository("not a git repository".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_runs_once() {
        let mut attempts = 0;
        let result = fail_open("test_op", || {
            attempts += 1;
            async { Err::<i32, _>(RedlineError::NothingToCommit) }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 1);
    }
}
