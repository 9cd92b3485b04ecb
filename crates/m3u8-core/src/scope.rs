//! Caller cancellation merged with a deadline.
//!
//! A [`DeadlineScope`] owns a child of the caller's token. The child is
//! cancelled when the deadline passes and, through a drop guard, whenever the
//! scope is dropped, so work started under it never outlives the call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Why a scoped operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The caller's own token fired.
    Cancelled,
    /// The deadline elapsed while the caller was still waiting.
    TimedOut,
}

pub struct DeadlineScope {
    parent: CancellationToken,
    token: CancellationToken,
    timeout: Duration,
    _guard: DropGuard,
}

impl DeadlineScope {
    /// A zero `timeout` means no deadline.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let token = parent.child_token();
        Self {
            parent: parent.clone(),
            _guard: token.clone().drop_guard(),
            token,
            timeout,
        }
    }

    /// Token fired by either the caller or the deadline, for work spawned inside the scope.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drive `fut` until it finishes, the caller cancels, or the deadline passes.
    ///
    /// Caller cancellation wins when both fire together.
    pub async fn run<F: Future>(&self, fut: F) -> std::result::Result<F::Output, Interrupted> {
        let deadline = async {
            if self.timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(self.timeout).await
            }
        };

        tokio::select! {
            biased;
            _ = self.parent.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => {
                self.token.cancel();
                if self.parent.is_cancelled() {
                    Err(Interrupted::Cancelled)
                } else {
                    debug!(timeout = ?self.timeout, "Scoped operation timed out");
                    Err(Interrupted::TimedOut)
                }
            }
            out = fut => Ok(out),
        }
    }
}

/// Run a fallible operation under a fresh [`DeadlineScope`].
///
/// Caller cancellation surfaces as [`CoreError::Cancelled`]; a timeout is
/// replaced by the domain error built by `on_timeout`.
pub async fn with_deadline<T, F, E>(
    cancel: &CancellationToken,
    timeout: Duration,
    on_timeout: E,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
    E: FnOnce() -> CoreError,
{
    let scope = DeadlineScope::new(cancel, timeout);
    match scope.run(fut).await {
        Ok(result) => result,
        Err(Interrupted::Cancelled) => Err(CoreError::Cancelled),
        Err(Interrupted::TimedOut) => Err(on_timeout()),
    }
}
