//! Drives an [`OperationHandle`] to a terminal state

use crate::client::ManagementClient;
use crate::error::{ReconcileError, Result};
use crate::operation::{OperationHandle, OperationState, PollConfig};
use crate::timeouts::Deadline;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polls long-running operations until they finish, fail, time out or are cancelled
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Wait for `handle` to reach a terminal state
    ///
    /// Sleeps are clamped to the time left before `deadline`, so a timeout
    /// fires at the deadline rather than at the next scheduled poll. A
    /// failed status call is returned as-is and is not retried. A server
    /// hint carried by the handle delays the first poll.
    pub async fn wait(
        &self,
        client: &dyn ManagementClient,
        mut handle: OperationHandle,
        deadline: Deadline,
        cancel: &CancellationToken,
        context: &str,
    ) -> Result<OperationHandle> {
        let timeout = || ReconcileError::Timeout {
            context: context.to_string(),
            after: deadline.budget(),
        };
        let cancelled = || ReconcileError::Cancelled {
            context: context.to_string(),
        };

        if let Some(hint) = handle.retry_after() {
            let delay = self.config.next_delay(0, Some(hint)).min(deadline.remaining());
            debug!(context, operation = handle.id(), delay_ms = delay.as_millis() as u64, "waiting before first poll");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            if deadline.is_expired() {
                return Err(timeout());
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep_until(deadline.instant()) => return Err(timeout()),
                status = client.operation_status(&handle) => {
                    status.map_err(|source| ReconcileError::Remote {
                        context: context.to_string(),
                        source,
                    })?
                }
            };

            match handle.advance(status).clone() {
                OperationState::Succeeded => {
                    debug!(context, operation = handle.id(), polls = handle.polls(), "operation succeeded");
                    return Ok(handle);
                }
                OperationState::Failed { code, message } => {
                    debug!(context, operation = handle.id(), %code, "operation failed");
                    return Err(ReconcileError::OperationFailed {
                        context: context.to_string(),
                        code,
                        message,
                    });
                }
                OperationState::Canceled => {
                    return Err(ReconcileError::OperationCanceled {
                        context: context.to_string(),
                    });
                }
                OperationState::Pending => {}
            }

            let delay = self
                .config
                .next_delay(attempt, handle.retry_after())
                .min(deadline.remaining());
            attempt = attempt.saturating_add(1);
            debug!(
                context,
                operation = handle.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "operation still in progress"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
