//! Long-running operation state machine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status reported by one poll of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress { retry_after: Option<Duration> },
    Succeeded,
    Failed { code: String, message: String },
    Canceled,
}

/// Local view of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OperationState {
    Pending,
    Succeeded,
    Failed { code: String, message: String },
    Canceled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Succeeded => write!(f, "succeeded"),
            OperationState::Failed { .. } => write!(f, "failed"),
            OperationState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Handle to an asynchronous remote operation
///
/// The handle does not poll by itself: a driver (see [`crate::Poller`])
/// fetches a status and feeds it to [`OperationHandle::advance`]. Terminal
/// states are absorbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    id: String,
    status_url: String,
    state: OperationState,
    polls: u32,
    retry_after: Option<Duration>,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>, status_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_url: status_url.into(),
            state: OperationState::Pending,
            polls: 0,
            retry_after: None,
        }
    }

    /// Server-suggested delay before the first poll
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    /// Number of statuses applied so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply one polled status
    pub fn advance(&mut self, status: OperationStatus) -> &OperationState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.polls += 1;
        match status {
            OperationStatus::InProgress { retry_after } => {
                self.retry_after = retry_after;
            }
            OperationStatus::Succeeded => self.state = OperationState::Succeeded,
            OperationStatus::Failed { code, message } => {
                self.state = OperationState::Failed { code, message }
            }
            OperationStatus::Canceled => self.state = OperationState::Canceled,
        }
        &self.state
    }
}

/// Polling cadence for long-running operations
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay before the second poll
    pub initial_interval: Duration,

    /// Upper bound for any single delay
    pub max_interval: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    /// Constant interval without growth
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial = self.initial_interval.as_millis() as f64;
        let max = self.max_interval.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = initial * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(max) as u64)
    }

    /// Delay after `attempt`, preferring a server hint clamped to the configured bounds
    pub fn next_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.max(self.initial_interval).min(self.max_interval),
            None => self.delay_for_attempt(attempt),
        }
    }
}
