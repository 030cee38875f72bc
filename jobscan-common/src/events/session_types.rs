//! Upload session and notification type definitions

use serde::{Deserialize, Serialize};

/// Upload controller state machine
///
/// `Idle → RequestingId → Submitting → AwaitingCompletion → {Complete | Failed}`.
/// `Failed` is transient: the controller reports it and returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    RequestingId,
    Submitting,
    AwaitingCompletion,
    Complete,
    Failed,
}

impl ControllerState {
    /// A submission is in flight
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ControllerState::RequestingId
                | ControllerState::Submitting
                | ControllerState::AwaitingCompletion
        )
    }
}

/// Lifecycle status of a process session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Created,
    Uploading,
    Processing,
    Complete,
    Failed,
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Real-time channel connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Reconnecting,
    Disconnected,
    /// Reconnect attempts exhausted; no further automatic retries
    GaveUp,
}
