//! Real-time progress channel type definitions
//!
//! Messages exchanged with the processing backend over the progress channel.
//! Client → server messages scope the stream to one process room; the server
//! pushes `progress_update` events tagged with the process they belong to.

use serde::{Deserialize, Serialize};

/// Server event name for progress updates
pub const PROGRESS_UPDATE_EVENT: &str = "progress_update";

/// Progress update pushed by the backend
///
/// Transient: consumed by the subscriber as soon as it arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Process this update belongs to
    pub process_id: String,
    /// Step name (`upload`, `process`, `analyze`, `complete`, or `error`)
    pub step: String,
    /// Reported percentage; may be negative or fractional
    pub progress: f64,
    /// Human-readable status text
    #[serde(default)]
    pub description: String,
    /// Explicit retry classification, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
}

/// Client → server channel messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a process room
    JoinProcess { process_id: String },
    /// Unsubscribe from a process room
    LeaveProcess { process_id: String },
    /// Ask the server to replay the latest known progress
    GetProgress { process_id: String },
}

impl ClientMessage {
    /// Wire event name
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinProcess { .. } => "join_process",
            ClientMessage::LeaveProcess { .. } => "leave_process",
            ClientMessage::GetProgress { .. } => "get_progress",
        }
    }

    /// Process the message refers to
    pub fn process_id(&self) -> &str {
        match self {
            ClientMessage::JoinProcess { process_id }
            | ClientMessage::LeaveProcess { process_id }
            | ClientMessage::GetProgress { process_id } => process_id,
        }
    }
}

/// Fixed ordered list of processing steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Upload,
    Process,
    Analyze,
    Complete,
}

impl Step {
    /// All steps in display order
    pub const ALL: [Step; 4] = [Step::Upload, Step::Process, Step::Analyze, Step::Complete];

    /// Map a wire step name onto the step list
    ///
    /// Returns `None` for names outside the list (e.g. `error`), which leave
    /// the step display untouched.
    pub fn from_wire(name: &str) -> Option<Step> {
        match name {
            "upload" => Some(Step::Upload),
            "process" => Some(Step::Process),
            "analyze" => Some(Step::Analyze),
            "complete" => Some(Step::Complete),
            _ => None,
        }
    }

    /// Position in the step list
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Upload => "upload",
            Step::Process => "process",
            Step::Analyze => "analyze",
            Step::Complete => "complete",
        }
    }
}

/// Display status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
}

/// Presentation mode for a progress description
///
/// Purely for user feedback; has no effect on control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionMode {
    /// Regular status text
    Normal,
    /// Backend is waiting out a rate limit or backoff before retrying
    RateLimitWait,
    /// Backend is actively retrying a failed operation
    Retrying,
}
