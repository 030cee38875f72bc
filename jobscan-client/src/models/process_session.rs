//! Process session (one upload batch and its progress stream)
//!
//! Created when a process id is allocated; discarded when the user starts a
//! new session or leaves. Owned by the upload controller.

use chrono::{DateTime, Utc};
use jobscan_common::events::{SessionStatus, Step};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque server-issued process identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// In-memory session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSession {
    pub process_id: ProcessId,

    pub status: SessionStatus,

    /// Last step reported by the backend
    pub current_step: Option<Step>,

    /// Progress percentage (0-100, non-decreasing while active)
    pub progress: f64,

    /// Human-readable status description
    pub description: String,

    pub started_at: DateTime<Utc>,

    /// Set when the session reaches Complete or Failed
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProcessSession {
    pub fn new(process_id: ProcessId) -> Self {
        Self {
            process_id,
            status: SessionStatus::Created,
            current_step: None,
            progress: 0.0,
            description: String::from("Initializing..."),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a new status, stamping the end time for terminal ones
    pub fn transition_to(&mut self, status: SessionStatus) {
        self.status = status;
        if matches!(status, SessionStatus::Complete | SessionStatus::Failed) {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Record an accepted progress update
    ///
    /// Percentage is clamped to 0-100 and never moves backwards. The first
    /// step past upload marks the session as processing.
    pub fn record_progress(&mut self, step: Option<Step>, percentage: f64, description: &str) {
        if self.is_terminal() {
            return;
        }
        self.progress = self.progress.max(percentage.clamp(0.0, 100.0));
        if let Some(step) = step {
            self.current_step = Some(step);
            if step > Step::Upload && self.status == SessionStatus::Uploading {
                self.status = SessionStatus::Processing;
            }
        }
        if !description.is_empty() {
            self.description = description.to_string();
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SessionStatus::Complete | SessionStatus::Failed)
    }
}
