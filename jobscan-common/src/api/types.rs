//! Shared API request/response types
//!
//! Contracts consumed by the client:
//! - `POST /set_api_key` (multipart `api_key`) → [`SetApiKeyResponse`]
//! - `POST /create_process_id` → [`CreateProcessIdResponse`]
//! - `POST /upload` (multipart, fields from [`UploadOptions`])
//! - `POST /send_to_spreadsheet/{process_id}` ([`ExportRequest`] → [`ExportResponse`])
//! - `GET /download/{process_id}?include=...` → ZIP archive of [`DOWNLOAD_ITEMS`]
//! - Spreadsheet collaborator ([`SpreadsheetPayload`] → [`SpreadsheetResponse`])

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action name understood by the spreadsheet collaborator
pub const ADD_JOBS_ACTION: &str = "addJobs";

/// Source tag sent in spreadsheet metadata
pub const EXPORT_SOURCE: &str = "newspaper_job_extractor";

/// One extracted record, column name → value
pub type JobRecord = BTreeMap<String, String>;

// ========================================
// Processing Backend Types
// ========================================

/// Response of `POST /set_api_key`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SetApiKeyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Items the results archive can contain
pub const DOWNLOAD_ITEMS: &[&str] = &[
    "csv",
    "sql",
    "images",
    "descriptions",
    "processing_steps",
    "readme",
];

/// Response of `POST /create_process_id`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateProcessIdResponse {
    /// Opaque server-issued identifier
    pub process_id: String,
}

/// Processing options submitted alongside the files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadOptions {
    /// Detect and correct page orientation before analysis
    pub auto_rotate: bool,
    /// Analyze images concurrently on the backend
    pub parallel_process: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            parallel_process: true,
        }
    }
}

// ========================================
// Export Types
// ========================================

/// Body of `POST /send_to_spreadsheet/{process_id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportRequest {
    /// Override destination; the backend default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps_script_url: Option<String>,
}

/// Response of `POST /send_to_spreadsheet/{process_id}`
///
/// Failure payloads usually carry only `error`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub jobs_sent: Option<u64>,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ========================================
// Spreadsheet Collaborator Types
// ========================================

/// Request accepted by the spreadsheet collaborator
///
/// Each accepted request creates a new spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpreadsheetPayload {
    /// Always [`ADD_JOBS_ACTION`]
    pub action: String,
    pub jobs: Vec<JobRecord>,
    pub metadata: SpreadsheetMetadata,
}

/// Metadata attached to a spreadsheet request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpreadsheetMetadata {
    pub process_id: String,
    pub source: String,
    pub total_jobs: usize,
    /// RFC 3339 creation time
    pub timestamp: String,
}

impl SpreadsheetPayload {
    /// Build an `addJobs` payload for a process
    pub fn add_jobs(process_id: impl Into<String>, jobs: Vec<JobRecord>) -> Self {
        let total_jobs = jobs.len();
        Self {
            action: ADD_JOBS_ACTION.to_string(),
            jobs,
            metadata: SpreadsheetMetadata {
                process_id: process_id.into(),
                source: EXPORT_SOURCE.to_string(),
                total_jobs,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Response returned by the spreadsheet collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpreadsheetResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub jobs_added: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}
