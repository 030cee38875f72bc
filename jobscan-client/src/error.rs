//! Error types for jobscan-client
//!
//! Local validation errors never leave the validator/controller. Remote errors
//! are caught where the call is made and turned into a notification plus,
//! for the upload flow, a transition to `Failed`.

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// File selection rejected by the validator (never sent to the server)
    #[error("Invalid selection: {}", .0.join("; "))]
    InputValidation(Vec<String>),

    /// Required input missing before submission
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// A submission is already in flight
    #[error("An upload session is already active")]
    SessionBusy,

    /// The backend refused or could not register the API key
    #[error("API key rejected: {0}")]
    Credential(String),

    /// Process id allocation failed
    #[error("Could not allocate a process id: {0}")]
    IdAllocation(String),

    /// Upload request failed or was rejected
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Spreadsheet export failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Results archive download failed
    #[error("Download failed: {0}")]
    Download(String),

    /// An export request is already outstanding
    #[error("An export is already in progress")]
    ExportInProgress,

    /// Real-time channel error
    #[error("Connection error: {0}")]
    Connection(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// jobscan-common error
    #[error("Common error: {0}")]
    Common(#[from] jobscan_common::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
