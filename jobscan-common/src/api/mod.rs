//! API module for shared HTTP contract types
//!
//! # Design Principle
//!
//! This module contains ONLY serde types describing the request/response
//! shapes of the processing backend and the spreadsheet collaborator. The
//! client crate wraps them with its HTTP transport.

pub mod types;

pub use types::{
    CreateProcessIdResponse, ExportRequest, ExportResponse, JobRecord, SpreadsheetMetadata,
    SetApiKeyResponse, SpreadsheetPayload, SpreadsheetResponse, UploadOptions, ADD_JOBS_ACTION,
    DOWNLOAD_ITEMS, EXPORT_SOURCE,
};
