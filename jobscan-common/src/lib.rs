//! # jobscan Common Library
//!
//! Shared code for the jobscan client crates including:
//! - Wire types for the processing backend and spreadsheet collaborator
//! - Real-time channel messages (progress events, room join/leave)
//! - UI event types and the EventBus
//! - Configuration loading
//! - Human-readable size formatting

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod human_size;

pub use error::{Error, Result};
