//! Client services

pub mod backend_client;
pub mod export_bridge;
pub mod file_validator;
pub mod notifications;
pub mod progress_channel;
pub mod progress_subscriber;
pub mod reconnect;
pub mod records;
pub mod spreadsheet_client;
pub mod upload_controller;

pub use backend_client::{BackendError, HttpBackend, ProcessingBackend};
pub use export_bridge::{ExportBridge, ExportPanel, ExportResult};
pub use file_validator::{FileValidator, ValidationOutcome, ALLOWED_MIME_TYPES};
pub use notifications::{Notification, NotificationSurface};
pub use progress_channel::{decode_payload, ProgressChannel, ProgressStream, SocketIoProgressChannel};
pub use progress_subscriber::{DisconnectReason, ProgressSubscriber, ProgressTracker};
pub use reconnect::ReconnectPolicy;
pub use spreadsheet_client::SpreadsheetClient;
pub use upload_controller::{SubmissionOutcome, UploadController};
