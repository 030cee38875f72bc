//! Data models for the upload/progress/export session

pub mod process_session;
pub mod progress_view;
pub mod selected_file;

pub use process_session::{ProcessId, ProcessSession};
pub use progress_view::{classify_description, ProgressView};
pub use selected_file::{mime_from_extension, FileSelection, FileSource, SelectedFile, SelectionStats};
