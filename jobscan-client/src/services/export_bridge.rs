//! Results export bridge
//!
//! Sends a process id to the backend's spreadsheet export endpoint. Every call
//! creates a new spreadsheet, so only one request may be outstanding and the
//! panel's submit control stays disabled until it reaches a terminal outcome.

use crate::error::{ClientError, ClientResult};
use crate::services::backend_client::{BackendError, ProcessingBackend};
use crate::services::notifications::NotificationSurface;
use chrono::Utc;
use jobscan_common::api::{ExportRequest, ExportResponse};
use jobscan_common::events::{EventBus, UiEvent};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

const GENERIC_FAILURE: &str = "Export failed";

/// Terminal outcome of one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub success: bool,
    pub message: String,
    pub jobs_sent: Option<u64>,
    pub spreadsheet_url: Option<String>,
}

impl ExportResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            jobs_sent: None,
            spreadsheet_url: None,
        }
    }

    fn from_response(body: ExportResponse) -> Self {
        if body.success {
            Self {
                success: true,
                message: body
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Spreadsheet created".to_string()),
                jobs_sent: body.jobs_sent,
                spreadsheet_url: body.spreadsheet_url.filter(|url| !url.is_empty()),
            }
        } else {
            let message = body
                .error
                .filter(|e| !e.is_empty())
                .or(body.message.filter(|m| !m.is_empty()))
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            Self::failure(message)
        }
    }

    fn from_error(err: BackendError) -> Self {
        match err {
            BackendError::Network(e) => Self::failure(format!("Network error: {}", e)),
            BackendError::Status(code, _) => {
                Self::failure(format!("{} (HTTP {})", GENERIC_FAILURE, code))
            }
            other => Self::failure(format!("{}: {}", GENERIC_FAILURE, other)),
        }
    }

    /// Turn a failed outcome into an [`ClientError::Export`]
    pub fn into_result(self) -> ClientResult<ExportResult> {
        if self.success {
            Ok(self)
        } else {
            Err(ClientError::Export(self.message))
        }
    }
}

/// Export controls as the user sees them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportPanel {
    pub submit_enabled: bool,
    pub main_content_visible: bool,
    /// Request outstanding
    pub sending: bool,
    pub last_result: Option<ExportResult>,
}

impl Default for ExportPanel {
    fn default() -> Self {
        Self {
            submit_enabled: true,
            main_content_visible: true,
            sending: false,
            last_result: None,
        }
    }
}

/// Spreadsheet export bridge
pub struct ExportBridge {
    backend: Arc<dyn ProcessingBackend>,
    /// Destination used when the caller gives no override
    default_url: Option<String>,
    panel: Mutex<ExportPanel>,
    notifications: NotificationSurface,
    event_bus: EventBus,
}

impl ExportBridge {
    pub fn new(
        backend: Arc<dyn ProcessingBackend>,
        default_url: Option<String>,
        notifications: NotificationSurface,
        event_bus: EventBus,
    ) -> Self {
        Self {
            backend,
            default_url,
            panel: Mutex::new(ExportPanel::default()),
            notifications,
            event_bus,
        }
    }

    pub fn panel(&self) -> ExportPanel {
        self.lock().clone()
    }

    /// Restore the panel to its initial state
    ///
    /// Ignored while a request is outstanding.
    pub fn reset_panel(&self) {
        let mut panel = self.lock();
        if !panel.sending {
            *panel = ExportPanel::default();
        }
    }

    /// Export a process's records
    ///
    /// Fails with [`ClientError::ExportInProgress`] without sending anything
    /// when another export is outstanding. Otherwise resolves to the terminal
    /// outcome, which has already been posted as one notification.
    pub async fn export(
        &self,
        process_id: &str,
        override_url: Option<&str>,
    ) -> ClientResult<ExportResult> {
        {
            let mut panel = self.lock();
            if panel.sending {
                warn!(process_id = %process_id, "Export rejected, one is already in progress");
                return Err(ClientError::ExportInProgress);
            }
            panel.sending = true;
            panel.submit_enabled = false;
            panel.main_content_visible = false;
        }
        let guard = SendingGuard {
            bridge: self,
            process_id,
            armed: true,
        };

        let apps_script_url = override_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_url.clone());
        let request = ExportRequest { apps_script_url };

        info!(
            process_id = %process_id,
            override_url = request.apps_script_url.is_some(),
            "Exporting results to spreadsheet"
        );

        let result = match self.backend.send_to_spreadsheet(process_id, &request).await {
            Ok(body) => ExportResult::from_response(body),
            Err(e) => ExportResult::from_error(e),
        };
        guard.disarm();

        {
            let mut panel = self.lock();
            panel.sending = false;
            panel.submit_enabled = true;
            if !result.success {
                panel.main_content_visible = true;
            }
            panel.last_result = Some(result.clone());
        }

        if result.success {
            let mut text = result.message.clone();
            if let Some(jobs) = result.jobs_sent {
                text.push_str(&format!(" ({} records)", jobs));
            }
            self.notifications.success(text);
        } else {
            self.notifications.error(result.message.clone());
        }

        self.event_bus.emit_lossy(UiEvent::ExportFinished {
            process_id: process_id.to_string(),
            success: result.success,
            message: result.message.clone(),
            spreadsheet_url: result.spreadsheet_url.clone(),
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    fn lock(&self) -> MutexGuard<'_, ExportPanel> {
        self.panel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Gives the controls back if an export future is dropped while sending
struct SendingGuard<'a> {
    bridge: &'a ExportBridge,
    process_id: &'a str,
    armed: bool,
}

impl SendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(process_id = %self.process_id, "Export dropped before the server answered");
        let mut panel = self.bridge.lock();
        panel.sending = false;
        panel.submit_enabled = true;
        panel.main_content_visible = true;
    }
}
