//! Upload session controller
//!
//! Drives one submission through
//! `Idle → RequestingId → Submitting → AwaitingCompletion → {Complete | Failed}`.
//! Only one submission may be active per controller. A failed submission
//! returns to `Idle` with the file selection kept for a retry.
//!
//! The controller owns the active process id and publishes it through a
//! `watch` channel; the progress subscriber reads it to filter events.

use crate::error::{ClientError, ClientResult};
use crate::models::{FileSelection, ProcessId, ProcessSession, SelectedFile, SelectionStats};
use crate::services::backend_client::ProcessingBackend;
use crate::services::file_validator::{FileValidator, ValidationOutcome};
use crate::services::notifications::NotificationSurface;
use crate::services::progress_subscriber::ProgressTracker;
use chrono::Utc;
use jobscan_common::api::UploadOptions;
use jobscan_common::events::{ControllerState, EventBus, SessionStatus, UiEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a completed submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub process_id: ProcessId,
    /// Where the upload response resolved to; the results view
    pub results_url: String,
}

#[derive(Debug)]
struct ControllerInner {
    state: ControllerState,
    selection: FileSelection,
    /// Whether the most recent validation accepted its candidates
    selection_accepted: bool,
    credential: Option<String>,
    options: UploadOptions,
    session: Option<ProcessSession>,
    cancel: Option<CancellationToken>,
}

impl ControllerInner {
    /// Reason the current inputs cannot be submitted, if any
    fn missing_input(&self) -> Option<&'static str> {
        if self.selection.is_empty() {
            return Some("Select at least one file before submitting");
        }
        if !self.selection_accepted {
            return Some("Fix the rejected file selection before submitting");
        }
        let has_key = self
            .credential
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !has_key {
            return Some("Set an API key before submitting");
        }
        None
    }
}

/// Upload session controller
pub struct UploadController {
    inner: Mutex<ControllerInner>,
    validator: FileValidator,
    backend: Arc<dyn ProcessingBackend>,
    tracker: Arc<dyn ProgressTracker>,
    active_id: watch::Sender<Option<ProcessId>>,
    notifications: NotificationSurface,
    event_bus: EventBus,
}

impl UploadController {
    pub fn new(
        validator: FileValidator,
        backend: Arc<dyn ProcessingBackend>,
        tracker: Arc<dyn ProgressTracker>,
        active_id: watch::Sender<Option<ProcessId>>,
        notifications: NotificationSurface,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Mutex::new(ControllerInner {
                state: ControllerState::Idle,
                selection: FileSelection::default(),
                selection_accepted: false,
                credential: None,
                options: UploadOptions::default(),
                session: None,
                cancel: None,
            }),
            validator,
            backend,
            tracker,
            active_id,
            notifications,
            event_bus,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.lock().state
    }

    pub fn selection(&self) -> FileSelection {
        self.lock().selection.clone()
    }

    /// Current process session, if one exists
    pub fn session(&self) -> Option<ProcessSession> {
        self.lock().session.clone()
    }

    /// Process id currently published to the subscriber
    pub fn active_process_id(&self) -> Option<ProcessId> {
        self.active_id.borrow().clone()
    }

    /// Validate candidates and make them the selection if accepted
    ///
    /// An empty candidate set is ignored. A rejection keeps the previous
    /// selection and blocks submission until a later selection is accepted.
    pub fn select_files(&self, candidates: Vec<SelectedFile>) -> ClientResult<SelectionStats> {
        if candidates.is_empty() {
            return Ok(self.lock().selection.stats());
        }

        match self.validator.validate(&candidates) {
            ValidationOutcome::Accepted(selection) => {
                let stats = selection.stats();
                {
                    let mut inner = self.lock();
                    inner.selection = selection;
                    inner.selection_accepted = true;
                }
                info!(files = stats.count, total = %stats.total_display, "Files selected");
                self.notifications
                    .success(format!("Selected {} file(s)", stats.count));
                Ok(stats)
            }
            ValidationOutcome::Rejected(reasons) => {
                self.lock().selection_accepted = false;
                let err = ClientError::InputValidation(reasons);
                self.notifications.error(err.to_string());
                Err(err)
            }
        }
    }

    /// Remove a file by position
    pub fn remove_file(&self, index: usize) -> Option<SelectedFile> {
        let removed = self.lock().selection.remove(index);
        if let Some(file) = &removed {
            debug!(index, name = %file.name, "Removed file from selection");
        }
        removed
    }

    pub fn set_credential(&self, key: impl Into<String>) {
        self.lock().credential = Some(key.into());
    }

    pub fn set_options(&self, options: UploadOptions) {
        self.lock().options = options;
    }

    /// Cancel the active submission
    ///
    /// Returns false when nothing is in flight.
    pub fn cancel(&self) -> bool {
        match &self.lock().cancel {
            Some(token) => {
                info!("Cancelling active submission");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the current session
    ///
    /// An active submission is cancelled and cleans up after itself; a
    /// completed one is discarded and the controller returns to `Idle`.
    pub fn discard_session(&self) {
        if self.cancel() {
            return;
        }
        let mut inner = self.lock();
        if inner.state == ControllerState::Complete {
            self.transition(&mut inner, ControllerState::Idle);
        }
        inner.session = None;
        drop(inner);
        self.active_id.send_replace(None);
    }

    /// Submit the current selection (`user_submitted`)
    ///
    /// Dropping the returned future before it settles cancels the submission:
    /// the active id is cleared, the room is left and the controller returns
    /// to `Idle` with the selection intact.
    pub async fn submit(&self) -> ClientResult<SubmissionOutcome> {
        let (selection, api_key, options, cancel) = {
            let mut inner = self.lock();

            if let Some(reason) = inner.missing_input() {
                drop(inner);
                self.notifications.warning(reason);
                return Err(ClientError::MissingInput(reason.to_string()));
            }
            if inner.state.is_active() {
                warn!(state = ?inner.state, "Submission rejected, session already active");
                return Err(ClientError::SessionBusy);
            }

            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            inner.session = None;
            self.transition(&mut inner, ControllerState::RequestingId);

            let api_key = inner.credential.clone().unwrap_or_default();
            (inner.selection.clone(), api_key, inner.options, cancel)
        };

        let guard = SubmissionGuard {
            controller: self,
            cancel: cancel.clone(),
            armed: true,
        };
        let result = self.run_submission(&selection, &api_key, options, &cancel).await;
        guard.disarm();
        result
    }

    async fn run_submission(
        &self,
        selection: &FileSelection,
        api_key: &str,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> ClientResult<SubmissionOutcome> {
        self.tracker.reset();

        let allocated = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::UploadFailed("cancelled by user".to_string())),
            result = self.register_and_allocate(api_key) => result,
        };
        let process_id = match allocated {
            Ok(id) => id,
            Err(err) => return Err(self.fail(None, err).await),
        };

        {
            let mut inner = self.lock();
            inner.session = Some(ProcessSession::new(process_id.clone()));
            self.active_id.send_replace(Some(process_id.clone()));
            self.transition(&mut inner, ControllerState::Submitting);
        }

        self.tracker.join(&process_id).await;

        {
            let mut inner = self.lock();
            if let Some(session) = inner.session.as_mut() {
                session.transition_to(SessionStatus::Uploading);
            }
            self.transition(&mut inner, ControllerState::AwaitingCompletion);
        }

        let uploaded = self.await_upload(&process_id, selection, options, cancel).await;

        match uploaded {
            Ok(results_url) => {
                self.tracker.force_complete(&process_id);
                self.tracker.leave(&process_id).await;
                self.active_id.send_replace(None);
                {
                    let mut inner = self.lock();
                    if let Some(session) = inner.session.as_mut() {
                        session.record_progress(None, 100.0, "");
                        session.transition_to(SessionStatus::Complete);
                    }
                    inner.cancel = None;
                    self.transition(&mut inner, ControllerState::Complete);
                }
                info!(process_id = %process_id, results_url = %results_url, "Processing complete");
                Ok(SubmissionOutcome {
                    process_id,
                    results_url,
                })
            }
            Err(err) => Err(self.fail(Some(&process_id), err).await),
        }
    }

    /// Register the key with the backend session, then allocate a process id
    async fn register_and_allocate(&self, api_key: &str) -> ClientResult<ProcessId> {
        self.backend
            .set_api_key(api_key)
            .await
            .map_err(|e| ClientError::Credential(e.to_string()))?;
        self.backend
            .create_process_id()
            .await
            .map_err(|e| ClientError::IdAllocation(e.to_string()))
    }

    /// Wait for the upload while mirroring accepted progress onto the session
    async fn await_upload(
        &self,
        process_id: &ProcessId,
        selection: &FileSelection,
        options: UploadOptions,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let mut events = self.event_bus.subscribe();
        let upload = self.backend.upload(process_id, selection, options);
        tokio::pin!(upload);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ClientError::UploadFailed("cancelled by user".to_string()));
                }
                result = &mut upload => {
                    return result.map_err(|e| ClientError::UploadFailed(e.to_string()));
                }
                received = events.recv() => match received {
                    Ok(UiEvent::ProgressChanged { process_id: id, percentage, step, description, .. })
                        if id == process_id.as_str() =>
                    {
                        let mut inner = self.lock();
                        if let Some(session) = inner.session.as_mut() {
                            session.record_progress(step, percentage, &description);
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        // Bus gone; stop mirroring and wait for the upload
                        return upload.await.map_err(|e| ClientError::UploadFailed(e.to_string()));
                    }
                },
            }
        }
    }

    /// Failure path shared by allocation and upload errors
    ///
    /// Posts exactly one error notification, leaves the room, clears the
    /// active id and returns to `Idle` with the selection intact.
    async fn fail(&self, process_id: Option<&ProcessId>, err: ClientError) -> ClientError {
        warn!(
            process_id = ?process_id.map(|id| id.as_str()),
            error = %err,
            "Submission failed"
        );

        {
            let mut inner = self.lock();
            if let Some(session) = inner.session.as_mut() {
                session.transition_to(SessionStatus::Failed);
            }
            self.transition(&mut inner, ControllerState::Failed);
        }
        self.notifications.error(err.to_string());

        if let Some(id) = process_id {
            self.tracker.leave(id).await;
        }
        self.active_id.send_replace(None);

        {
            let mut inner = self.lock();
            inner.session = None;
            inner.cancel = None;
            self.transition(&mut inner, ControllerState::Idle);
        }
        err
    }

    /// Synchronous reset for a submission whose future was dropped
    fn abandon(&self) {
        let process_id = self.active_id.send_replace(None);
        warn!(
            process_id = ?process_id.as_ref().map(|id| id.as_str()),
            "Submission dropped before it settled"
        );

        {
            let mut inner = self.lock();
            if let Some(session) = inner.session.as_mut() {
                session.transition_to(SessionStatus::Failed);
            }
            inner.session = None;
            inner.cancel = None;
            if inner.state != ControllerState::Idle {
                self.transition(&mut inner, ControllerState::Idle);
            }
        }

        // Leaving needs the channel; only possible while a runtime is around
        if let (Some(id), Ok(handle)) = (process_id, tokio::runtime::Handle::try_current()) {
            let tracker = self.tracker.clone();
            handle.spawn(async move { tracker.leave(&id).await });
        }
    }

    fn transition(&self, inner: &mut ControllerInner, new_state: ControllerState) {
        let old_state = inner.state;
        inner.state = new_state;
        let process_id = inner.session.as_ref().map(|s| s.process_id.to_string());

        info!(
            process_id = ?process_id,
            old_state = ?old_state,
            new_state = ?new_state,
            "Controller state transition"
        );

        self.event_bus.emit_lossy(UiEvent::SessionStateChanged {
            process_id,
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resets the controller when a submission future is dropped mid-flight
struct SubmissionGuard<'a> {
    controller: &'a UploadController,
    cancel: CancellationToken,
    armed: bool,
}

impl SubmissionGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            self.controller.abandon();
        }
    }
}
