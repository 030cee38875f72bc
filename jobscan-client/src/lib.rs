//! jobscan-client library interface
//!
//! Upload, progress and export session for the document-processing backend.
//! [`ClientContext`] wires one controller, one progress subscriber, one export
//! bridge and one notification surface around a shared event bus.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ClientError, ClientResult};

use crate::config::ClientConfig;
use crate::services::{
    ExportBridge, FileValidator, HttpBackend, NotificationSurface, ProcessingBackend,
    ProgressChannel, ProgressSubscriber, ReconnectPolicy, SocketIoProgressChannel, UploadController,
};
use jobscan_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// UI event buffer per subscriber
const EVENT_BUS_CAPACITY: usize = 256;

/// Everything one client session needs
///
/// Dropping the context stops the progress channel and cancels any
/// submission in flight. Nothing is sent to the server on drop.
pub struct ClientContext<C: ProgressChannel + 'static = SocketIoProgressChannel> {
    pub config: ClientConfig,
    pub event_bus: EventBus,
    pub notifications: NotificationSurface,
    pub backend: Arc<dyn ProcessingBackend>,
    pub controller: Arc<UploadController>,
    pub subscriber: Arc<ProgressSubscriber<C>>,
    pub export: Arc<ExportBridge>,
}

impl ClientContext<SocketIoProgressChannel> {
    /// Build a context talking HTTP and Socket.IO to `config.server_url`
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let backend = HttpBackend::new(&config.server_url)
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let channel = SocketIoProgressChannel::new(config.server_url.clone());
        Ok(Self::with_parts(config, Arc::new(backend), Arc::new(channel)))
    }
}

impl<C: ProgressChannel + 'static> ClientContext<C> {
    /// Build a context around explicit transports
    pub fn with_parts(
        config: ClientConfig,
        backend: Arc<dyn ProcessingBackend>,
        channel: Arc<C>,
    ) -> Self {
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let notifications = NotificationSurface::new(&config.notifications, event_bus.clone());
        let (active_id_tx, active_id_rx) = watch::channel(None);

        let subscriber = Arc::new(ProgressSubscriber::new(
            channel,
            active_id_rx,
            ReconnectPolicy::from_config(&config.channel),
            Duration::from_millis(config.channel.connect_timeout_ms),
            notifications.clone(),
            event_bus.clone(),
        ));

        let controller = Arc::new(UploadController::new(
            FileValidator::new(config.limits.clone()),
            backend.clone(),
            subscriber.clone(),
            active_id_tx,
            notifications.clone(),
            event_bus.clone(),
        ));
        if let Some(key) = &config.api_key {
            controller.set_credential(key.clone());
        }

        let export = Arc::new(ExportBridge::new(
            backend.clone(),
            config.apps_script_url.clone(),
            notifications.clone(),
            event_bus.clone(),
        ));

        Self {
            config,
            event_bus,
            notifications,
            backend,
            controller,
            subscriber,
            export,
        }
    }

    /// Run the progress channel in the background
    ///
    /// A panic inside the channel loop is reported as a notification instead
    /// of taking the session down.
    pub fn start_progress_channel(&self) -> JoinHandle<()> {
        let subscriber = self.subscriber.clone();
        let notifications = self.notifications.clone();
        tokio::spawn(async move {
            let task = tokio::spawn(async move { subscriber.run().await });
            if let Err(e) = task.await {
                notifications.report_uncaught(&e);
            }
        })
    }
}

impl<C: ProgressChannel + 'static> Drop for ClientContext<C> {
    fn drop(&mut self) {
        self.subscriber.shutdown();
        self.controller.cancel();
    }
}
