//! Real-time progress channel transport
//!
//! [`ProgressChannel`] hides the transport from the subscriber. The shipped
//! implementation speaks Socket.IO to the backend's default namespace:
//!
//! - inbound `progress_update` events carry one JSON [`ProgressEvent`]
//! - outbound `join_process`, `leave_process` and `get_progress` carry
//!   `{"process_id": ...}`
//!
//! The event stream ending means the server closed the connection; an item
//! error means the transport failed.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use futures::FutureExt;
use jobscan_common::events::{ClientMessage, ProgressEvent, PROGRESS_UPDATE_EVENT};
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload};
use serde_json::json;
use std::sync::{Mutex, MutexGuard};

/// Inbound progress events of one open connection
pub type ProgressStream = BoxStream<'static, ClientResult<ProgressEvent>>;

/// Transport carrying room messages out and progress events in
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Open a connection
    ///
    /// Resolves once the server accepted the connection. Callers bound this
    /// with their connect timeout.
    async fn connect(&self) -> ClientResult<ProgressStream>;

    /// Send one client message over the channel
    async fn emit(&self, message: &ClientMessage) -> ClientResult<()>;

    /// Close the current connection, if any
    async fn disconnect(&self) {}
}

/// Progress events carried by one `progress_update` payload
///
/// Malformed entries are logged and skipped.
pub fn decode_payload(payload: Payload) -> Vec<ProgressEvent> {
    let values = match payload {
        Payload::Text(values) => values,
        other => {
            tracing::warn!(payload = ?other, "Discarding non-JSON progress payload");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ProgressEvent>(value.clone()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, data = %value, "Discarding malformed progress event");
                None
            }
        })
        .collect()
}

/// Socket.IO transport
pub struct SocketIoProgressChannel {
    server_url: String,
    client: Mutex<Option<Client>>,
}

impl SocketIoProgressChannel {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            client: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock_client().is_some()
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<Client>> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProgressChannel for SocketIoProgressChannel {
    async fn connect(&self) -> ClientResult<ProgressStream> {
        tracing::debug!(url = %self.server_url, "Opening progress channel");

        let (tx, rx) = mpsc::unbounded::<ClientResult<ProgressEvent>>();
        let on_update = tx.clone();
        let on_close = tx.clone();
        let on_error = tx;

        let client = ClientBuilder::new(self.server_url.as_str())
            .reconnect(false)
            .on(PROGRESS_UPDATE_EVENT, move |payload: Payload, _client: Client| {
                let tx = on_update.clone();
                async move {
                    for event in decode_payload(payload) {
                        let _ = tx.unbounded_send(Ok(event));
                    }
                }
                .boxed()
            })
            .on(Event::Close, move |_payload: Payload, _client: Client| {
                let tx = on_close.clone();
                async move { tx.close_channel() }.boxed()
            })
            .on(Event::Error, move |payload: Payload, _client: Client| {
                let tx = on_error.clone();
                async move {
                    let _ = tx.unbounded_send(Err(ClientError::Connection(format!("{:?}", payload))));
                    tx.close_channel();
                }
                .boxed()
            })
            .connect()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let previous = self.lock_client().replace(client);
        if let Some(previous) = previous {
            if let Err(e) = previous.disconnect().await {
                tracing::debug!(error = %e, "Previous progress connection already closed");
            }
        }

        Ok(rx.boxed())
    }

    async fn emit(&self, message: &ClientMessage) -> ClientResult<()> {
        let client = self
            .lock_client()
            .clone()
            .ok_or_else(|| ClientError::Connection("progress channel not connected".to_string()))?;

        client
            .emit(message.event_name(), json!({ "process_id": message.process_id() }))
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        tracing::debug!(
            event = message.event_name(),
            process_id = %message.process_id(),
            "Sent channel message"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        let client = self.lock_client().take();
        if let Some(client) = client {
            if let Err(e) = client.disconnect().await {
                tracing::debug!(error = %e, "Progress connection already closed");
            }
        }
    }
}
