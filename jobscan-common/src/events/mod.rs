//! Event types for the jobscan event system
//!
//! Provides the UI event definitions and the EventBus that carries them from
//! the controller, subscriber, export bridge and notification surface to any
//! renderer (the CLI, or an embedding application).

// Sub-modules (supporting types)
mod progress_types;
mod session_types;

pub use progress_types::{
    ClientMessage, DescriptionMode, ProgressEvent, Step, StepStatus, PROGRESS_UPDATE_EVENT,
};
pub use session_types::{ChannelStatus, ControllerState, SessionStatus, Severity};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// UI event types
///
/// Events are broadcast via EventBus; every variant serializes with a `type`
/// tag so renderers can forward them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    /// Upload controller changed state
    SessionStateChanged {
        /// Active process, if one has been allocated
        process_id: Option<String>,
        old_state: ControllerState,
        new_state: ControllerState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress display changed after an accepted event
    ProgressChanged {
        process_id: String,
        /// Displayed percentage (0-100, never decreasing within a session)
        percentage: f64,
        /// Current step, when the event named one from the step list
        step: Option<Step>,
        description: String,
        mode: DescriptionMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Notification added to the surface
    NotificationPosted {
        id: u64,
        severity: Severity,
        message: String,
        /// False for persistent notifications
        expires: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Spreadsheet export reached a terminal outcome
    ExportFinished {
        process_id: String,
        success: bool,
        message: String,
        spreadsheet_url: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Real-time channel connection status changed
    ChannelStatusChanged {
        status: ChannelStatus,
        /// Consecutive failed connection attempts so far
        attempts: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl UiEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            UiEvent::SessionStateChanged { .. } => "SessionStateChanged",
            UiEvent::ProgressChanged { .. } => "ProgressChanged",
            UiEvent::NotificationPosted { .. } => "NotificationPosted",
            UiEvent::ExportFinished { .. } => "ExportFinished",
            UiEvent::ChannelStatusChanged { .. } => "ChannelStatusChanged",
        }
    }
}

/// Broadcast bus for UI events
///
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscan_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// let _rx = event_bus.subscribe();
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
