//! Notification surface
//!
//! Append-only queue of user-facing messages, rendered newest-first. Each entry
//! expires after its TTL unless dismissed earlier. Duplicate messages are never
//! merged: every push gets its own entry and its own expiry.

use chrono::{DateTime, Utc};
use jobscan_common::config::NotificationConfig;
use jobscan_common::events::{EventBus, Severity, UiEvent};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// One queued notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// `None` for persistent notifications
    pub expires_at: Option<Instant>,
}

impl Notification {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Queue {
    next_id: u64,
    /// Oldest first
    entries: Vec<Notification>,
}

/// Shared notification queue
///
/// Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct NotificationSurface {
    queue: Arc<Mutex<Queue>>,
    ttl: Duration,
    error_ttl: Duration,
    event_bus: EventBus,
}

impl NotificationSurface {
    pub fn new(config: &NotificationConfig, event_bus: EventBus) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue::default())),
            ttl: Duration::from_millis(config.ttl_ms),
            error_ttl: Duration::from_millis(config.error_ttl_ms),
            event_bus,
        }
    }

    /// Lifetime applied to a severity
    pub fn ttl_for(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Error => self.error_ttl,
            _ => self.ttl,
        }
    }

    /// Queue a notification that expires after its severity's TTL
    pub fn push(&self, message: impl Into<String>, severity: Severity) -> u64 {
        let ttl = self.ttl_for(severity);
        self.insert(message.into(), severity, Some(ttl))
    }

    /// Queue a notification that stays until dismissed
    pub fn push_persistent(&self, message: impl Into<String>, severity: Severity) -> u64 {
        self.insert(message.into(), severity, None)
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.push(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.push(message, Severity::Error)
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.push(message, Severity::Warning)
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.push(message, Severity::Info)
    }

    /// Global handler for errors nobody else caught
    ///
    /// Converts the error into a generic error notification so the session
    /// keeps running.
    pub fn report_uncaught(&self, err: &dyn Display) -> u64 {
        error!(error = %err, "Uncaught error");
        self.error(format!("An unexpected error occurred: {}", err))
    }

    /// Remove a notification before its TTL elapses
    ///
    /// Returns false if it was already gone.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.lock();
        let before = queue.entries.len();
        queue.entries.retain(|n| n.id != id);
        queue.entries.len() != before
    }

    /// Live notifications, newest first
    pub fn visible(&self) -> Vec<Notification> {
        let now = Instant::now();
        let mut queue = self.lock();
        queue.entries.retain(|n| !n.is_expired(now));
        queue.entries.iter().rev().cloned().collect()
    }

    fn insert(&self, message: String, severity: Severity, ttl: Option<Duration>) -> u64 {
        match severity {
            Severity::Error => error!(severity = severity.as_str(), "{}", message),
            Severity::Warning => warn!(severity = severity.as_str(), "{}", message),
            _ => info!(severity = severity.as_str(), "{}", message),
        }

        let now = Instant::now();
        let notification = {
            let mut queue = self.lock();
            queue.entries.retain(|n| !n.is_expired(now));
            queue.next_id += 1;
            let notification = Notification {
                id: queue.next_id,
                message,
                severity,
                created_at: Utc::now(),
                expires_at: ttl.map(|ttl| now + ttl),
            };
            queue.entries.push(notification.clone());
            notification
        };

        self.event_bus.emit_lossy(UiEvent::NotificationPosted {
            id: notification.id,
            severity,
            message: notification.message,
            expires: ttl.is_some(),
            timestamp: notification.created_at,
        });

        notification.id
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
