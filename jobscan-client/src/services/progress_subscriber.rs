//! Progress event subscriber
//!
//! Keeps one long-lived channel connection open, scopes it to the active
//! process room and applies matching progress events to the shared
//! [`ProgressView`]. The active process id is owned by the upload controller;
//! the subscriber only reads it through a `watch` receiver.
//!
//! **Reconnect behavior:**
//! - On every successful connect with a session active: re-join, then request
//!   the latest progress
//! - Server-initiated close after at least one event: reconnect immediately
//! - Failed connects, transport errors and closes before any event: back off
//!   per [`ReconnectPolicy`]; the first event on a connection clears the count
//! - More consecutive failures than the policy allows: one persistent warning,
//!   then stop

use crate::models::{ProcessId, ProgressView};
use crate::services::notifications::NotificationSurface;
use crate::services::progress_channel::{ProgressChannel, ProgressStream};
use crate::services::reconnect::ReconnectPolicy;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use jobscan_common::events::{
    ChannelStatus, ClientMessage, EventBus, ProgressEvent, Severity, Step, UiEvent,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Hooks the upload controller drives on the subscriber
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Reset the progress display for a new submission
    fn reset(&self);

    /// Subscribe to a process room
    async fn join(&self, process_id: &ProcessId);

    /// Unsubscribe from a process room
    async fn leave(&self, process_id: &ProcessId);

    /// Show the process as finished
    fn force_complete(&self, process_id: &ProcessId);
}

/// Why a live connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the stream
    Remote,
    /// Shutdown requested locally
    Local,
    /// The transport failed
    Transport(String),
}

#[derive(Debug, Clone, Copy)]
struct ConnectionState {
    status: ChannelStatus,
    failures: u32,
}

/// Channel-driven progress subscriber
pub struct ProgressSubscriber<C: ProgressChannel> {
    channel: Arc<C>,
    active_id: watch::Receiver<Option<ProcessId>>,
    view: Arc<Mutex<ProgressView>>,
    connection: Mutex<ConnectionState>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    notifications: NotificationSurface,
    event_bus: EventBus,
    shutdown: CancellationToken,
}

impl<C: ProgressChannel> ProgressSubscriber<C> {
    pub fn new(
        channel: Arc<C>,
        active_id: watch::Receiver<Option<ProcessId>>,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
        notifications: NotificationSurface,
        event_bus: EventBus,
    ) -> Self {
        Self {
            channel,
            active_id,
            view: Arc::new(Mutex::new(ProgressView::default())),
            connection: Mutex::new(ConnectionState {
                status: ChannelStatus::Disconnected,
                failures: 0,
            }),
            policy,
            connect_timeout,
            notifications,
            event_bus,
            shutdown: CancellationToken::new(),
        }
    }

    /// Snapshot of the progress display
    pub fn view(&self) -> ProgressView {
        self.lock_view().clone()
    }

    pub fn status(&self) -> ChannelStatus {
        self.lock_connection().status
    }

    /// Stop the connection loop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Connection loop; returns on shutdown or after giving up
    pub async fn run(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let attempt = tokio::time::timeout(self.connect_timeout, self.channel.connect());
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = attempt => result,
            };

            let error = match result {
                Ok(Ok(stream)) => {
                    let failures = self.lock_connection().failures;
                    self.set_status(ChannelStatus::Connected, failures);
                    info!("Progress channel connected");
                    self.resync().await;

                    let (reason, delivered) = self.pump(stream).await;
                    self.channel.disconnect().await;
                    match reason {
                        DisconnectReason::Local => break,
                        DisconnectReason::Remote if delivered => {
                            info!("Progress channel closed by server, reconnecting");
                            self.set_status(ChannelStatus::Reconnecting, 0);
                            continue;
                        }
                        DisconnectReason::Remote => {
                            "server closed the connection before sending any event".to_string()
                        }
                        DisconnectReason::Transport(e) => e,
                    }
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("connect timed out after {} ms", self.connect_timeout.as_millis()),
            };

            let failures = self.lock_connection().failures + 1;
            if !self.policy.should_retry(failures) {
                self.give_up(failures, &error);
                return;
            }

            let delay = self.policy.delay_for(failures);
            warn!(
                error = %error,
                attempt = failures,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Progress channel connection failed, retrying"
            );
            self.set_status(ChannelStatus::Reconnecting, failures);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_status(ChannelStatus::Disconnected, 0);
        debug!("Progress channel loop stopped");
    }

    /// Apply one inbound event
    ///
    /// Returns false, leaving all state unchanged, when the event belongs to
    /// a process other than the active one.
    pub fn handle_event(&self, event: &ProgressEvent) -> bool {
        let process_id = match self.active_id.borrow().clone() {
            Some(id) if id.as_str() == event.process_id => id,
            other => {
                debug!(
                    process_id = %event.process_id,
                    active = ?other,
                    "Ignoring progress event for inactive process"
                );
                return false;
            }
        };

        let snapshot = {
            let mut view = self.lock_view();
            view.apply(&event.step, event.progress, &event.description, event.retry);
            view.clone()
        };

        debug!(
            process_id = %process_id,
            step = %event.step,
            percentage = snapshot.percentage,
            "Progress update"
        );

        self.event_bus.emit_lossy(UiEvent::ProgressChanged {
            process_id: process_id.to_string(),
            percentage: snapshot.percentage,
            step: Step::from_wire(&event.step),
            description: snapshot.description,
            mode: snapshot.mode,
            timestamp: Utc::now(),
        });
        true
    }

    /// Drain one connection; also reports whether any event arrived
    ///
    /// The first event proves the connection healthy and clears the failure
    /// count.
    async fn pump(&self, mut stream: ProgressStream) -> (DisconnectReason, bool) {
        let mut delivered = false;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return (DisconnectReason::Local, delivered),
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        if !delivered {
                            delivered = true;
                            self.lock_connection().failures = 0;
                        }
                        self.handle_event(&event);
                    }
                    Some(Err(e)) => return (DisconnectReason::Transport(e.to_string()), delivered),
                    None => return (DisconnectReason::Remote, delivered),
                },
            }
        }
    }

    /// Re-join the active room and ask for the latest progress
    async fn resync(&self) {
        let active = self.active_id.borrow().clone();
        if let Some(process_id) = active {
            info!(process_id = %process_id, "Resyncing progress after connect");
            self.send(ClientMessage::JoinProcess {
                process_id: process_id.to_string(),
            })
            .await;
            self.send(ClientMessage::GetProgress {
                process_id: process_id.to_string(),
            })
            .await;
        }
    }

    async fn send(&self, message: ClientMessage) {
        if let Err(e) = self.channel.emit(&message).await {
            warn!(
                event = message.event_name(),
                process_id = %message.process_id(),
                error = %e,
                "Failed to send channel message"
            );
        }
    }

    fn give_up(&self, failures: u32, error: &str) {
        warn!(
            error = %error,
            attempts = failures,
            "Progress channel unavailable, giving up"
        );
        self.set_status(ChannelStatus::GaveUp, failures);
        self.notifications.push_persistent(
            format!(
                "Lost connection to the progress server after {} attempts; progress updates are paused",
                failures
            ),
            Severity::Warning,
        );
    }

    fn set_status(&self, status: ChannelStatus, failures: u32) {
        {
            let mut connection = self.lock_connection();
            connection.status = status;
            connection.failures = failures;
        }
        self.event_bus.emit_lossy(UiEvent::ChannelStatusChanged {
            status,
            attempts: failures,
            timestamp: Utc::now(),
        });
    }

    fn lock_view(&self) -> MutexGuard<'_, ProgressView> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_connection(&self) -> MutexGuard<'_, ConnectionState> {
        self.connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<C: ProgressChannel> ProgressTracker for ProgressSubscriber<C> {
    fn reset(&self) {
        self.lock_view().reset();
    }

    async fn join(&self, process_id: &ProcessId) {
        info!(process_id = %process_id, "Joining process room");
        self.send(ClientMessage::JoinProcess {
            process_id: process_id.to_string(),
        })
        .await;
    }

    async fn leave(&self, process_id: &ProcessId) {
        info!(process_id = %process_id, "Leaving process room");
        self.send(ClientMessage::LeaveProcess {
            process_id: process_id.to_string(),
        })
        .await;
    }

    fn force_complete(&self, process_id: &ProcessId) {
        let snapshot = {
            let mut view = self.lock_view();
            view.force_complete();
            view.clone()
        };
        self.event_bus.emit_lossy(UiEvent::ProgressChanged {
            process_id: process_id.to_string(),
            percentage: snapshot.percentage,
            step: Some(Step::Complete),
            description: snapshot.description,
            mode: snapshot.mode,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, ClientResult};
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use jobscan_common::config::NotificationConfig;
    use std::collections::VecDeque;

    enum Script {
        Fail,
        Stream(futures::channel::mpsc::UnboundedReceiver<ClientResult<ProgressEvent>>),
    }

    #[derive(Default)]
    struct MockChannel {
        scripts: Mutex<VecDeque<Script>>,
        emitted: Mutex<Vec<ClientMessage>>,
        connects: Mutex<u32>,
        disconnects: Mutex<u32>,
    }

    impl MockChannel {
        fn with_scripts(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }

        fn emitted(&self) -> Vec<ClientMessage> {
            self.emitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressChannel for MockChannel {
        async fn connect(&self) -> ClientResult<ProgressStream> {
            *self.connects.lock().unwrap() += 1;
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some(Script::Stream(rx)) => Ok(rx.boxed()),
                _ => Err(ClientError::Connection("refused".to_string())),
            }
        }

        async fn emit(&self, message: &ClientMessage) -> ClientResult<()> {
            self.emitted.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn disconnect(&self) {
            *self.disconnects.lock().unwrap() += 1;
        }
    }

    fn event(process_id: &str, step: &str, progress: f64) -> ProgressEvent {
        ProgressEvent {
            process_id: process_id.to_string(),
            step: step.to_string(),
            progress,
            description: format!("{} {}", step, progress),
            retry: None,
        }
    }

    fn subscriber(
        channel: Arc<MockChannel>,
        active: Option<&str>,
        policy: ReconnectPolicy,
    ) -> (ProgressSubscriber<MockChannel>, watch::Sender<Option<ProcessId>>, NotificationSurface) {
        let bus = EventBus::new(64);
        let notifications = NotificationSurface::new(&NotificationConfig::default(), bus.clone());
        let (tx, rx) = watch::channel(active.map(ProcessId::from));
        let subscriber = ProgressSubscriber::new(
            channel,
            rx,
            policy,
            Duration::from_secs(1),
            notifications.clone(),
            bus,
        );
        (subscriber, tx, notifications)
    }

    fn stream_script() -> (Script, UnboundedSender<ClientResult<ProgressEvent>>) {
        let (tx, rx) = unbounded();
        (Script::Stream(rx), tx)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_foreign_process_events_ignored() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, _tx, _) = subscriber(channel, Some("p1"), ReconnectPolicy::default());
        subscriber.reset();

        assert!(!subscriber.handle_event(&event("p2", "process", 40.0)));
        assert!(!subscriber.handle_event(&event("p2", "analyze", 80.0)));

        let view = subscriber.view();
        assert_eq!(view.percentage, 0.0);
        assert_eq!(view.current_step, Some(Step::Upload));
    }

    #[tokio::test]
    async fn test_events_ignored_without_active_session() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, _tx, _) = subscriber(channel, None, ReconnectPolicy::default());
        assert!(!subscriber.handle_event(&event("p1", "process", 40.0)));
        assert_eq!(subscriber.view().percentage, 0.0);
    }

    #[tokio::test]
    async fn test_matching_events_applied_and_broadcast() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, _tx, _) = subscriber(channel, Some("p1"), ReconnectPolicy::default());
        let mut rx = subscriber.event_bus.subscribe();

        assert!(subscriber.handle_event(&event("p1", "process", 40.0)));
        assert!(subscriber.handle_event(&event("p1", "process", 30.0)));

        assert_eq!(subscriber.view().percentage, 40.0);
        match rx.recv().await.unwrap() {
            UiEvent::ProgressChanged { process_id, percentage, step, .. } => {
                assert_eq!(process_id, "p1");
                assert_eq!(percentage, 40.0);
                assert_eq!(step, Some(Step::Process));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_id_change_switches_filter() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, tx, _) = subscriber(channel, Some("p1"), ReconnectPolicy::default());

        tx.send_replace(Some(ProcessId::from("p2")));
        assert!(!subscriber.handle_event(&event("p1", "process", 40.0)));
        assert!(subscriber.handle_event(&event("p2", "process", 10.0)));
    }

    #[tokio::test]
    async fn test_join_and_leave_emit_room_messages() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, _tx, _) = subscriber(channel.clone(), None, ReconnectPolicy::default());

        subscriber.join(&ProcessId::from("p1")).await;
        subscriber.leave(&ProcessId::from("p1")).await;

        assert_eq!(
            channel.emitted(),
            vec![
                ClientMessage::JoinProcess { process_id: "p1".to_string() },
                ClientMessage::LeaveProcess { process_id: "p1".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_close_reconnects_and_resyncs() {
        let (first, first_tx) = stream_script();
        let (second, second_tx) = stream_script();
        let channel = Arc::new(MockChannel::with_scripts(vec![first, second]));
        let (subscriber, _tx, _) =
            subscriber(channel.clone(), Some("p1"), ReconnectPolicy::default());
        let subscriber = Arc::new(subscriber);

        let runner = {
            let subscriber = subscriber.clone();
            tokio::spawn(async move { subscriber.run().await })
        };

        wait_until(|| channel.emitted().len() == 2).await;
        first_tx.unbounded_send(Ok(event("p1", "process", 25.0))).unwrap();
        wait_until(|| subscriber.view().percentage == 25.0).await;

        // Server closes the first stream
        drop(first_tx);
        wait_until(|| channel.emitted().len() == 4).await;

        let join = ClientMessage::JoinProcess { process_id: "p1".to_string() };
        let resync = ClientMessage::GetProgress { process_id: "p1".to_string() };
        assert_eq!(channel.emitted(), vec![join.clone(), resync.clone(), join, resync]);
        assert_eq!(subscriber.status(), ChannelStatus::Connected);

        subscriber.shutdown();
        runner.await.unwrap();
        drop(second_tx);
        assert_eq!(subscriber.status(), ChannelStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget_with_persistent_warning() {
        let channel = Arc::new(MockChannel::with_scripts(vec![Script::Fail]));
        let policy = ReconnectPolicy::fixed(2, Duration::from_millis(10));
        let (subscriber, _tx, notifications) = subscriber(channel.clone(), None, policy);

        subscriber.run().await;

        assert_eq!(*channel.connects.lock().unwrap(), 3);
        assert_eq!(subscriber.status(), ChannelStatus::GaveUp);

        let visible = notifications.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].severity, Severity::Warning);
        assert!(visible[0].expires_at.is_none());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (stream, stream_tx) = stream_script();
        let channel = Arc::new(MockChannel::with_scripts(vec![
            Script::Fail,
            Script::Fail,
            stream,
        ]));
        let policy = ReconnectPolicy::fixed(2, Duration::from_millis(5));
        let (subscriber, _tx, notifications) = subscriber(channel.clone(), None, policy);
        let subscriber = Arc::new(subscriber);

        let runner = {
            let subscriber = subscriber.clone();
            tokio::spawn(async move { subscriber.run().await })
        };

        wait_until(|| subscriber.status() == ChannelStatus::Connected).await;
        // An event proves the connection, so the next failure starts a fresh budget
        stream_tx.unbounded_send(Ok(event("p9", "process", 10.0))).unwrap();
        stream_tx
            .unbounded_send(Err(ClientError::Connection("reset".to_string())))
            .unwrap();

        runner.await.unwrap();
        // 2 failures, 1 success, then 3 more failures exhaust the budget
        assert_eq!(*channel.connects.lock().unwrap(), 5);
        assert_eq!(notifications.visible().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_before_any_event_keeps_failure_count() {
        let (stream, stream_tx) = stream_script();
        let channel = Arc::new(MockChannel::with_scripts(vec![Script::Fail, stream]));
        let policy = ReconnectPolicy::fixed(2, Duration::from_millis(5));
        let (subscriber, _tx, _) = subscriber(channel.clone(), None, policy);
        let subscriber = Arc::new(subscriber);

        let runner = {
            let subscriber = subscriber.clone();
            tokio::spawn(async move { subscriber.run().await })
        };

        wait_until(|| subscriber.status() == ChannelStatus::Connected).await;
        stream_tx
            .unbounded_send(Err(ClientError::Connection("reset".to_string())))
            .unwrap();

        runner.await.unwrap();
        // fail, connect then error, fail: three failures in a row
        assert_eq!(*channel.connects.lock().unwrap(), 3);
        assert_eq!(subscriber.status(), ChannelStatus::GaveUp);
    }

    #[tokio::test]
    async fn test_server_closing_every_connection_gives_up() {
        let scripts = (0..5)
            .map(|_| {
                let (script, tx) = stream_script();
                drop(tx);
                script
            })
            .collect();
        let channel = Arc::new(MockChannel::with_scripts(scripts));
        let policy = ReconnectPolicy::fixed(2, Duration::from_millis(10));
        let (subscriber, _tx, notifications) = subscriber(channel.clone(), Some("p1"), policy);

        tokio::time::timeout(Duration::from_secs(5), subscriber.run())
            .await
            .expect("loop must stop once the budget is spent");

        assert_eq!(*channel.connects.lock().unwrap(), 3);
        assert_eq!(*channel.disconnects.lock().unwrap(), 3);
        assert_eq!(subscriber.status(), ChannelStatus::GaveUp);

        let visible = notifications.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].severity, Severity::Warning);
        assert!(visible[0].expires_at.is_none());
    }

    #[tokio::test]
    async fn test_force_complete_shows_full_progress() {
        let channel = Arc::new(MockChannel::default());
        let (subscriber, _tx, _) = subscriber(channel, Some("p1"), ReconnectPolicy::default());
        subscriber.reset();
        subscriber.handle_event(&event("p1", "analyze", 70.0));

        subscriber.force_complete(&ProcessId::from("p1"));
        let view = subscriber.view();
        assert_eq!(view.percentage, 100.0);
        assert_eq!(view.current_step, Some(Step::Complete));
    }
}
