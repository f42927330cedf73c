//! Leadership-change notification surface.
//!
//! Transitions are delivered either through the `LeaderCallbacks` trait or,
//! via the `EventSender` adapter, as a channel of typed `LeaderEvent`s.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Typed leadership transition event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderEvent {
    /// This candidate entered `Leading`.
    StartedLeading,
    /// This candidate left `Leading`.
    StoppedLeading,
    /// The observed holder identity changed.
    NewLeader(String),
}

/// Hooks invoked on leadership transitions.
///
/// Invocations are sequential per engine instance. Implementations should
/// return promptly; long-running leader work belongs in a task spawned onto
/// the provided scope.
#[async_trait]
pub trait LeaderCallbacks: Send + Sync {
    /// Fired at most once per `Following -> Leading` transition. `scope` is
    /// cancelled exactly when the engine leaves `Leading`; caller-supplied
    /// leader logic must run within it and observe cancellation promptly.
    async fn on_started_leading(&self, scope: CancellationToken);

    /// Fired at most once per `Leading -> Following/Released` transition,
    /// strictly after the leading scope has been cancelled.
    async fn on_stopped_leading(&self);

    /// Fired whenever the observed holder changes, including to this
    /// candidate's own identity; never twice in a row with the same identity.
    async fn on_new_leader(&self, identity: &str);
}

/// Forwards transitions into an unbounded channel as `LeaderEvent`s.
///
/// Lets embedders consume leadership changes as a message stream instead of
/// implementing `LeaderCallbacks` directly. Send failures are ignored; a
/// dropped receiver just means nobody is listening anymore.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LeaderEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LeaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl LeaderCallbacks for EventSender {
    async fn on_started_leading(&self, _scope: CancellationToken) {
        let _ = self.tx.send(LeaderEvent::StartedLeading);
    }

    async fn on_stopped_leading(&self) {
        let _ = self.tx.send(LeaderEvent::StoppedLeading);
    }

    async fn on_new_leader(&self, identity: &str) {
        let _ = self.tx.send(LeaderEvent::NewLeader(identity.to_string()));
    }
}

/// Invokes callbacks with the ordering and scope guarantees of the protocol.
///
/// Driven only from the engine's tick loop, which serializes invocations by
/// construction; no two callbacks for the same engine run concurrently.
pub(crate) struct CallbackDispatcher {
    callbacks: Arc<dyn LeaderCallbacks>,
    leading_scope: Option<CancellationToken>,
}

impl CallbackDispatcher {
    pub(crate) fn new(callbacks: Arc<dyn LeaderCallbacks>) -> Self {
        Self {
            callbacks,
            leading_scope: None,
        }
    }

    /// Opens a fresh leading scope and fires `on_started_leading` with it.
    pub(crate) async fn started_leading(&mut self) {
        let scope = CancellationToken::new();
        self.leading_scope = Some(scope.clone());
        self.callbacks.on_started_leading(scope).await;
    }

    /// Cancels the leading scope, then fires `on_stopped_leading`.
    pub(crate) async fn stopped_leading(&mut self) {
        if let Some(scope) = self.leading_scope.take() {
            scope.cancel();
        }
        self.callbacks.on_stopped_leading().await;
    }

    pub(crate) async fn new_leader(&mut self, identity: &str) {
        self.callbacks.on_new_leader(identity).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records whether the scope handed to `on_started_leading` was already
    /// cancelled by the time `on_stopped_leading` ran.
    struct ScopeProbe {
        scope: Mutex<Option<CancellationToken>>,
        cancelled_before_stop: Mutex<Option<bool>>,
    }

    impl ScopeProbe {
        fn new() -> Self {
            Self {
                scope: Mutex::new(None),
                cancelled_before_stop: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LeaderCallbacks for ScopeProbe {
        async fn on_started_leading(&self, scope: CancellationToken) {
            *self.scope.lock().unwrap() = Some(scope);
        }

        async fn on_stopped_leading(&self) {
            let cancelled = self
                .scope
                .lock()
                .unwrap()
                .as_ref()
                .map(|s| s.is_cancelled())
                .unwrap_or(false);
            *self.cancelled_before_stop.lock().unwrap() = Some(cancelled);
        }

        async fn on_new_leader(&self, _identity: &str) {}
    }

    #[tokio::test]
    async fn test_scope_cancelled_before_stopped_callback() {
        let probe = Arc::new(ScopeProbe::new());
        let mut dispatcher = CallbackDispatcher::new(probe.clone());

        dispatcher.started_leading().await;
        assert!(probe.scope.lock().unwrap().is_some());

        dispatcher.stopped_leading().await;
        assert_eq!(*probe.cancelled_before_stop.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_event_sender_forwards_events() {
        let (sender, mut rx) = EventSender::channel();
        let mut dispatcher = CallbackDispatcher::new(Arc::new(sender));

        dispatcher.started_leading().await;
        dispatcher.new_leader("node-1").await;
        dispatcher.stopped_leading().await;

        assert_eq!(rx.recv().await, Some(LeaderEvent::StartedLeading));
        assert_eq!(
            rx.recv().await,
            Some(LeaderEvent::NewLeader("node-1".to_string()))
        );
        assert_eq!(rx.recv().await, Some(LeaderEvent::StoppedLeading));
    }

    #[tokio::test]
    async fn test_stopped_without_scope_is_harmless() {
        let (sender, mut rx) = EventSender::channel();
        let mut dispatcher = CallbackDispatcher::new(Arc::new(sender));

        dispatcher.stopped_leading().await;
        assert_eq!(rx.recv().await, Some(LeaderEvent::StoppedLeading));
    }
}
