//! Session Bus - publishes state snapshots to UI subscribers
//!
//! The controller emits a snapshot after every fold step; renderers subscribe.
//! A subscriber that falls behind skips intermediate snapshots, which is
//! harmless since each one is complete.

use tokio::sync::broadcast;
use tracing::debug;

use super::state::SessionState;

/// Default channel capacity (snapshots)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcast of [`SessionState`] snapshots
pub struct SessionBus {
    tx: broadcast::Sender<SessionState>,
}

impl SessionBus {
    /// Create a new bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "SessionBus::new: creating session bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Publish a snapshot to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the snapshot is dropped.
    pub fn emit(&self, state: SessionState) {
        debug!(phase = %state.phase, "SessionBus::emit");
        let _ = self.tx.send(state);
    }

    /// Receive every snapshot published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        debug!("SessionBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_session_bus_subscribe() {
        let bus = SessionBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_session_bus_no_subscribers() {
        let bus = SessionBus::new(8);
        // This should not panic even with no subscribers
        bus.emit(SessionState::new());
    }

    #[tokio::test]
    async fn test_session_bus_emit_receive() {
        let bus = SessionBus::new(8);
        let mut rx = bus.subscribe();

        let mut state = SessionState::new();
        bus.emit(state.clone());
        state.begin_connecting();
        bus.emit(state);

        assert_eq!(rx.recv().await.unwrap().phase, Phase::Idle);
        assert_eq!(rx.recv().await.unwrap().phase, Phase::Connecting);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_latest() {
        let bus = SessionBus::new(2);
        let mut rx = bus.subscribe();
        for status in ["a", "b", "c", "d"] {
            let mut state = SessionState::new();
            state.status_message = status.to_string();
            bus.emit(state);
        }

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap().status_message, "c");
        assert_eq!(rx.recv().await.unwrap().status_message, "d");
    }
}
