//! Presence hook for collaborators.
//!
//! The gateway emits [`PresenceEvent::Online`] when an identity's first
//! connection is admitted and [`PresenceEvent::Offline`] exactly when the
//! registry reports the last connection gone. Rendering presence is out
//! of scope here — collaborators subscribe and do what they like.

use tokio::sync::broadcast;

use banter_core::UserId;

/// Identity presence transitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    /// First connection admitted.
    Online(UserId),
    /// Last connection removed.
    Offline(UserId),
}

/// Broadcast channel for presence transitions.
pub struct PresenceBus {
    tx: broadcast::Sender<PresenceEvent>,
}

impl Default for PresenceBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceBus {
    /// Create a bus with a small buffer; presence is best-effort.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { tx }
    }

    /// Subscribe to presence transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.tx.subscribe()
    }

    /// Emit a transition. Lagging or absent subscribers are fine.
    pub fn emit(&self, event: PresenceEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = PresenceBus::new();
        let mut rx = bus.subscribe();
        bus.emit(PresenceEvent::Online("u1".into()));
        assert_eq!(rx.recv().await.unwrap(), PresenceEvent::Online("u1".into()));
    }

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = PresenceBus::new();
        bus.emit(PresenceEvent::Offline("u1".into()));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = PresenceBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(PresenceEvent::Offline("u2".into()));
        assert_eq!(a.recv().await.unwrap(), PresenceEvent::Offline("u2".into()));
        assert_eq!(b.recv().await.unwrap(), PresenceEvent::Offline("u2".into()));
    }
}
