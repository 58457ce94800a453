//! The two events a session can emit: `sessionClosed` and `deviceRevoked`.

use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SessionClosed,
    DeviceRevoked,
}

/// A cloneable handle onto a session's event stream. Cloning shares the
/// same underlying channel; every clone (and every `subscribe()` receiver)
/// observes the same events.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No receivers is a normal, unremarkable state (nobody is
        // listening for this particular run); dropping the event is
        // correct, not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
