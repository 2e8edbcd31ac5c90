//! Fan-out of session notifications.
//!
//! Connection state transitions and events the robot sends without a
//! transaction id are not owned by any one caller, so they go to every
//! subscriber instead of through the registry.

use tokio::sync::broadcast;

use super::SessionEvent;

/// Multi-subscriber channel for [`SessionEvent`]s.
///
/// Subscribers only see events published after they subscribe. A
/// subscriber that falls more than `capacity` events behind gets
/// [`broadcast::error::RecvError::Lagged`] and resumes from the oldest
/// retained event.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events (at
    /// least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `event` to current subscribers and returns how many there
    /// were. Nobody listening is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(dropped)) => {
                tracing::trace!(kind = dropped.kind_str(), "no session subscribers");
                0
            }
        }
    }

    /// Opens a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
