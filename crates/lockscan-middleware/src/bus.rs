//! Headless broadcast bus for scan-session events.
//!
//! Uses [`tokio::sync::broadcast`] under the hood so that every subscriber
//! receives every event without any single subscriber blocking the session.
//! The session emits state transitions, payload rejections and publish
//! outcomes; front ends subscribe and render them.

use lockscan_types::SessionEvent;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

/// Shared event bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit `event` to every current subscriber.
    ///
    /// Returns the number of subscribers that were handed the event.  Having
    /// nobody listening is a normal condition and yields `0`.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> SessionSubscriber {
        SessionSubscriber {
            session: None,
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single session.
    pub fn subscribe_session(&self, session: Uuid) -> SessionSubscriber {
        SessionSubscriber {
            session: Some(session),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver of [`SessionEvent`]s, optionally bound to one session.
///
/// Obtained via [`EventBus::subscribe`] or [`EventBus::subscribe_session`].
pub struct SessionSubscriber {
    session: Option<Uuid>,
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscriber {
    /// Wait for the next event that matches this subscriber's filter.
    ///
    /// A subscriber that fell behind logs the number of dropped events and
    /// keeps going.  Returns `None` when the bus is closed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.session.is_none_or(|id| id == event.session_id) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "session subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next already-buffered matching event without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.session.is_none_or(|id| id == event.session_id) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "session subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
