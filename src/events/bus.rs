//! In-process publish/subscribe hub for server events.
//!
//! The bus is a thin wrapper over a Tokio broadcast channel. Publishing is a
//! non-blocking send that succeeds whether or not anyone is listening.
//!
//! # Overflow policy
//!
//! Each subscriber may fall at most `capacity` events behind the publisher.
//! When it falls further behind, the oldest events it has not read are
//! dropped for that subscriber only, and [`EventSubscriber::recv`] logs how
//! many were skipped before resuming with the oldest event still retained.
//! The publisher and every other subscriber are unaffected.

use crate::events::types::ServerEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing;

/// Default per-subscriber backlog
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out hub shared by the supervisor and the streaming transport.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    /// Create a new bus where each subscriber may lag `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every attached subscriber.
    ///
    /// Never blocks and never fails; with no subscribers the event is simply
    /// discarded.
    pub fn publish(&self, event: ServerEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(event_type, receivers, "Event published");
            }
            Err(_) => {
                tracing::trace!(event_type, "Event published but no subscribers attached");
            }
        }
    }

    /// Attach a new subscriber that receives every event published from now on
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            skipped: 0,
        }
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of an [`EventBus`] subscription.
///
/// Dropping it detaches the subscriber.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<ServerEvent>,
    skipped: u64,
}

impl EventSubscriber {
    /// Wait for the next event.
    ///
    /// Returns `None` once the bus and all its clones are gone. Overflow is
    /// handled per the module-level policy.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(count)) => self.record_lag(count),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(count)) => self.record_lag(count),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total number of events this subscriber lost to overflow
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn record_lag(&mut self, count: u64) {
        self.skipped += count;
        tracing::warn!(
            skipped = count,
            total_skipped = self.skipped,
            "Subscriber fell behind, oldest events dropped"
        );
    }
}
