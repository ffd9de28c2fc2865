use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::event::{Event, MonitorEvent};
use crate::state::StatusSnapshot;
use crate::store::{EventStore, StoreError};

/// Capacity of each subscriber's buffer. A receiver that falls further
/// behind loses the oldest items; the sender never waits.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Live fan-out of monitor events to any number of subscribers.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn publish(&self, event: MonitorEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<MonitorEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Persist-then-publish: one place where events enter the system, so the
/// store and live subscribers see the same order.
#[derive(Clone)]
pub(crate) struct EventSink {
    store: Arc<dyn EventStore>,
    hub: EventHub,
}

impl EventSink {
    pub(crate) fn new(store: Arc<dyn EventStore>, hub: EventHub) -> Self {
        Self { store, hub }
    }

    pub(crate) fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Append and publish. Subscribers get the event even when the store
    /// rejects it; the store error is returned to the caller.
    pub(crate) fn record(&self, event: Event) -> Result<(), StoreError> {
        let result = self.store.append(&event);
        self.hub.publish(MonitorEvent::Event(event));
        result
    }

    /// Like [`record`](Self::record) but logs store failures instead of
    /// returning them.
    pub(crate) fn record_lossy(&self, event: Event) {
        if let Err(e) = self.record(event) {
            tracing::error!(error = %e, "Failed to persist event");
        }
    }

    pub(crate) fn status(&self, snapshot: StatusSnapshot) {
        self.hub.publish(MonitorEvent::Status(snapshot));
    }
}
