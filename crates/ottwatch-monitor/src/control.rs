use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::event::{ControlAction, Event, MonitorEvent};
use crate::orchestrator::MonitorShared;
use crate::state::StatusSnapshot;

/// Operator-facing handle on a running monitor. Safe to clone and to call
/// from any task while the loop is mid-tick.
#[derive(Clone)]
pub struct ControlSurface {
    shared: Arc<MonitorShared>,
}

impl ControlSurface {
    pub(crate) fn new(shared: Arc<MonitorShared>) -> Self {
        Self { shared }
    }

    /// Stop running checks after the current tick. Every call is recorded.
    pub async fn pause(&self) {
        self.shared.state.lock().await.paused = true;
        tracing::info!("Monitor paused by operator");
        self.shared
            .sink
            .record_lossy(Event::control(ControlAction::Pause, "Monitor paused by operator"));
        self.shared.publish_status().await;
    }

    /// Leave both pause and safe mode. The retry counter is kept.
    pub async fn resume(&self) {
        self.shared.state.lock().await.resume();
        tracing::info!("Monitor resumed by operator");
        self.shared.sink.record_lossy(Event::control(
            ControlAction::Resume,
            "Monitor resumed by operator",
        ));
        self.shared.publish_status().await;
    }

    /// Rotate the identity on the next running tick, without checking.
    pub async fn force_rotate(&self) {
        self.shared.state.lock().await.force_rotate_requested = true;
        tracing::info!("Identity rotation requested by operator");
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.shared.status().await
    }

    /// Everything emitted after this call: events, status snapshots and
    /// log lines. A receiver that falls behind loses the oldest items.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.sink.hub().subscribe()
    }

    pub fn events(&self) -> BroadcastStream<MonitorEvent> {
        self.shared.sink.hub().stream()
    }
}
