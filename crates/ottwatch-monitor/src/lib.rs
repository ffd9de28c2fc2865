//! ottwatch monitor: the playability check loop.
//!
//! [`Orchestrator`] ticks through a small state machine (running, paused,
//! safe mode): it checks link health, rotates away from flagged identities,
//! runs every configured service check through the [`CheckPipeline`] and
//! escalates to safe mode when retries run out. [`ControlSurface`] lets
//! operators pause, resume, force a rotation and watch the live event
//! stream.

pub mod checker;
pub mod config;
mod control;
pub mod event;
mod hub;
mod livelog;
pub mod notify;
mod orchestrator;
mod pipeline;
mod runtime;
pub mod service;
mod state;
pub mod store;
pub mod testing;

pub use checker::{Checker, CheckerError, CommandChecker, HttpChecker};
pub use config::MonitorConfig;
pub use control::ControlSurface;
pub use event::{Event, EventDetails, EventType, LogLine, MonitorEvent};
pub use hub::{EventHub, BROADCAST_CHANNEL_CAPACITY};
pub use livelog::LiveLogLayer;
pub use notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, TickOutcome};
pub use pipeline::{CheckPipeline, CheckResult, IterationReport};
pub use runtime::{MonitorRuntime, MonitorRuntimeStatus};
pub use service::{CheckOutcome, CheckTarget, ServiceCheckSpec};
pub use state::{Mode, OrchestratorState, StatusSnapshot};
pub use store::{EventStore, JsonlEventStore, MemoryEventStore, StoreError};

use ottwatch_identity::IdentityError;

/// Errors surfaced by the monitor domain.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("event store error: {0}")]
    Store(#[from] StoreError),

    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Panic payload text, or the join error itself for cancelled tasks.
pub(crate) fn join_error_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}
