use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ottwatch_identity::Identity;

use crate::state::StatusSnapshot;

/// Event categories written to the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Lifecycle,
    Control,
    Rotation,
    Error,
    OttCheck,
    DrmHandshake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// Current identity is in the bad set.
    Flagged,
    /// An operator asked for it.
    Forced,
    /// At least one service check failed on this identity.
    ChecksFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    LinkUnhealthy,
    RetriesExhausted,
    Unexpected,
}

/// Typed payload of an [`Event`]; the tag doubles as the event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventDetails {
    Lifecycle {
        message: String,
    },
    Control {
        action: ControlAction,
        message: String,
    },
    Rotation {
        identity: Identity,
        reason: RotationReason,
    },
    Error {
        reason: ErrorReason,
        message: String,
    },
    OttCheck {
        service: String,
        identity: Identity,
        passed: bool,
        score: u32,
        drm_detected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    DrmHandshake {
        service: String,
        identity: Identity,
        artifact: String,
    },
}

/// Immutable, append-only record of something the monitor did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub details: EventDetails,
}

impl Event {
    pub fn now(details: EventDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            details,
        }
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::now(EventDetails::Lifecycle {
            message: message.into(),
        })
    }

    pub fn control(action: ControlAction, message: impl Into<String>) -> Self {
        Self::now(EventDetails::Control {
            action,
            message: message.into(),
        })
    }

    pub fn rotation(identity: &Identity, reason: RotationReason) -> Self {
        Self::now(EventDetails::Rotation {
            identity: identity.clone(),
            reason,
        })
    }

    pub fn error(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self::now(EventDetails::Error {
            reason,
            message: message.into(),
        })
    }

    pub fn event_type(&self) -> EventType {
        match &self.details {
            EventDetails::Lifecycle { .. } => EventType::Lifecycle,
            EventDetails::Control { .. } => EventType::Control,
            EventDetails::Rotation { .. } => EventType::Rotation,
            EventDetails::Error { .. } => EventType::Error,
            EventDetails::OttCheck { .. } => EventType::OttCheck,
            EventDetails::DrmHandshake { .. } => EventType::DrmHandshake,
        }
    }
}

/// A tracing record forwarded to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Everything a live subscriber can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    Event(Event),
    Status(StatusSnapshot),
    Log(LogLine),
}
