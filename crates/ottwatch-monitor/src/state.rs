use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ottwatch_identity::Identity;

/// Observable orchestrator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Running,
    Paused,
    SafeMode,
}

/// Mutable orchestrator state, shared by the loop and the control surface.
///
/// `paused` and `safe_mode` are independent flags; safe mode wins when both
/// are set, and either one suppresses checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    pub paused: bool,
    pub safe_mode: bool,
    pub retry_count: u32,
    pub force_rotate_requested: bool,
    pub last_known_good: Option<Identity>,
}

impl OrchestratorState {
    pub fn mode(&self) -> Mode {
        if self.safe_mode {
            Mode::SafeMode
        } else if self.paused {
            Mode::Paused
        } else {
            Mode::Running
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.paused || self.safe_mode
    }

    pub(crate) fn resume(&mut self) {
        self.paused = false;
        self.safe_mode = false;
    }

    pub(crate) fn snapshot(&self, current: &Identity) -> StatusSnapshot {
        StatusSnapshot {
            mode: self.mode(),
            paused: self.paused,
            safe_mode: self.safe_mode,
            retry_count: self.retry_count,
            current_identity: current.to_string(),
            last_known_good_identity: self.last_known_good.as_ref().map(|id| id.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Flat status record handed to operators and live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub paused: bool,
    pub safe_mode: bool,
    pub retry_count: u32,
    pub current_identity: String,
    pub last_known_good_identity: Option<String>,
    pub timestamp: DateTime<Utc>,
}
