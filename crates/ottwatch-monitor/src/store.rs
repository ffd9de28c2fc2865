use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::event::Event;

const EVENTS_FILENAME: &str = "events.jsonl";

/// Default event log location.
pub fn events_path() -> PathBuf {
    ottwatch_common::paths::log_dir().join(EVENTS_FILENAME)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable, append-only event sink. The monitor never reads back.
pub trait EventStore: Send + Sync {
    fn append(&self, event: &Event) -> Result<(), StoreError>;
}

/// One JSON object per line, append-only (no edits, no deletes).
pub struct JsonlEventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent events first, at most `limit`. Unparsable lines are skipped.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<Event>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let events = raw
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Event>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed event line");
                    None
                }
            })
            .take(limit)
            .collect();
        Ok(events)
    }
}

impl EventStore for JsonlEventStore {
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().expect("event log lock poisoned");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// In-process store, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event store lock poisoned").clone()
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        self.events
            .lock()
            .expect("event store lock poisoned")
            .push(event.clone());
        Ok(())
    }
}
