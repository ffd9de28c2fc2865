use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use ottwatch_common::persist;

use crate::Identity;

/// Classification of an identity from its most recent checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reputation {
    Good,
    Bad,
}

/// Persisted reputation sets. An identity is in at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationState {
    #[serde(default)]
    pub good: BTreeSet<Identity>,
    #[serde(default)]
    pub bad: BTreeSet<Identity>,
}

impl ReputationState {
    fn classify(&mut self, identity: &Identity, reputation: Reputation) {
        let (into, out_of) = match reputation {
            Reputation::Good => (&mut self.good, &mut self.bad),
            Reputation::Bad => (&mut self.bad, &mut self.good),
        };
        out_of.remove(identity);
        into.insert(identity.clone());
    }

    pub fn reputation_of(&self, identity: &Identity) -> Option<Reputation> {
        if self.bad.contains(identity) {
            Some(Reputation::Bad)
        } else if self.good.contains(identity) {
            Some(Reputation::Good)
        } else {
            None
        }
    }
}

/// Best-effort GOOD/BAD memory of identities.
///
/// The loop is the only writer. Every `classify` is written through to disk
/// before returning; failures are logged and the in-memory view stays
/// authoritative, so a broken disk never stops monitoring.
pub struct ReputationCache {
    path: Option<PathBuf>,
    state: Mutex<ReputationState>,
}

impl ReputationCache {
    /// Load the cache at `path`, creating an empty file if it is missing.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match persist::read_json_if_exists::<ReputationState>(&path) {
            Ok(Some(state)) => state,
            Ok(None) => {
                let state = ReputationState::default();
                if let Err(e) = persist::write_json_pretty(&path, &state) {
                    tracing::warn!(path = %path.display(), error = %e, "Could not create reputation cache");
                }
                state
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Reputation cache unreadable, starting empty"
                );
                ReputationState::default()
            }
        };

        Self {
            path: Some(path),
            state: Mutex::new(sanitize(state)),
        }
    }

    /// Cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(ReputationState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_flagged(&self, identity: &Identity) -> bool {
        let state = self.state.lock().expect("reputation lock poisoned");
        state.bad.contains(identity)
    }

    pub fn classify(&self, identity: &Identity, reputation: Reputation) {
        let mut state = self.state.lock().expect("reputation lock poisoned");
        state.classify(identity, reputation);

        if let Some(path) = &self.path {
            if let Err(e) = persist::write_json_pretty(path, &*state) {
                tracing::warn!(
                    path = %path.display(),
                    identity = %identity,
                    error = %e,
                    "Failed to persist reputation"
                );
            }
        }
        tracing::debug!(identity = %identity, ?reputation, "Identity classified");
    }

    pub fn snapshot(&self) -> ReputationState {
        self.state.lock().expect("reputation lock poisoned").clone()
    }
}

/// A hand-edited file may list an identity in both sets; bad wins.
fn sanitize(mut state: ReputationState) -> ReputationState {
    let overlap: Vec<Identity> = state.good.intersection(&state.bad).cloned().collect();
    for identity in overlap {
        state.good.remove(&identity);
    }
    state
}
