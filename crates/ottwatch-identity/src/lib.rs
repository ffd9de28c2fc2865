//! Outbound network identities.
//!
//! An [`Identity`] is the opaque address/token of the path the monitor uses to
//! reach streaming services. [`IdentityProvider`] owns the active identity
//! and rotates through a fixed pool; [`ReputationCache`] remembers which
//! identities were last seen working or broken.

mod provider;
mod reputation;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use provider::{IdentityPool, IdentityProvider, LinkProbe};
pub use reputation::{Reputation, ReputationCache, ReputationState};

/// Opaque outbound identity (an address, SIM slot, token...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Errors surfaced by the identity domain.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity pool is empty")]
    EmptyPool,

    #[error("identity rotation failed: {0}")]
    Rotation(String),
}
