use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Identity, IdentityError};

/// Source of the active outbound identity.
///
/// Implementations back this with real hardware (SIM banks, dongles, VPN
/// endpoints). The orchestrator only reads and rotates; it never builds
/// identities itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity currently in use. No side effects.
    fn current(&self) -> Identity;

    /// Advance to the next identity and make it current.
    async fn rotate(&self) -> Result<Identity, IdentityError>;

    /// Whether the underlying link/device is usable at all.
    async fn healthy(&self) -> bool;

    /// Remember the most recent identity that passed every check.
    fn record_last_good(&self, identity: &Identity);

    fn last_good(&self) -> Option<Identity>;
}

/// How [`IdentityPool`] decides whether its link is healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkProbe {
    /// No hardware behind the pool; always healthy.
    Always,
    /// TCP connect to `host:port` must succeed within `timeout`.
    Tcp { target: String, timeout: Duration },
}

impl LinkProbe {
    async fn run(&self) -> bool {
        match self {
            LinkProbe::Always => true,
            LinkProbe::Tcp { target, timeout } => {
                let connect = tokio::net::TcpStream::connect(target.as_str());
                match tokio::time::timeout(*timeout, connect).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        tracing::warn!(target = %target, error = %e, "Link probe failed");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(target = %target, ?timeout, "Link probe timed out");
                        false
                    }
                }
            }
        }
    }
}

struct PoolCursor {
    index: usize,
    last_good: Option<Identity>,
}

/// Fixed, cyclic pool of identities.
pub struct IdentityPool {
    identities: Vec<Identity>,
    probe: LinkProbe,
    cursor: Mutex<PoolCursor>,
}

impl IdentityPool {
    pub fn new(identities: Vec<Identity>) -> Result<Self, IdentityError> {
        Self::with_probe(identities, LinkProbe::Always)
    }

    pub fn with_probe(identities: Vec<Identity>, probe: LinkProbe) -> Result<Self, IdentityError> {
        if identities.is_empty() {
            return Err(IdentityError::EmptyPool);
        }
        Ok(Self {
            identities,
            probe,
            cursor: Mutex::new(PoolCursor {
                index: 0,
                last_good: None,
            }),
        })
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }
}

#[async_trait]
impl IdentityProvider for IdentityPool {
    fn current(&self) -> Identity {
        let cursor = self.cursor.lock().expect("identity cursor lock poisoned");
        self.identities[cursor.index].clone()
    }

    async fn rotate(&self) -> Result<Identity, IdentityError> {
        let mut cursor = self.cursor.lock().expect("identity cursor lock poisoned");
        cursor.index = (cursor.index + 1) % self.identities.len();
        let next = self.identities[cursor.index].clone();
        tracing::debug!(identity = %next, "Rotated identity");
        Ok(next)
    }

    async fn healthy(&self) -> bool {
        self.probe.run().await
    }

    fn record_last_good(&self, identity: &Identity) {
        let mut cursor = self.cursor.lock().expect("identity cursor lock poisoned");
        cursor.last_good = Some(identity.clone());
    }

    fn last_good(&self) -> Option<Identity> {
        let cursor = self.cursor.lock().expect("identity cursor lock poisoned");
        cursor.last_good.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(ids: &[&str]) -> IdentityPool {
        IdentityPool::new(ids.iter().map(|s| Identity::new(*s)).collect()).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            IdentityPool::new(Vec::new()),
            Err(IdentityError::EmptyPool)
        ));
    }

    #[tokio::test]
    async fn rotate_wraps_around() {
        let pool = pool(&["a", "b", "c"]);
        assert_eq!(pool.current().as_str(), "a");
        assert_eq!(pool.rotate().await.unwrap().as_str(), "b");
        assert_eq!(pool.rotate().await.unwrap().as_str(), "c");
        assert_eq!(pool.rotate().await.unwrap().as_str(), "a");
        assert_eq!(pool.current().as_str(), "a");
    }

    #[tokio::test]
    async fn single_identity_pool_rotates_onto_itself() {
        let pool = pool(&["only"]);
        assert_eq!(pool.rotate().await.unwrap().as_str(), "only");
    }

    #[test]
    fn current_has_no_side_effects() {
        let pool = pool(&["a", "b"]);
        assert_eq!(pool.current(), pool.current());
    }

    #[test]
    fn last_good_is_recorded() {
        let pool = pool(&["a", "b"]);
        assert!(pool.last_good().is_none());
        pool.record_last_good(&Identity::new("b"));
        assert_eq!(pool.last_good(), Some(Identity::new("b")));
    }

    #[tokio::test]
    async fn always_probe_is_healthy() {
        assert!(pool(&["a"]).healthy().await);
    }

    #[tokio::test]
    async fn tcp_probe_reaches_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let pool = IdentityPool::with_probe(
            vec![Identity::new("a")],
            LinkProbe::Tcp {
                target,
                timeout: Duration::from_secs(2),
            },
        )
        .unwrap();
        assert!(pool.healthy().await);
    }

    #[tokio::test]
    async fn tcp_probe_reports_closed_port() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);

        let pool = IdentityPool::with_probe(
            vec![Identity::new("a")],
            LinkProbe::Tcp {
                target,
                timeout: Duration::from_secs(2),
            },
        )
        .unwrap();
        assert!(!pool.healthy().await);
    }
}
