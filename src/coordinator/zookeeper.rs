//! ZooKeeper backend for the restart lock
//!
//! Uses the client's own lock recipe in its Curator-compatible layout, so a
//! Curator `InterProcessMutex` on the same path contends for the same lock.
//! A crashed holder's node disappears with its session, and an abandoned
//! contention cleans up its node when dropped.

use super::{Coordination, CoordinationSession};
use crate::common::{Error, Result};
use crate::discovery::EnsembleSnapshot;
use async_trait::async_trait;
use std::time::Duration;
use zookeeper_client as zk;

const LOCK_NODE_NAME: &str = "lock-";

/// Opens a fresh ZooKeeper session per restart
#[derive(Debug, Clone)]
pub struct ZooKeeperCoordination {
    connect_timeout: Duration,
}

impl ZooKeeperCoordination {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Coordination for ZooKeeperCoordination {
    type Session = ZooKeeperSession;

    async fn connect(&self, ensemble: &EnsembleSnapshot) -> Result<ZooKeeperSession> {
        if ensemble.is_empty() {
            return Err(Error::ConnectionFailed("empty ensemble".into()));
        }
        let hosts = ensemble.connection_string();
        tracing::info!("Connecting to ZooKeeper: {}", hosts);

        let client = tokio::time::timeout(self.connect_timeout, zk::Client::connect(&hosts))
            .await
            .map_err(|_| {
                Error::ConnectionFailed(format!(
                    "{}: no session within {:?}",
                    hosts, self.connect_timeout
                ))
            })?
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", hosts, e)))?;

        Ok(ZooKeeperSession { client, lock: None })
    }
}

/// Live session plus the lock it holds, if any
pub struct ZooKeeperSession {
    client: zk::Client,
    lock: Option<zk::OwnedLockClient>,
}

/// Lock layout under `path`; missing ancestors are created as open persistent nodes
fn lock_request(path: &str) -> Result<(zk::LockPrefix<'_>, zk::LockOptions<'static>)> {
    let prefix = zk::LockPrefix::new_curator(path, LOCK_NODE_NAME)?;
    let options = zk::LockOptions::new(zk::Acls::anyone_all())
        .with_ancestor_options(zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all()))?;
    Ok((prefix, options))
}

#[async_trait]
impl CoordinationSession for ZooKeeperSession {
    async fn acquire(&mut self, path: &str) -> Result<()> {
        if self.lock.is_some() {
            return Err(Error::Lock {
                path: path.to_string(),
                reason: "already held by this session".into(),
            });
        }
        let (prefix, options) = lock_request(path)?;
        let lock = self.client.lock(prefix, &[], options).await?;
        tracing::debug!("Holding {}", lock.lock_path());
        self.lock = Some(lock.into_owned());
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        let node = lock.lock_path().to_string();
        let deleted = lock.client().delete(&node, None).await;
        // the drop below retries the delete in the background
        drop(lock);
        match deleted {
            Ok(()) | Err(zk::Error::NoNode) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(self) -> Result<()> {
        // dropping the last client handle closes the session and its ephemerals
        tracing::debug!("Closing ZooKeeper session");
        drop(self.lock);
        drop(self.client);
        Ok(())
    }
}
