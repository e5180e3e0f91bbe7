//! Fleet-wide restart coordination
//!
//! Every supervisor watching the same Exhibitor contends for one named lock
//! in ZooKeeper. Only the holder may restart its server, so a rolling
//! ensemble change never takes the whole fleet down at once.
//!
//! - `Coordination` / `CoordinationSession`: the coordination-service seam
//! - `RestartCoordinator`: scoped connect → lock → restart → unlock → close
//! - `zookeeper`: the production backend

pub mod restart;
pub mod zookeeper;

pub use restart::RestartCoordinator;
pub use zookeeper::{ZooKeeperCoordination, ZooKeeperSession};

use crate::common::Result;
use crate::discovery::EnsembleSnapshot;
use async_trait::async_trait;

/// Opens short-lived sessions against the coordination service
#[async_trait]
pub trait Coordination: Send + Sync {
    type Session: CoordinationSession;

    /// Connect using the addresses of `ensemble`
    async fn connect(&self, ensemble: &EnsembleSnapshot) -> Result<Self::Session>;
}

/// One connection, holding at most one lock
#[async_trait]
pub trait CoordinationSession: Send {
    /// Block until the lock at `path` is held by this session
    async fn acquire(&mut self, path: &str) -> Result<()>;

    /// Give up the lock (or a pending claim on it). No-op when nothing is held.
    async fn release(&mut self) -> Result<()>;

    /// Tear down the connection
    async fn close(self) -> Result<()>;
}
