//! # ensemble-supervisor
//!
//! Keeps one server process (a Kafka broker in the reference deployment)
//! pointed at the current ZooKeeper ensemble:
//! - Discovers ensemble membership from Exhibitor
//! - Renders the server's properties from a template
//! - Restarts the server when the ensemble changes
//! - Serializes restarts across the fleet with a ZooKeeper lock
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐        ┌─────────────────────┐
//!            │  Exhibitor   │        │ ZooKeeper ensemble  │
//!            │ cluster/list │        │ /kafka-coord/<base> │
//!            └──────▲───────┘        └──────────▲──────────┘
//!                   │ HTTP                      │ lock
//!  ┌────────────────┴───────────────────────────┴──────────┐
//!  │ ControlLoop: poll child → discover → restart → sleep  │
//!  └────────────────┬──────────────────────────────────────┘
//!                   │ stop / start
//!            ┌──────▼───────┐
//!            │ server child │  <command> <rendered properties>
//!            └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! EXHIBITOR_BASE=http://exhibitor:8080 ensemble-supervisor \
//!   --template /kafka/config/server.properties.template \
//!   --output /kafka/config/server.properties \
//!   --command /kafka/bin/kafka-server-start.sh
//! ```

pub mod common;
pub mod control;
pub mod coordinator;
pub mod discovery;
pub mod process;
pub mod render;

// Re-export commonly used types
pub use common::{Error, Result, SupervisorConfig};
pub use control::{ControlLoop, LoopSettings, LoopState};
pub use coordinator::{RestartCoordinator, ZooKeeperCoordination};
pub use discovery::{Discover, EnsembleAddress, EnsembleSnapshot, ExhibitorDiscovery};
pub use process::{ChildProcessHandle, ChildSupervisor, RunState, Supervise};
pub use render::ResolvedProperties;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
