//! Configuration for the supervisor
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `SUPERVISOR_*` environment variables. The binary applies CLI flags last.

use crate::common::utils::{serde_duration, serde_opt_duration};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the Exhibitor base URL
pub const EXHIBITOR_BASE_ENV: &str = "EXHIBITOR_BASE";

/// Prefix for environment overrides of `SupervisorConfig` fields
pub const ENV_PREFIX: &str = "SUPERVISOR";

/// Everything the supervisor needs, passed explicitly into each component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Exhibitor base URL (normally taken from `EXHIBITOR_BASE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhibitor_base: Option<String>,

    /// Property template with `{{NAME}}` placeholders
    pub template_path: PathBuf,

    /// Where the rendered properties are written before each start
    pub output_path: PathBuf,

    /// Server start script, invoked with the rendered properties path
    pub command: PathBuf,

    /// Names the restart lock: `/<service_name>-coord/<exhibitor base>`
    pub service_name: String,

    /// Time between loop ticks
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,

    /// Time to wait after a restart before releasing the lock
    #[serde(with = "serde_duration")]
    pub settle_interval: Duration,

    /// Timeout of one Exhibitor cluster-list request
    #[serde(with = "serde_duration")]
    pub discovery_timeout: Duration,

    /// Timeout for establishing the ZooKeeper session
    #[serde(with = "serde_duration")]
    pub connect_timeout: Duration,

    /// Bound on restart lock acquisition; unbounded when unset
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub lock_timeout: Option<Duration>,

    /// Grace period after SIGTERM before SIGKILL; unbounded when unset
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<Duration>,

    /// Stop after this many ticks (tests and dry runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,

    /// Extra or replacement template defaults
    pub properties: BTreeMap<String, String>,

    /// Logging level
    pub log_level: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            exhibitor_base: None,
            template_path: PathBuf::from("/kafka/config/server.properties.template"),
            output_path: PathBuf::from("/kafka/config/server.properties"),
            command: PathBuf::from("/kafka/bin/kafka-server-start.sh"),
            service_name: "kafka".to_string(),
            poll_interval: Duration::from_secs(60),
            settle_interval: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            lock_timeout: None,
            stop_timeout: None,
            iterations: None,
            properties: BTreeMap::new(),
            log_level: "info".to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Load defaults, then `path` (if given and present), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        let mut cfg: SupervisorConfig = settings.try_deserialize()?;

        // config-rs may fold key case; placeholder names are upper case
        cfg.properties = std::mem::take(&mut cfg.properties)
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();

        if cfg.exhibitor_base.is_none() {
            cfg.exhibitor_base = std::env::var(EXHIBITOR_BASE_ENV)
                .ok()
                .filter(|v| !v.is_empty());
        }
        Ok(cfg)
    }

    /// The Exhibitor base URL, or the startup failure when it is absent
    pub fn exhibitor_base(&self) -> Result<&str> {
        self.exhibitor_base
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| crate::Error::MissingConfig(format!("{} not set", EXHIBITOR_BASE_ENV)))
    }

    /// Path of the fleet-wide restart lock for this Exhibitor
    pub fn lock_path(&self) -> Result<String> {
        Ok(format!(
            "/{}-coord/{}",
            self.service_name,
            crate::common::utils::encode_node_name(self.exhibitor_base()?)
        ))
    }
}
