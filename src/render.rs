//! Property template rendering
//!
//! Static `{{NAME}}` placeholders are resolved once at startup. The ensemble
//! placeholder is never touched here; it is filled in by the process
//! supervisor each time the server is (re)started.

use crate::common::{Error, Result};
use crate::discovery::EnsembleSnapshot;
use std::collections::BTreeMap;
use std::path::Path;

/// Placeholder resolved only at start time, from the discovered ensemble
pub const ENSEMBLE_PLACEHOLDER: &str = "ZOOKEEPER_CONNECTION_STRING";

/// Environment variable supplying the default advertised host name
pub const ADVERTISED_HOST_ENV: &str = "IP";

/// Default value per placeholder name
pub type PropertyDefaults = BTreeMap<String, String>;

/// Built-in broker defaults; `advertised_host` is normally `$IP`
pub fn kafka_defaults(advertised_host: &str) -> PropertyDefaults {
    [
        ("KAFKA_BROKER_ID", "-1"),
        ("KAFKA_CREATE_TOPICS_ENABLE", "true"),
        ("KAFKA_REPLICATION_FACTOR", "1"),
        ("KAFKA_ADVERTISED_HOST_NAME", advertised_host),
        ("KAFKA_DELETE_TOPIC_ENABLE", "false"),
        ("KAFKA_PORT", "9092"),
        ("KAFKA_ADVERTISED_PORT", "9092"),
        ("KAFKA_LOG_DIR", "/data"),
        ("KAFKA_NUM_PARTITIONS", "1"),
        ("KAFKA_LOG_RETENTION_HOURS", "168"),
        ("KAFKA_LOG_FLUSH_INTERVAL_MS", "3000"),
        ("KAFKA_LOG_FLUSH_INTERVAL_MESSAGES", "10000"),
        ("ZOOKEEPER_CHROOT", "/kafka"),
        ("ZOOKEEPER_CONNECTION_TIMEOUT_MS", "10000"),
        ("ZOOKEEPER_SESSION_TIMEOUT_MS", "10000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `{{NAME}}`
pub fn placeholder(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// Substitute every name in `defaults`, preferring `overrides` when it has a value.
/// Unknown placeholders, and the ensemble placeholder, stay in the output verbatim.
pub fn render<F>(template: &str, overrides: F, defaults: &PropertyDefaults) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = template.to_string();
    for (name, default) in defaults {
        if name == ENSEMBLE_PLACEHOLDER {
            continue;
        }
        let value = overrides(name).unwrap_or_else(|| default.clone());
        out = out.replace(&placeholder(name), &value);
    }
    out
}

/// Override lookup backed by the process environment
pub fn env_overrides(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Template text with every static placeholder resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperties(String);

impl ResolvedProperties {
    /// Read and render the template at `path`
    pub fn load<F>(path: &Path, overrides: F, defaults: &PropertyDefaults) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let template = std::fs::read_to_string(path).map_err(|source| Error::Template {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_template(&template, overrides, defaults))
    }

    pub fn from_template<F>(template: &str, overrides: F, defaults: &PropertyDefaults) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self(render(template, overrides, defaults))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final configuration text for a given ensemble
    pub fn with_ensemble(&self, ensemble: &EnsembleSnapshot) -> String {
        self.0
            .replace(&placeholder(ENSEMBLE_PLACEHOLDER), &ensemble.connection_string())
    }
}

impl From<String> for ResolvedProperties {
    fn from(s: String) -> Self {
        Self(s)
    }
}
