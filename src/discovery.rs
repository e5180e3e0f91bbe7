//! Ensemble discovery through Exhibitor
//!
//! Exhibitor publishes the current ZooKeeper membership at
//! `/exhibitor/v1/cluster/list`. A failed lookup is not an error for the
//! caller: it yields an empty snapshot so the control loop keeps running on
//! the last ensemble it trusted.

use crate::common::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Fixed path of the Exhibitor cluster list
pub const CLUSTER_LIST_ENDPOINT: &str = "/exhibitor/v1/cluster/list";

/// Default request timeout for the cluster list
pub const CLUSTER_LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// One coordination-service peer, `host:port`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnsembleAddress(String);

impl EnsembleAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnsembleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonically ordered ensemble membership. Empty means discovery failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsembleSnapshot(Vec<EnsembleAddress>);

impl EnsembleSnapshot {
    pub fn new(mut addresses: Vec<EnsembleAddress>) -> Self {
        addresses.sort();
        Self(addresses)
    }

    /// Build from already formatted `host:port` strings
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            addresses
                .into_iter()
                .map(|a| EnsembleAddress(a.into()))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.0.iter().map(|a| a.0.clone()).collect()
    }

    /// Comma-joined form used in both the broker config and the ZooKeeper client
    pub fn connection_string(&self) -> String {
        self.hosts().join(",")
    }

    /// Does `self`, observed after `current`, call for a restart?
    ///
    /// Only a different membership that is at least as large counts. A smaller
    /// snapshot is usually a failed or partial lookup, so shrink-only changes
    /// are ignored.
    pub fn supersedes(&self, current: &EnsembleSnapshot) -> bool {
        self != current && self.len() >= current.len()
    }
}

impl fmt::Display for EnsembleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.connection_string())
    }
}

/// Body of the Exhibitor cluster list
#[derive(Debug, Deserialize)]
pub struct ClusterList {
    pub servers: Vec<String>,
    pub port: u16,
}

impl From<ClusterList> for EnsembleSnapshot {
    fn from(list: ClusterList) -> Self {
        EnsembleSnapshot::new(
            list.servers
                .iter()
                .map(|host| EnsembleAddress::new(host, list.port))
                .collect(),
        )
    }
}

/// Source of the current ensemble
#[async_trait]
pub trait Discover: Send + Sync {
    /// Current membership; empty on any failure
    async fn discover(&self) -> EnsembleSnapshot;
}

/// Exhibitor-backed discovery
pub struct ExhibitorDiscovery {
    client: reqwest::Client,
    url: String,
}

impl ExhibitorDiscovery {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base, CLUSTER_LIST_ENDPOINT),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One request, no retry
    pub async fn fetch(&self) -> Result<ClusterList> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Discover for ExhibitorDiscovery {
    async fn discover(&self) -> EnsembleSnapshot {
        match self.fetch().await {
            Ok(list) => {
                let snapshot = EnsembleSnapshot::from(list);
                tracing::debug!("Discovered ensemble {}", snapshot);
                snapshot
            }
            Err(e) => {
                tracing::error!("Connection failure: {}: {}", self.url, e);
                EnsembleSnapshot::empty()
            }
        }
    }
}
