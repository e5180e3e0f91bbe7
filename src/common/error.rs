//! Error types for ensemble-supervisor

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code when required configuration is missing at startup.
pub const EXIT_CONFIG_MISSING: i32 = -1;
/// Exit code when the coordination service could not be used for a restart.
pub const EXIT_COORDINATION_FAILURE: i32 = -2;
/// Exit code for every other fatal error.
pub const EXIT_INTERNAL: i32 = -3;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Config Errors ===
    #[error("Missing required setting: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // === Process Errors ===
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    // === Coordination Errors ===
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Lock error on {path}: {reason}")]
    Lock { path: String, reason: String },

    #[error("Timed out waiting for restart lock {0}")]
    LockTimeout(String),

    #[error("ZooKeeper error: {0}")]
    ZooKeeper(#[from] zookeeper_client::Error),

    // === Discovery Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed cluster list: {0}")]
    MalformedResponse(String),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a transient condition worth another attempt on the next tick?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::MalformedResponse(_) | Error::Timeout(_)
        )
    }

    /// Is this a failure of the coordination service rather than of the host?
    pub fn is_coordination(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_)
                | Error::Lock { .. }
                | Error::LockTimeout(_)
                | Error::ZooKeeper(_)
        )
    }

    /// Stable process exit code for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingConfig(_) | Error::InvalidConfig(_) | Error::Template { .. } => {
                EXIT_CONFIG_MISSING
            }
            e if e.is_coordination() => EXIT_COORDINATION_FAILURE,
            _ => EXIT_INTERNAL,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedResponse(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let missing = Error::MissingConfig("EXHIBITOR_BASE".into());
        let lock = Error::LockTimeout("/kafka-coord/x".into());
        let spawn = Error::Spawn {
            command: "/bin/false".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        };

        assert_eq!(missing.exit_code(), EXIT_CONFIG_MISSING);
        assert_eq!(lock.exit_code(), EXIT_COORDINATION_FAILURE);
        assert_eq!(spawn.exit_code(), EXIT_INTERNAL);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Http("502".into()).is_retryable());
        assert!(!Error::ConnectionFailed("zk".into()).is_retryable());
        assert!(Error::ConnectionFailed("zk".into()).is_coordination());
    }
}
