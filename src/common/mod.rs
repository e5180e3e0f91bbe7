//! Common utilities and types shared across ensemble-supervisor

pub mod config;
pub mod error;
pub mod utils;

pub use config::{SupervisorConfig, EXHIBITOR_BASE_ENV};
pub use error::{Error, Result, EXIT_CONFIG_MISSING, EXIT_COORDINATION_FAILURE, EXIT_INTERNAL};
pub use utils::{encode_node_name, format_duration, parse_duration};
