//! Configuration module for the server manager.
//!
//! This module handles parsing, validation, and access to configuration
//! settings: the manager's own settings ([`Config`]) and the per-server
//! settings ([`ServerConfig`]). Files may be JSON or YAML.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use mcs_manager::config::Config;
//!
//! let config = Config::from_file("mcs.json").unwrap();
//! println!("Managing servers under {}", config.root.display());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use mcs_manager::config::{Config, validate_config};
//!
//! let mut config = Config::default();
//! config.root = "/tmp/mcs-servers".into();
//! config.supervisor.stop_timeout_secs = 10;
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{
    ApiConfig, Config, DEFAULT_READY_PATTERN, DEFAULT_WORKERS, EventsConfig, ServerConfig,
    ServerType, SupervisorConfig,
};
pub use validator::{validate_config, validate_server_config};
