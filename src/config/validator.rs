use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use regex::Regex;

/// Validates a server configuration before it is created or launched
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if let Some(command) = &config.command {
        if command.trim().is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' has an empty command",
                config.name
            )));
        }
    }

    if config.name.chars().any(char::is_control) {
        return Err(Error::ConfigInvalid(
            "Server name must not contain control characters".to_string(),
        ));
    }

    for key in config.env.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' has an invalid environment variable name '{}'",
                config.name, key
            )));
        }
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    if config.root.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("Manager root is empty".to_string()));
    }

    let supervisor = &config.supervisor;
    if supervisor.log_capacity == 0 {
        return Err(Error::ConfigInvalid(
            "supervisor.logCapacity must be at least 1".to_string(),
        ));
    }
    if supervisor.stop_command.trim().is_empty() {
        return Err(Error::ConfigInvalid(
            "supervisor.stopCommand is empty".to_string(),
        ));
    }
    Regex::new(&supervisor.ready_pattern).map_err(|e| {
        Error::ConfigInvalid(format!("supervisor.readyPattern is not a valid regex: {}", e))
    })?;

    if config.events.capacity == 0 {
        return Err(Error::ConfigInvalid(
            "events.capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}
