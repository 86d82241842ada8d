//! Minimal reader/writer for Java-style `server.properties` files.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// File name of the game's property file inside a server directory
pub const PROPERTIES_FILE: &str = "server.properties";

/// Player limit assumed when `max-players` is absent or unparsable
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// Parse `key=value` lines, skipping blanks and `#`/`!` comments
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Read and parse the property file of a server directory
pub fn read_properties(dir: &Path) -> Result<HashMap<String, String>> {
    let path = dir.join(PROPERTIES_FILE);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Other(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(parse_properties(&content))
}

/// Player limit configured for a server, falling back to the game default
pub fn max_players(dir: &Path) -> u32 {
    read_properties(dir)
        .ok()
        .and_then(|props| props.get("max-players").and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_MAX_PLAYERS)
}

/// Write a property file with `server-port` unless one already exists
pub fn ensure_properties(dir: &Path, port: u16) -> Result<()> {
    let path = dir.join(PROPERTIES_FILE);
    if path.exists() {
        return Ok(());
    }
    std::fs::write(&path, format!("server-port={}\n", port))
        .map_err(|e| Error::Other(format!("Failed to write {}: {}", path.display(), e)))
}
