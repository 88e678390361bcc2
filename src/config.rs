//! Gateway configuration file
//!
//! A JSON document listing the connections and connection groups the
//! gateway may open, and the backend proxy they are reached through.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Default address of the backend proxy daemon
pub const DEFAULT_BACKEND: &str = "127.0.0.1:4822";

/// A single remote desktop connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub id: String,
    /// Backend protocol, e.g. "vnc" or "rdp"
    pub protocol: String,
    /// Protocol parameters sent during the handshake
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Backend proxy for this connection, overriding the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// A group of interchangeable connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub id: String,
    /// Connection ids, tried in order
    pub members: Vec<String>,
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connections: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: GatewayConfig = serde_json::from_str(&json)
            .context(format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .context(format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Reject duplicate ids and groups naming unknown connections
    pub fn validate(&self) -> Result<()> {
        let mut connection_ids = HashSet::new();
        for connection in &self.connections {
            if connection.id.is_empty() {
                bail!("Connection id must not be empty");
            }
            if connection.protocol.is_empty() {
                bail!("Connection '{}' has no protocol", connection.id);
            }
            if !connection_ids.insert(connection.id.as_str()) {
                bail!("Duplicate connection id '{}'", connection.id);
            }
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if group.id.is_empty() {
                bail!("Group id must not be empty");
            }
            if !group_ids.insert(group.id.as_str()) {
                bail!("Duplicate group id '{}'", group.id);
            }
            if group.members.is_empty() {
                bail!("Group '{}' has no members", group.id);
            }
            if let Some(unknown) = group
                .members
                .iter()
                .find(|member| !connection_ids.contains(member.as_str()))
            {
                bail!("Group '{}' references unknown connection '{}'", group.id, unknown);
            }
        }

        Ok(())
    }
}
