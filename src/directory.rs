//! Connection directory backed by the configuration file
//!
//! Unknown ids resolve to access denied, the same answer an unauthorized
//! user gets, so the directory never reveals which ids exist.

use async_trait::async_trait;
use rdgate_tunnel::{
    BackendSocket, ClientInformation, Configuration, ConnectionResolver, ResolveError,
    ResolvedConnection, TargetId, TunnelError,
};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{ConnectionDefinition, GatewayConfig};

pub struct StaticDirectory {
    backend: String,
    connections: HashMap<String, ConnectionDefinition>,
    groups: HashMap<String, Vec<String>>,
}

impl StaticDirectory {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            backend: config.backend,
            connections: config
                .connections
                .into_iter()
                .map(|connection| (connection.id.clone(), connection))
                .collect(),
            groups: config
                .groups
                .into_iter()
                .map(|group| (group.id, group.members))
                .collect(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    async fn open(&self, connection: &ConnectionDefinition) -> Result<ResolvedConnection, ResolveError> {
        let backend = connection.backend.as_deref().unwrap_or(&self.backend);
        debug!(connection = %connection.id, backend = %backend, "Opening backend connection");

        let socket = BackendSocket::connect(backend)
            .await
            .map_err(|e| match e {
                TunnelError::Io(e) => ResolveError::Unreachable(e),
                other => ResolveError::Other(other.to_string()),
            })?;

        let mut configuration = Configuration::new(connection.protocol.as_str());
        for (name, value) in &connection.parameters {
            configuration.set_parameter(name.as_str(), value.as_str());
        }

        Ok(ResolvedConnection {
            socket,
            configuration,
        })
    }

    fn denied(target: &TargetId) -> ResolveError {
        ResolveError::AccessDenied(format!("No such connection: {}", target))
    }
}

#[async_trait]
impl ConnectionResolver for StaticDirectory {
    async fn resolve(
        &self,
        target: &TargetId,
        _info: &ClientInformation,
    ) -> Result<ResolvedConnection, ResolveError> {
        match target {
            TargetId::Connection(id) => {
                let connection = self.connections.get(id).ok_or_else(|| Self::denied(target))?;
                self.open(connection).await
            }
            TargetId::ConnectionGroup(id) => {
                let members = self.groups.get(id).ok_or_else(|| Self::denied(target))?;

                // First member whose backend accepts the connection wins
                let mut last_error = None;
                for member in members {
                    let Some(connection) = self.connections.get(member) else {
                        continue;
                    };
                    match self.open(connection).await {
                        Ok(resolved) => {
                            debug!(group = %id, connection = %member, "Selected group member");
                            return Ok(resolved);
                        }
                        Err(e) => {
                            warn!(group = %id, connection = %member, "Group member unavailable: {}", e);
                            last_error = Some(e);
                        }
                    }
                }

                Err(last_error.unwrap_or_else(|| Self::denied(target)))
            }
        }
    }
}
