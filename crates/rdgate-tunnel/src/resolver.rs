//! Connection targets and their resolution to backend sockets
//!
//! Clients name what they want to connect to with a namespaced identifier:
//! `c/<id>` for a single connection, `g/<id>` for a connection group. The
//! gateway never looks these up itself; a [`ConnectionResolver`] supplied by
//! the embedding application turns an authorized identifier into an open
//! backend socket plus the configuration to negotiate with.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::TunnelError;
use crate::handshake::{ClientInformation, Configuration};
use crate::socket::BackendSocket;

/// A parsed connection identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TargetId {
    /// A single connection (`c/` prefix)
    Connection(String),
    /// A balancing group of connections (`g/` prefix)
    ConnectionGroup(String),
}

impl TargetId {
    pub const CONNECTION_PREFIX: &'static str = "c/";
    pub const CONNECTION_GROUP_PREFIX: &'static str = "g/";

    /// Parse a prefixed identifier. Unknown or missing prefixes are rejected.
    pub fn parse(identifier: &str) -> Result<Self, TunnelError> {
        let (target, raw): (fn(String) -> TargetId, &str) =
            if let Some(raw) = identifier.strip_prefix(Self::CONNECTION_PREFIX) {
                (TargetId::Connection, raw)
            } else if let Some(raw) = identifier.strip_prefix(Self::CONNECTION_GROUP_PREFIX) {
                (TargetId::ConnectionGroup, raw)
            } else {
                return Err(TunnelError::Client(
                    "Illegal identifier - unknown type".to_string(),
                ));
            };

        if raw.is_empty() {
            return Err(TunnelError::Client("Illegal identifier - empty id".to_string()));
        }

        Ok(target(raw.to_string()))
    }

    /// Identifier with the namespace prefix removed
    pub fn raw_id(&self) -> &str {
        match self {
            TargetId::Connection(id) | TargetId::ConnectionGroup(id) => id,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            TargetId::Connection(_) => Self::CONNECTION_PREFIX,
            TargetId::ConnectionGroup(_) => Self::CONNECTION_GROUP_PREFIX,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.raw_id())
    }
}

impl FromStr for TargetId {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An open backend socket and the configuration to negotiate over it
pub struct ResolvedConnection {
    pub socket: BackendSocket,
    pub configuration: Configuration,
}

/// Resolution failures
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(#[from] std::io::Error),

    #[error("Resolver error: {0}")]
    Other(String),
}

impl From<ResolveError> for TunnelError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::AccessDenied(message) => TunnelError::AccessDenied(message),
            ResolveError::Unreachable(e) => TunnelError::Server(format!("Backend unreachable: {}", e)),
            ResolveError::Other(message) => TunnelError::Server(message),
        }
    }
}

/// Maps an authorized target to an open backend connection
///
/// # Example
/// ```ignore
/// struct SingleBackend { addr: String, config: Configuration }
///
/// #[async_trait]
/// impl ConnectionResolver for SingleBackend {
///     async fn resolve(
///         &self,
///         _target: &TargetId,
///         _info: &ClientInformation,
///     ) -> Result<ResolvedConnection, ResolveError> {
///         let socket = BackendSocket::connect(&self.addr).await?;
///         Ok(ResolvedConnection { socket, configuration: self.config.clone() })
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(
        &self,
        target: &TargetId,
        info: &ClientInformation,
    ) -> Result<ResolvedConnection, ResolveError>;
}
