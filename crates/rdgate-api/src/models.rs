use chrono::{DateTime, Utc};
use rdgate_tunnel::{ClientInfoOverrides, Tunnel, TunnelState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to open a new tunnel
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTunnelRequest {
    /// Prefixed connection identifier (`c/<id>` or `g/<id>`)
    #[schema(example = "c/desktop")]
    pub id: String,
    /// Optimal display width in pixels
    #[serde(default)]
    pub width: Option<u32>,
    /// Optimal display height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Supported audio mimetypes
    #[serde(default)]
    pub audio: Vec<String>,
    /// Supported video mimetypes
    #[serde(default)]
    pub video: Vec<String>,
}

impl CreateTunnelRequest {
    pub fn into_parts(self) -> (String, ClientInfoOverrides) {
        (
            self.id,
            ClientInfoOverrides {
                width: self.width,
                height: self.height,
                audio: self.audio,
                video: self.video,
            },
        )
    }
}

/// Response for a newly opened tunnel
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTunnelResponse {
    pub tunnel_id: Uuid,
}

/// Lifecycle state of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Open,
    Closed,
}

impl From<TunnelState> for TunnelStatus {
    fn from(state: TunnelState) -> Self {
        match state {
            TunnelState::Open => TunnelStatus::Open,
            TunnelState::Closed => TunnelStatus::Closed,
        }
    }
}

/// Tunnel information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TunnelInfo {
    pub id: Uuid,
    /// Prefixed identifier the tunnel was opened for
    pub target: String,
    /// Backend protocol negotiated during the handshake
    pub protocol: String,
    pub status: TunnelStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Tunnel> for TunnelInfo {
    fn from(tunnel: &Tunnel) -> Self {
        let session = tunnel.session();
        Self {
            id: tunnel.id(),
            target: session.target.to_string(),
            protocol: session.protocol.clone(),
            status: tunnel.state().into(),
            created_at: session.created_at,
        }
    }
}

/// List of open tunnels
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TunnelList {
    pub tunnels: Vec<TunnelInfo>,
    pub total: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Open tunnel count
    pub active_tunnels: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
