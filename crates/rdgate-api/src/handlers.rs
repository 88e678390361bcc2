use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::{ApiDoc, AppState};

fn parse_tunnel_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::InvalidTunnelId(id.to_string()))
}

/// Open a tunnel to a connection or connection group
#[utoipa::path(
    post,
    path = "/api/tunnels",
    request_body = CreateTunnelRequest,
    responses(
        (status = 201, description = "Tunnel opened", body = CreateTunnelResponse),
        (status = 400, description = "Malformed body, identifier or client information", body = ErrorResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 409, description = "Refused by a tunnel listener", body = ErrorResponse),
        (status = 502, description = "Backend handshake failed", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn create_tunnel(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTunnelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTunnelResponse>), ApiError> {
    let Json(req) = payload?;
    let (identifier, overrides) = req.into_parts();
    debug!("Opening tunnel to {}", identifier);

    let tunnel_id = state.transport.connect(&identifier, overrides).await?;

    Ok((StatusCode::CREATED, Json(CreateTunnelResponse { tunnel_id })))
}

/// List all open tunnels
#[utoipa::path(
    get,
    path = "/api/tunnels",
    responses(
        (status = 200, description = "List of tunnels", body = TunnelList)
    ),
    tag = "tunnels"
)]
pub async fn list_tunnels(State(state): State<Arc<AppState>>) -> Json<TunnelList> {
    let tunnels: Vec<TunnelInfo> = state
        .transport
        .tunnel_ids()
        .iter()
        .filter_map(|id| state.transport.tunnel(id))
        .map(|tunnel| TunnelInfo::from(tunnel.as_ref()))
        .collect();
    let total = tunnels.len();

    Json(TunnelList { tunnels, total })
}

/// Read pending backend instructions
///
/// Blocks until output is available or the idle timeout passes, in which
/// case the body is empty.
#[utoipa::path(
    get,
    path = "/api/tunnels/{id}",
    params(
        ("id" = Uuid, Path, description = "Tunnel ID")
    ),
    responses(
        (status = 200, description = "Encoded instructions", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "Tunnel not found", body = ErrorResponse),
        (status = 410, description = "Tunnel closed", body = ErrorResponse),
        (status = 502, description = "Backend stream failed", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn read_tunnel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_tunnel_id(&id)?;
    let data = state.transport.read(&id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        data,
    )
        .into_response())
}

/// Send instructions to the backend
#[utoipa::path(
    post,
    path = "/api/tunnels/{id}",
    params(
        ("id" = Uuid, Path, description = "Tunnel ID")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 204, description = "Instructions forwarded"),
        (status = 400, description = "Malformed instruction data", body = ErrorResponse),
        (status = 404, description = "Tunnel not found", body = ErrorResponse),
        (status = 410, description = "Tunnel closed", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn write_tunnel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let id = parse_tunnel_id(&id)?;
    state.transport.write(&id, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Close a tunnel
#[utoipa::path(
    delete,
    path = "/api/tunnels/{id}",
    params(
        ("id" = Uuid, Path, description = "Tunnel ID")
    ),
    responses(
        (status = 204, description = "Tunnel closed"),
        (status = 404, description = "Tunnel not found", body = ErrorResponse),
        (status = 409, description = "Close refused by a tunnel listener", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn delete_tunnel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_tunnel_id(&id)?;
    state.transport.close(&id)?;
    info!("Closed tunnel {} on client request", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tunnels: state.transport.tunnel_count(),
    })
}

/// OpenAPI document for this API
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
