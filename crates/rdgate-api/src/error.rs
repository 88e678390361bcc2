//! Mapping of tunnel failures onto HTTP responses
//!
//! Every error response carries a JSON [`ErrorResponse`] body and the
//! numeric protocol status in the `X-Tunnel-Status` header.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rdgate_proto::Status;
use rdgate_tunnel::TunnelError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Header carrying the protocol status code of a failed request
pub const TUNNEL_STATUS_HEADER: HeaderName = HeaderName::from_static("x-tunnel-status");

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("Tunnel '{0}' not found")]
    InvalidTunnelId(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidTunnelId(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Tunnel(err) => match err {
                TunnelError::Client(_) => StatusCode::BAD_REQUEST,
                TunnelError::NotFound(_) => StatusCode::NOT_FOUND,
                TunnelError::AccessDenied(_) => StatusCode::FORBIDDEN,
                TunnelError::Refused(_) => StatusCode::CONFLICT,
                TunnelError::Closed => StatusCode::GONE,
                TunnelError::Handshake { .. }
                | TunnelError::Protocol(_)
                | TunnelError::EndOfStream => StatusCode::BAD_GATEWAY,
                TunnelError::Listener(_) | TunnelError::Server(_) | TunnelError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidTunnelId(_) => "TUNNEL_NOT_FOUND",
            ApiError::InvalidBody(_) => "BAD_REQUEST",
            ApiError::Tunnel(err) => match err {
                TunnelError::Client(_) => "BAD_REQUEST",
                TunnelError::NotFound(_) => "TUNNEL_NOT_FOUND",
                TunnelError::AccessDenied(_) => "ACCESS_DENIED",
                TunnelError::Refused(_) => "REFUSED",
                TunnelError::Closed => "TUNNEL_CLOSED",
                TunnelError::Handshake { .. } => "HANDSHAKE_FAILED",
                TunnelError::Protocol(_) | TunnelError::EndOfStream => "UPSTREAM_ERROR",
                TunnelError::Listener(_) | TunnelError::Server(_) | TunnelError::Io(_) => {
                    "SERVER_ERROR"
                }
            },
        }
    }

    pub fn protocol_status(&self) -> Status {
        match self {
            ApiError::InvalidTunnelId(_) => Status::ResourceNotFound,
            ApiError::InvalidBody(_) => Status::ClientBadRequest,
            ApiError::Tunnel(err) => err.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.error_code().to_string()),
        };
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            TUNNEL_STATUS_HEADER,
            HeaderValue::from(self.protocol_status().code()),
        );
        response
    }
}
