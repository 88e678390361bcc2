//! Tunnel error taxonomy

use rdgate_proto::{CodecError, Status};
use thiserror::Error;
use uuid::Uuid;

use crate::listener::ListenerError;

/// Errors surfaced by tunnel operations
///
/// Listener vetoes are reported as [`TunnelError::Refused`] so callers can
/// tell an explicit refusal from a failure of the surrounding I/O.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Backend closed the stream unexpectedly")]
    EndOfStream,

    #[error("Handshake failed: {message}")]
    Handshake { message: String, status: Status },

    #[error("Tunnel is closed")]
    Closed,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bad request: {0}")]
    Client(String),

    #[error("Tunnel not found: {0}")]
    NotFound(Uuid),

    #[error("Refused by listener: {0}")]
    Refused(String),

    #[error("Listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    pub fn handshake(message: impl Into<String>) -> Self {
        TunnelError::Handshake {
            message: message.into(),
            status: Status::UpstreamError,
        }
    }

    /// True for errors caused by the caller's input rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(self, TunnelError::Client(_) | TunnelError::NotFound(_))
    }

    /// Protocol status reported to HTTP clients for this error
    pub fn status(&self) -> Status {
        match self {
            TunnelError::Protocol(_) => Status::UpstreamError,
            TunnelError::EndOfStream => Status::UpstreamError,
            TunnelError::Handshake { status, .. } => *status,
            TunnelError::Closed => Status::ResourceClosed,
            TunnelError::AccessDenied(_) => Status::ClientForbidden,
            TunnelError::Client(_) => Status::ClientBadRequest,
            TunnelError::NotFound(_) => Status::ResourceNotFound,
            TunnelError::Refused(_) => Status::ClientForbidden,
            TunnelError::Listener(_) => Status::ServerError,
            TunnelError::Server(_) => Status::ServerError,
            TunnelError::Io(_) => Status::ServerError,
        }
    }
}

impl From<CodecError> for TunnelError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(message) => TunnelError::Protocol(message),
            CodecError::EndOfStream => TunnelError::EndOfStream,
            CodecError::Io(e) => TunnelError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors_keep_their_kind() {
        let protocol: TunnelError = CodecError::Protocol("bad".into()).into();
        let eof: TunnelError = CodecError::EndOfStream.into();

        assert!(matches!(protocol, TunnelError::Protocol(m) if m == "bad"));
        assert!(matches!(eof, TunnelError::EndOfStream));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(TunnelError::Closed.status(), Status::ResourceClosed);
        assert_eq!(
            TunnelError::Client("x".into()).status(),
            Status::ClientBadRequest
        );
        assert_eq!(
            TunnelError::Handshake {
                message: "busy".into(),
                status: Status::ServerBusy
            }
            .status(),
            Status::ServerBusy
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(TunnelError::NotFound(Uuid::nil()).is_client_error());
        assert!(!TunnelError::Refused("no".into()).is_client_error());
        assert!(!TunnelError::EndOfStream.is_client_error());
    }
}
