//! Tunnels multiplexing one backend connection across independent HTTP calls
//!
//! Covers the backend socket, the configuration handshake, tunnel lifecycle,
//! the tunnel registry, listener notification and the HTTP-facing transport.
pub mod error;
pub mod handshake;
pub mod listener;
pub mod registry;
pub mod resolver;
pub mod socket;
pub mod transport;
pub mod tunnel;

pub use error::TunnelError;
pub use handshake::{ClientInformation, Configuration, HandshakeNegotiator};
pub use listener::{
    ListenerDecision, ListenerError, ListenerNotifier, NotifyOutcome, TunnelEvent, TunnelListener,
};
pub use registry::TunnelRegistry;
pub use resolver::{ConnectionResolver, ResolveError, ResolvedConnection, TargetId};
pub use socket::{BackendSocket, BackendStream, SocketReader, SocketWriter};
pub use transport::{ClientInfoOverrides, HttpTunnelTransport, TransportConfig};
pub use tunnel::{SessionInfo, Tunnel, TunnelState};
