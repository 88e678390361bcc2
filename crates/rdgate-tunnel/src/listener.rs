//! Tunnel lifecycle listeners
//!
//! Listeners observe tunnel connect and close events and may veto them.
//! They run synchronously, in registration order, on the task performing the
//! connect or close. The first veto stops notification; a listener error
//! aborts notification and fails the surrounding operation.

use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tunnel::Tunnel;

/// Event delivered to listeners
#[derive(Clone, Copy)]
pub enum TunnelEvent<'a> {
    /// The tunnel finished its handshake and is about to be registered
    Connected(&'a Tunnel),
    /// The tunnel is about to be closed
    Closed(&'a Tunnel),
}

impl<'a> TunnelEvent<'a> {
    pub fn tunnel(&self) -> &'a Tunnel {
        match self {
            TunnelEvent::Connected(tunnel) | TunnelEvent::Closed(tunnel) => tunnel,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TunnelEvent::Connected(_) => "connected",
            TunnelEvent::Closed(_) => "closed",
        }
    }
}

/// A listener's answer to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerDecision {
    Accept,
    Veto,
}

/// Result of notifying every listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Accepted,
    /// Index of the listener that refused
    Vetoed(usize),
}

/// Error raised by a listener
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ListenerError(String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Observer of tunnel lifecycle events
pub trait TunnelListener: Send + Sync {
    fn on_event(&self, event: &TunnelEvent<'_>) -> Result<ListenerDecision, ListenerError>;
}

/// Ordered collection of listeners
#[derive(Default)]
pub struct ListenerNotifier {
    listeners: RwLock<Vec<Arc<dyn TunnelListener>>>,
}

impl ListenerNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(listeners: Vec<Arc<dyn TunnelListener>>) -> Self {
        Self {
            listeners: RwLock::new(listeners),
        }
    }

    /// Append a listener; it will be notified after all earlier ones
    pub fn register(&self, listener: Arc<dyn TunnelListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify listeners in order, stopping at the first veto or error
    pub fn notify(&self, event: &TunnelEvent<'_>) -> Result<NotifyOutcome, ListenerError> {
        // Snapshot so listeners may register further listeners
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, listener) in listeners.iter().enumerate() {
            match listener.on_event(event) {
                Ok(ListenerDecision::Accept) => {}
                Ok(ListenerDecision::Veto) => {
                    debug!(
                        tunnel_id = %event.tunnel().id(),
                        listener = index,
                        "Tunnel {} vetoed by listener",
                        event.name()
                    );
                    return Ok(NotifyOutcome::Vetoed(index));
                }
                Err(e) => {
                    warn!(
                        tunnel_id = %event.tunnel().id(),
                        listener = index,
                        "Listener failed during tunnel {} notification: {}",
                        event.name(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(NotifyOutcome::Accepted)
    }
}
