//! Registry of open tunnels
//!
//! An id present in the registry always refers to an open tunnel. Closing
//! happens while the registry entry is exclusively held, so a concurrent
//! lookup either sees the open tunnel or no entry at all.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::TunnelError;
use crate::tunnel::{Tunnel, TunnelState};

/// Id → tunnel map shared by all requests
#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: DashMap<Uuid, Arc<Tunnel>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tunnel that completed connect notification
    pub fn insert(&self, tunnel: Arc<Tunnel>) {
        let id = tunnel.id();
        self.tunnels.insert(id, tunnel);
        debug!(tunnel_id = %id, "Tunnel registered");
    }

    /// Look up an open tunnel
    pub fn get(&self, id: &Uuid) -> Option<Arc<Tunnel>> {
        {
            let entry = self.tunnels.get(id)?;
            if entry.is_open() {
                return Some(entry.value().clone());
            }
        }

        // Closed without going through the registry
        if self.tunnels.remove_if(id, |_, tunnel| !tunnel.is_open()).is_some() {
            trace!(tunnel_id = %id, "Dropped stale tunnel entry");
        }
        None
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.get(id).is_some()
    }

    /// Close a tunnel and remove it from the registry.
    ///
    /// Close listeners run while the entry is held. A veto or listener error
    /// leaves the tunnel open and registered.
    pub fn close(&self, id: &Uuid) -> Result<TunnelState, TunnelError> {
        match self.tunnels.entry(*id) {
            Entry::Occupied(entry) => {
                let state = entry.get().close()?;
                entry.remove();
                debug!(tunnel_id = %id, "Tunnel deregistered");
                Ok(state)
            }
            Entry::Vacant(_) => Err(TunnelError::NotFound(*id)),
        }
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.tunnels.iter().map(|entry| *entry.key()).collect()
    }

    /// Remove and force-close every tunnel without consulting listeners.
    ///
    /// Returns how many tunnels were closed.
    pub fn shutdown(&self) -> usize {
        let mut closed = 0;
        for id in self.ids() {
            if let Some((_, tunnel)) = self.tunnels.remove(&id) {
                tunnel.discard();
                closed += 1;
            }
        }
        closed
    }
}
