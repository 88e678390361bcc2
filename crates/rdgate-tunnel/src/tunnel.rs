//! Tunnel: a negotiated backend socket shared across HTTP calls
//!
//! Reads and writes are serialized independently: at most one read and at
//! most one write are in flight at any time, but a read and a write may run
//! concurrently. Closing cancels a token both halves select on, so a blocked
//! read or write fails with [`TunnelError::Closed`] immediately.

use chrono::{DateTime, Utc};
use rdgate_proto::Instruction;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TunnelError;
use crate::handshake::Configuration;
use crate::listener::{ListenerNotifier, NotifyOutcome, TunnelEvent};
use crate::resolver::TargetId;
use crate::socket::{BackendSocket, SocketReader, SocketWriter};

/// Lifecycle state of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelState {
    Open,
    Closed,
}

/// Immutable metadata describing what a tunnel is connected to
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub target: TargetId,
    pub protocol: String,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(target: TargetId, config: &Configuration) -> Self {
        Self {
            target,
            protocol: config.protocol().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A backend connection multiplexed across independent HTTP requests
pub struct Tunnel {
    id: Uuid,
    session: SessionInfo,
    reader: Mutex<SocketReader>,
    writer: Mutex<SocketWriter>,
    closed: CancellationToken,
    /// Serializes close attempts so listeners see each close at most once
    close_lock: StdMutex<()>,
    notifier: Arc<ListenerNotifier>,
}

impl Tunnel {
    pub fn new(socket: BackendSocket, session: SessionInfo, notifier: Arc<ListenerNotifier>) -> Self {
        let (reader, writer, closed) = socket.into_split();
        Self {
            id: Uuid::new_v4(),
            session,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
            close_lock: StdMutex::new(()),
            notifier,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn state(&self) -> TunnelState {
        if self.closed.is_cancelled() {
            TunnelState::Closed
        } else {
            TunnelState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == TunnelState::Open
    }

    /// Acquire the read lock, giving up if the tunnel closes while waiting
    pub async fn acquire_reader(&self) -> Result<MutexGuard<'_, SocketReader>, TunnelError> {
        let guard = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(TunnelError::Closed),
            guard = self.reader.lock() => guard,
        };
        if self.closed.is_cancelled() {
            return Err(TunnelError::Closed);
        }
        Ok(guard)
    }

    /// Acquire the write lock, giving up if the tunnel closes while waiting
    pub async fn acquire_writer(&self) -> Result<MutexGuard<'_, SocketWriter>, TunnelError> {
        let guard = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(TunnelError::Closed),
            guard = self.writer.lock() => guard,
        };
        if self.closed.is_cancelled() {
            return Err(TunnelError::Closed);
        }
        Ok(guard)
    }

    /// Read one instruction under the read lock
    pub async fn read_instruction(&self) -> Result<Option<Instruction>, TunnelError> {
        self.acquire_reader().await?.read_instruction().await
    }

    /// Write raw instruction bytes under the write lock
    pub async fn write_raw(&self, data: &[u8]) -> Result<(), TunnelError> {
        self.acquire_writer().await?.write_raw(data).await
    }

    /// Close the tunnel after asking close listeners.
    ///
    /// A veto leaves the tunnel open and returns [`TunnelError::Refused`].
    /// Closing an already closed tunnel is a no-op. Never waits on the read
    /// or write lock, so it is safe to call while holding either.
    pub fn close(&self) -> Result<TunnelState, TunnelError> {
        let _guard = self.close_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.is_open() {
            return Ok(TunnelState::Closed);
        }

        match self.notifier.notify(&TunnelEvent::Closed(self))? {
            NotifyOutcome::Accepted => {}
            NotifyOutcome::Vetoed(_) => {
                warn!(tunnel_id = %self.id, "Tunnel close canceled by listener");
                return Err(TunnelError::Refused(
                    "Tunnel close canceled by listener".to_string(),
                ));
            }
        }

        self.release();
        info!(
            tunnel_id = %self.id,
            target = %self.session.target,
            "Tunnel closed"
        );
        Ok(TunnelState::Closed)
    }

    /// Close without notifying listeners (connect vetoed, process shutdown)
    pub(crate) fn discard(&self) {
        let _guard = self.close_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.release();
    }

    fn release(&self) {
        self.closed.cancel();
        // Halves currently in use drop themselves once they observe the token
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.release();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.release();
        }
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("target", &self.session.target)
            .field("state", &self.state())
            .finish()
    }
}
