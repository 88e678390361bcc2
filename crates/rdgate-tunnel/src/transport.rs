//! HTTP tunnel transport
//!
//! Browser clients cannot hold a socket open, so each connect, read, write
//! and close arrives as an independent request. The transport maps those
//! calls onto registered tunnels: it resolves and negotiates new backend
//! connections, batches backend output into bounded responses, validates
//! client input before forwarding it, and closes tunnels whose backend
//! stream fails.

use bytes::Bytes;
use rdgate_proto::{opcode, Instruction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::TunnelError;
use crate::handshake::{ClientInformation, HandshakeNegotiator};
use crate::listener::{ListenerNotifier, NotifyOutcome, TunnelEvent};
use crate::registry::TunnelRegistry;
use crate::resolver::{ConnectionResolver, ResolvedConnection, TargetId};
use crate::tunnel::{SessionInfo, Tunnel, TunnelState};

/// Timing and sizing of read responses
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long a read waits for the first instruction before returning empty
    pub idle_timeout: Duration,
    /// A batch stops growing once it reaches this many bytes
    pub batch_max_bytes: usize,
    /// A batch stops growing this long after its first instruction arrived
    pub batch_max_duration: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            batch_max_bytes: 64 * 1024,
            batch_max_duration: Duration::from_millis(250),
        }
    }
}

/// Client-supplied display and media capabilities for a new tunnel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfoOverrides {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub audio: Vec<String>,
    #[serde(default)]
    pub video: Vec<String>,
}

impl ClientInfoOverrides {
    /// Apply the overrides on top of the default client information
    pub fn into_client_information(self) -> Result<ClientInformation, TunnelError> {
        let mut info = ClientInformation::new();
        if self.width.is_some() || self.height.is_some() {
            info.set_optimal_size(
                self.width.unwrap_or(info.optimal_width()),
                self.height.unwrap_or(info.optimal_height()),
            )?;
        }
        for mimetype in self.audio {
            info.add_audio_mimetype(mimetype);
        }
        for mimetype in self.video {
            info.add_video_mimetype(mimetype);
        }
        Ok(info)
    }
}

/// Adapts stateless connect/read/write/close calls onto tunnels
pub struct HttpTunnelTransport {
    resolver: Arc<dyn ConnectionResolver>,
    notifier: Arc<ListenerNotifier>,
    registry: Arc<TunnelRegistry>,
    config: TransportConfig,
}

impl HttpTunnelTransport {
    pub fn new(resolver: Arc<dyn ConnectionResolver>, config: TransportConfig) -> Self {
        Self {
            resolver,
            notifier: Arc::new(ListenerNotifier::new()),
            registry: Arc::new(TunnelRegistry::new()),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<ListenerNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_registry(mut self, registry: Arc<TunnelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Arc<ListenerNotifier> {
        &self.notifier
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    /// Resolve, negotiate and register a new tunnel
    pub async fn connect(
        &self,
        identifier: &str,
        overrides: ClientInfoOverrides,
    ) -> Result<Uuid, TunnelError> {
        let target = TargetId::parse(identifier)?;
        let info = overrides.into_client_information()?;

        debug!(target = %target, "Resolving connection");
        let ResolvedConnection {
            socket,
            configuration,
        } = self.resolver.resolve(&target, &info).await.map_err(|e| {
            warn!(target = %target, "Connection resolution failed: {}", e);
            TunnelError::from(e)
        })?;

        let socket = HandshakeNegotiator::new(&configuration, &info)
            .negotiate(socket)
            .await
            .map_err(|e| {
                warn!(target = %target, "Handshake failed: {}", e);
                e
            })?;

        let session = SessionInfo::new(target, &configuration);
        let tunnel = Arc::new(Tunnel::new(socket, session, self.notifier.clone()));

        match self.notifier.notify(&TunnelEvent::Connected(&tunnel)) {
            Ok(NotifyOutcome::Accepted) => {}
            Ok(NotifyOutcome::Vetoed(_)) => {
                tunnel.discard();
                return Err(TunnelError::Refused(
                    "Tunnel connection refused by listener".to_string(),
                ));
            }
            Err(e) => {
                tunnel.discard();
                return Err(e.into());
            }
        }

        self.registry.insert(tunnel.clone());
        info!(
            tunnel_id = %tunnel.id(),
            target = %tunnel.session().target,
            protocol = %tunnel.session().protocol,
            "Tunnel connected"
        );
        Ok(tunnel.id())
    }

    /// Read the next batch of backend output.
    ///
    /// Returns an empty buffer if nothing arrived within the idle timeout.
    /// The tunnel stays open in that case.
    pub async fn read(&self, id: &Uuid) -> Result<Bytes, TunnelError> {
        let tunnel = self.lookup(id)?;

        match self.read_batch(&tunnel).await {
            Ok(batch) => Ok(batch),
            Err(TunnelError::Closed) => Err(TunnelError::Closed),
            Err(e) => {
                warn!(tunnel_id = %id, "Backend read failed: {}", e);
                self.close_after_failure(id);
                Err(e)
            }
        }
    }

    /// Validate client instructions and forward them verbatim
    pub async fn write(&self, id: &Uuid, data: &[u8]) -> Result<(), TunnelError> {
        let tunnel = self.lookup(id)?;

        let instructions = Instruction::parse_all(data)
            .map_err(|e| TunnelError::Client(format!("Malformed instruction data: {}", e)))?;
        if instructions.is_empty() {
            return Ok(());
        }
        trace!(tunnel_id = %id, count = instructions.len(), "Forwarding instructions");

        match tunnel.write_raw(data).await {
            Ok(()) => Ok(()),
            Err(TunnelError::Closed) => Err(TunnelError::Closed),
            Err(e) => {
                warn!(tunnel_id = %id, "Backend write failed: {}", e);
                self.close_after_failure(id);
                Err(TunnelError::Server(format!(
                    "Failed to write to backend: {}",
                    e
                )))
            }
        }
    }

    /// Close a tunnel at the client's request
    pub fn close(&self, id: &Uuid) -> Result<TunnelState, TunnelError> {
        self.registry.close(id)
    }

    /// Open tunnel by id
    pub fn tunnel(&self, id: &Uuid) -> Option<Arc<Tunnel>> {
        self.registry.get(id)
    }

    pub fn tunnel_ids(&self) -> Vec<Uuid> {
        self.registry.ids()
    }

    pub fn tunnel_count(&self) -> usize {
        self.registry.len()
    }

    /// Force-close every tunnel
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.shutdown();
        if closed > 0 {
            info!(count = closed, "Closed remaining tunnels");
        }
        closed
    }

    fn lookup(&self, id: &Uuid) -> Result<Arc<Tunnel>, TunnelError> {
        self.registry.get(id).ok_or(TunnelError::NotFound(*id))
    }

    async fn read_batch(&self, tunnel: &Tunnel) -> Result<Bytes, TunnelError> {
        let idle_deadline = Instant::now() + self.config.idle_timeout;

        let Ok(reader) = timeout_at(idle_deadline, tunnel.acquire_reader()).await else {
            debug!(tunnel_id = %tunnel.id(), "Read lock still held at idle timeout");
            return Ok(Bytes::new());
        };
        let mut reader = reader?;

        // Output is staged in the tunnel, not in this future, so a read
        // dropped mid-batch leaves it for the next one
        if reader.staged_len() > 0 {
            debug!(
                tunnel_id = %tunnel.id(),
                bytes = reader.staged_len(),
                "Resuming batch left by an interrupted read"
            );
        } else {
            let first = match timeout_at(idle_deadline, reader.read_instruction()).await {
                Err(_) => {
                    trace!(tunnel_id = %tunnel.id(), "No backend output before idle timeout");
                    return Ok(Bytes::new());
                }
                Ok(result) => result?.ok_or(TunnelError::EndOfStream)?,
            };

            reader.stage(&first);
            if first.opcode() == opcode::SYNC {
                return Ok(reader.take_staged());
            }
        }

        let batch_deadline = Instant::now() + self.config.batch_max_duration;
        while reader.staged_len() < self.config.batch_max_bytes {
            match timeout_at(batch_deadline, reader.read_instruction()).await {
                Err(_) => break,
                Ok(Ok(Some(instruction))) => {
                    reader.stage(&instruction);
                    if instruction.opcode() == opcode::SYNC {
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    reader.defer(TunnelError::EndOfStream);
                    break;
                }
                Ok(Err(TunnelError::Closed)) => return Err(TunnelError::Closed),
                Ok(Err(e)) => {
                    // Deliver what was collected; the failure ends the next read
                    reader.defer(e);
                    break;
                }
            }
        }

        Ok(reader.take_staged())
    }

    fn close_after_failure(&self, id: &Uuid) {
        match self.registry.close(id) {
            Ok(_) | Err(TunnelError::NotFound(_)) => {}
            Err(e) => warn!(tunnel_id = %id, "Failed to close tunnel after backend failure: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Configuration;
    use crate::listener::{ListenerDecision, ListenerError, TunnelListener};
    use crate::resolver::ResolveError;
    use crate::socket::BackendSocket;
    use async_trait::async_trait;
    use futures::StreamExt;
    use rdgate_proto::InstructionCodec;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;
    use tokio_util::codec::FramedRead;

    /// Resolver handing out in-memory backends whose far ends go to the test
    struct FakeResolver {
        resolved: Mutex<Vec<TargetId>>,
        backends: mpsc::UnboundedSender<DuplexStream>,
    }

    impl FakeResolver {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let resolver = Arc::new(Self {
                resolved: Mutex::new(Vec::new()),
                backends: tx,
            });
            (resolver, rx)
        }
    }

    #[async_trait]
    impl ConnectionResolver for FakeResolver {
        async fn resolve(
            &self,
            target: &TargetId,
            _info: &ClientInformation,
        ) -> Result<ResolvedConnection, ResolveError> {
            self.resolved.lock().unwrap().push(target.clone());

            let (local, mut remote) = tokio::io::duplex(64 * 1024);
            remote.write_all(b"4.args,8.hostname;").await?;
            self.backends
                .send(remote)
                .map_err(|_| ResolveError::Other("test finished".into()))?;

            Ok(ResolvedConnection {
                socket: BackendSocket::new(local),
                configuration: Configuration::new("vnc").with_parameter("hostname", "desk"),
            })
        }
    }

    struct Veto;

    impl TunnelListener for Veto {
        fn on_event(&self, _event: &TunnelEvent<'_>) -> Result<ListenerDecision, ListenerError> {
            Ok(ListenerDecision::Veto)
        }
    }

    /// Fails notification for one kind of event
    struct Failing(&'static str);

    impl TunnelListener for Failing {
        fn on_event(&self, event: &TunnelEvent<'_>) -> Result<ListenerDecision, ListenerError> {
            if event.name() == self.0 {
                Err(ListenerError::new("audit store unavailable"))
            } else {
                Ok(ListenerDecision::Accept)
            }
        }
    }

    fn quick_config() -> TransportConfig {
        TransportConfig {
            idle_timeout: Duration::from_millis(100),
            batch_max_bytes: 1024,
            batch_max_duration: Duration::from_millis(50),
        }
    }

    /// Consume everything the gateway sent during the handshake
    async fn drain_handshake(remote: &mut DuplexStream) -> Vec<Instruction> {
        let mut framed = FramedRead::new(remote, InstructionCodec::new());
        let mut seen = Vec::new();
        while let Some(instruction) = framed.next().await {
            let instruction = instruction.unwrap();
            let done = instruction.opcode() == opcode::CONNECT;
            seen.push(instruction);
            if done {
                break;
            }
        }
        seen
    }

    async fn connected() -> (HttpTunnelTransport, Uuid, DuplexStream) {
        let (resolver, mut backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver, quick_config());
        let id = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await
            .unwrap();
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;
        (transport, id, remote)
    }

    #[tokio::test]
    async fn test_connect_resolves_single_connection() {
        let (resolver, mut backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver.clone(), quick_config());

        let id = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await
            .unwrap();

        assert_eq!(
            *resolver.resolved.lock().unwrap(),
            vec![TargetId::Connection("abc123".to_string())]
        );
        assert_eq!(transport.tunnel_ids(), vec![id]);

        let mut remote = backends.recv().await.unwrap();
        let handshake = drain_handshake(&mut remote).await;
        assert_eq!(handshake[0], Instruction::new("select", ["vnc"]));
        assert_eq!(
            handshake.last().unwrap(),
            &Instruction::new("connect", ["desk"])
        );
    }

    #[tokio::test]
    async fn test_unknown_prefix_never_resolves() {
        let (resolver, _backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver.clone(), quick_config());

        let result = transport
            .connect("x/abc123", ClientInfoOverrides::default())
            .await;

        assert!(matches!(result, Err(TunnelError::Client(_))));
        assert!(resolver.resolved.lock().unwrap().is_empty());
        assert_eq!(transport.tunnel_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_veto_leaves_nothing_registered() {
        let (resolver, mut backends) = FakeResolver::new();
        let notifier = Arc::new(ListenerNotifier::with_listeners(vec![
            Arc::new(Veto) as Arc<dyn TunnelListener>,
        ]));
        let transport =
            HttpTunnelTransport::new(resolver, quick_config()).with_notifier(notifier);

        let result = transport
            .connect("g/lab", ClientInfoOverrides::default())
            .await;

        assert!(matches!(result, Err(TunnelError::Refused(_))));
        assert_eq!(transport.tunnel_count(), 0);

        // Backend socket was closed
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;
        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_size_rejected_before_resolving() {
        let (resolver, _backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver.clone(), quick_config());
        let overrides = ClientInfoOverrides {
            width: Some(0),
            ..Default::default()
        };

        let result = transport.connect("c/abc123", overrides).await;

        assert!(matches!(result, Err(TunnelError::Client(_))));
        assert!(resolver.resolved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_read_returns_empty_and_keeps_tunnel_open() {
        let (transport, id, mut remote) = connected().await;

        let batch = transport.read(&id).await.unwrap();
        assert!(batch.is_empty());
        assert!(transport.tunnel(&id).unwrap().is_open());

        remote.write_all(b"4.sync,3.100;").await.unwrap();
        let batch = transport.read(&id).await.unwrap();
        assert_eq!(&batch[..], b"4.sync,3.100;");
    }

    #[tokio::test]
    async fn test_read_batches_until_sync() {
        let (transport, id, mut remote) = connected().await;

        remote
            .write_all(b"3.png,1.0;3.png,1.1;4.sync,1.5;4.name,2.me;")
            .await
            .unwrap();

        let first = transport.read(&id).await.unwrap();
        assert_eq!(&first[..], b"3.png,1.0;3.png,1.1;4.sync,1.5;");

        let second = transport.read(&id).await.unwrap();
        assert_eq!(&second[..], b"4.name,2.me;");
    }

    #[tokio::test]
    async fn test_read_batch_stops_at_size_cap() {
        let (resolver, mut backends) = FakeResolver::new();
        let config = TransportConfig {
            batch_max_bytes: 16,
            ..quick_config()
        };
        let transport = HttpTunnelTransport::new(resolver, config);
        let id = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await
            .unwrap();
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;

        // Each instruction is 10 bytes
        remote.write_all(b"3.png,1.0;3.png,1.1;3.png,1.2;").await.unwrap();

        let first = transport.read(&id).await.unwrap();
        assert_eq!(&first[..], b"3.png,1.0;3.png,1.1;");
        let second = transport.read(&id).await.unwrap();
        assert_eq!(&second[..], b"3.png,1.2;");
    }

    #[tokio::test]
    async fn test_eof_after_data_is_reported_on_next_read() {
        let (transport, id, mut remote) = connected().await;

        remote.write_all(b"4.name,2.me;").await.unwrap();
        drop(remote);

        let batch = transport.read(&id).await.unwrap();
        assert_eq!(&batch[..], b"4.name,2.me;");
        assert!(transport.tunnel(&id).is_some());

        assert!(matches!(
            transport.read(&id).await,
            Err(TunnelError::EndOfStream)
        ));
        assert!(transport.tunnel(&id).is_none());
        assert!(matches!(
            transport.read(&id).await,
            Err(TunnelError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_read_keeps_collected_output() {
        let (transport, id, mut remote) = connected().await;

        remote.write_all(b"3.png,1.0;").await.unwrap();
        // Gives up while the batch is still waiting for sync
        let abandoned = tokio::time::timeout(Duration::from_millis(20), transport.read(&id)).await;
        assert!(abandoned.is_err());

        remote.write_all(b"4.sync,1.1;").await.unwrap();
        let batch = transport.read(&id).await.unwrap();
        assert_eq!(&batch[..], b"3.png,1.0;4.sync,1.1;");
    }

    #[tokio::test]
    async fn test_binary_output_passes_through() {
        let (transport, id, mut remote) = connected().await;

        remote.write_all(b"4.blob,2.\xff\xfe;4.sync,1.1;").await.unwrap();

        let batch = transport.read(&id).await.unwrap();
        assert_eq!(&batch[..], b"4.blob,2.\xff\xfe;4.sync,1.1;");
        assert!(transport.tunnel(&id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_failed_write_closes_tunnel() {
        let (transport, id, remote) = connected().await;
        drop(remote);

        let result = transport.write(&id, b"3.nop;").await;

        assert!(matches!(result, Err(TunnelError::Server(_))));
        assert_eq!(transport.tunnel_count(), 0);
        assert!(matches!(
            transport.read(&id).await,
            Err(TunnelError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_listener_error_fails_connect() {
        let (resolver, mut backends) = FakeResolver::new();
        let notifier = Arc::new(ListenerNotifier::with_listeners(vec![
            Arc::new(Failing("connected")) as Arc<dyn TunnelListener>,
        ]));
        let transport =
            HttpTunnelTransport::new(resolver, quick_config()).with_notifier(notifier);

        let result = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await;

        assert!(matches!(result, Err(TunnelError::Listener(_))));
        assert_eq!(transport.tunnel_count(), 0);

        // Backend socket was discarded
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;
        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_close_listener_error_keeps_tunnel_open() {
        let (resolver, mut backends) = FakeResolver::new();
        let notifier = Arc::new(ListenerNotifier::with_listeners(vec![
            Arc::new(Failing("closed")) as Arc<dyn TunnelListener>,
        ]));
        let transport =
            HttpTunnelTransport::new(resolver, quick_config()).with_notifier(notifier);
        let id = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await
            .unwrap();
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;

        assert!(matches!(
            transport.close(&id),
            Err(TunnelError::Listener(_))
        ));
        assert_eq!(transport.tunnel_ids(), vec![id]);
        assert!(transport.tunnel(&id).unwrap().is_open());

        remote.write_all(b"4.sync,1.1;").await.unwrap();
        assert_eq!(&transport.read(&id).await.unwrap()[..], b"4.sync,1.1;");
    }

    #[tokio::test]
    async fn test_write_forwards_raw_bytes() {
        let (transport, id, mut remote) = connected().await;

        transport.write(&id, b"5.mouse,2.10,2.20;").await.unwrap();

        let mut buf = [0u8; 18];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"5.mouse,2.10,2.20;");
    }

    #[tokio::test]
    async fn test_malformed_write_is_client_error() {
        let (transport, id, _remote) = connected().await;

        for data in [&b"5.mouse,2.10"[..], b"x.mouse;", b"5.mouse:"] {
            let result = transport.write(&id, data).await;
            assert!(matches!(result, Err(TunnelError::Client(_))));
        }
        assert!(transport.tunnel(&id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_unknown_tunnel_is_not_found() {
        let (resolver, _backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver, quick_config());
        let id = Uuid::new_v4();

        assert!(matches!(transport.read(&id).await, Err(TunnelError::NotFound(_))));
        assert!(matches!(
            transport.write(&id, b"3.nop;").await,
            Err(TunnelError::NotFound(_))
        ));
        assert!(matches!(transport.close(&id), Err(TunnelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_close_deregisters() {
        let (transport, id, _remote) = connected().await;

        assert_eq!(transport.close(&id).unwrap(), TunnelState::Closed);
        assert_eq!(transport.tunnel_count(), 0);
        assert!(matches!(transport.read(&id).await, Err(TunnelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (resolver, _backends) = FakeResolver::new();
        let transport = HttpTunnelTransport::new(resolver, quick_config());
        for _ in 0..3 {
            transport
                .connect("c/abc123", ClientInfoOverrides::default())
                .await
                .unwrap();
        }

        assert_eq!(transport.shutdown(), 3);
        assert_eq!(transport.tunnel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_are_serialized() {
        let (resolver, mut backends) = FakeResolver::new();
        let transport = Arc::new(HttpTunnelTransport::new(
            resolver,
            TransportConfig {
                idle_timeout: Duration::from_secs(30),
                ..quick_config()
            },
        ));
        let id = transport
            .connect("c/abc123", ClientInfoOverrides::default())
            .await
            .unwrap();
        let mut remote = backends.recv().await.unwrap();
        drain_handshake(&mut remote).await;

        let first = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.read(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.read(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        remote.write_all(b"4.sync,1.1;").await.unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(&first[..], b"4.sync,1.1;");
        assert!(!second.is_finished());

        remote.write_all(b"4.sync,1.2;").await.unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(&second[..], b"4.sync,1.2;");
    }

    #[test]
    fn test_overrides_apply_to_defaults() {
        let info = ClientInfoOverrides {
            width: Some(1920),
            height: None,
            audio: vec!["audio/L16".into()],
            video: vec![],
        }
        .into_client_information()
        .unwrap();

        assert_eq!(info.optimal_width(), 1920);
        assert_eq!(info.optimal_height(), 768);
        assert_eq!(info.audio_mimetypes().collect::<Vec<_>>(), vec!["audio/L16"]);
    }
}
