//! Backend socket: a duplex byte stream to the remote-desktop proxy
//!
//! The socket knows how to frame instructions but attaches no meaning to
//! them. Once split for use by a tunnel, the read and write halves share one
//! cancellation token so that closing the socket unblocks whichever half is
//! currently waiting on I/O.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use rdgate_proto::{Instruction, InstructionCodec};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TunnelError;

/// Any async duplex stream usable as a backend connection
pub trait BackendStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> BackendStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedStream = Box<dyn BackendStream>;

/// Read half of a backend socket
pub struct SocketReader {
    inner: Option<FramedRead<ReadHalf<BoxedStream>, InstructionCodec>>,
    closed: CancellationToken,
    deferred: Option<TunnelError>,
    /// Decoded output not yet handed to a client
    staged: BytesMut,
}

impl SocketReader {
    /// Read the next instruction.
    ///
    /// Returns `Ok(None)` when the backend ended the stream on an instruction
    /// boundary. Fails with [`TunnelError::Closed`] as soon as the socket is
    /// closed, even while waiting for data.
    pub async fn read_instruction(&mut self) -> Result<Option<Instruction>, TunnelError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if self.closed.is_cancelled() {
            self.inner = None;
            return Err(TunnelError::Closed);
        }
        let Some(framed) = self.inner.as_mut() else {
            return Err(TunnelError::Closed);
        };

        let next = tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            item = framed.next() => Some(item),
        };

        match next {
            None => {
                self.inner = None;
                Err(TunnelError::Closed)
            }
            Some(None) => Ok(None),
            Some(Some(Ok(instruction))) => Ok(Some(instruction)),
            Some(Some(Err(e))) => Err(e.into()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some() && !self.closed.is_cancelled()
    }

    /// Report `err` from the next read instead of touching the stream
    pub fn defer(&mut self, err: TunnelError) {
        self.deferred = Some(err);
    }

    /// Hold an instruction for the batch being assembled.
    ///
    /// Staged output survives the reading future being dropped and is
    /// handed out by the next [`take_staged`](Self::take_staged).
    pub fn stage(&mut self, instruction: &Instruction) {
        instruction.encode_into(&mut self.staged);
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Hand out everything staged so far
    pub fn take_staged(&mut self) -> Bytes {
        self.staged.split().freeze()
    }

    /// Drop the underlying read half
    pub fn release(&mut self) {
        self.inner = None;
    }
}

/// Write half of a backend socket
pub struct SocketWriter {
    inner: Option<WriteHalf<BoxedStream>>,
    closed: CancellationToken,
    max_instruction_size: usize,
}

impl SocketWriter {
    /// Write raw, already-framed bytes and flush them
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), TunnelError> {
        if self.closed.is_cancelled() {
            self.inner = None;
            return Err(TunnelError::Closed);
        }
        let Some(stream) = self.inner.as_mut() else {
            return Err(TunnelError::Closed);
        };

        let written = tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            result = async {
                stream.write_all(data).await?;
                stream.flush().await
            } => Some(result),
        };

        match written {
            None => {
                self.inner = None;
                Err(TunnelError::Closed)
            }
            Some(result) => Ok(result?),
        }
    }

    /// Encode and write a single instruction
    pub async fn write_instruction(&mut self, instruction: &Instruction) -> Result<(), TunnelError> {
        self.write_instructions(std::slice::from_ref(instruction))
            .await
    }

    /// Encode several instructions into one buffer and write them together
    pub async fn write_instructions(
        &mut self,
        instructions: &[Instruction],
    ) -> Result<(), TunnelError> {
        let mut buf = BytesMut::new();
        for instruction in instructions {
            if instruction.encoded_len() > self.max_instruction_size {
                return Err(TunnelError::Protocol(format!(
                    "Instruction '{}' is too large to send",
                    instruction.opcode()
                )));
            }
            instruction.encode_into(&mut buf);
        }
        self.write_raw(&buf).await
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some() && !self.closed.is_cancelled()
    }

    /// Drop the underlying write half
    pub fn release(&mut self) {
        self.inner = None;
    }
}

/// An open connection to the backend
pub struct BackendSocket {
    reader: SocketReader,
    writer: SocketWriter,
    closed: CancellationToken,
}

impl BackendSocket {
    /// Wrap an already-connected duplex stream
    pub fn new<S: BackendStream>(stream: S) -> Self {
        Self::with_codec(stream, InstructionCodec::new())
    }

    pub fn with_codec<S: BackendStream>(stream: S, codec: InstructionCodec) -> Self {
        let boxed: BoxedStream = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        let closed = CancellationToken::new();
        let max_instruction_size = codec.max_instruction_size();

        Self {
            reader: SocketReader {
                inner: Some(FramedRead::new(read_half, codec)),
                closed: closed.clone(),
                deferred: None,
                staged: BytesMut::new(),
            },
            writer: SocketWriter {
                inner: Some(write_half),
                closed: closed.clone(),
                max_instruction_size,
            },
            closed,
        }
    }

    /// Open a TCP connection to the backend proxy
    pub async fn connect(addr: &str) -> Result<Self, TunnelError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(backend = %addr, "Connected to backend");
        Ok(Self::new(stream))
    }

    pub async fn read_instruction(&mut self) -> Result<Option<Instruction>, TunnelError> {
        self.reader.read_instruction().await
    }

    pub async fn write_instruction(&mut self, instruction: &Instruction) -> Result<(), TunnelError> {
        self.writer.write_instruction(instruction).await
    }

    pub async fn write_instructions(
        &mut self,
        instructions: &[Instruction],
    ) -> Result<(), TunnelError> {
        self.writer.write_instructions(instructions).await
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), TunnelError> {
        self.writer.write_raw(data).await
    }

    /// Close the socket. Closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.closed.is_cancelled() {
            debug!("Closing backend socket");
        }
        self.closed.cancel();
        self.reader.release();
        self.writer.release();
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Token cancelled when the socket is closed
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Split into independently lockable halves
    pub fn into_split(self) -> (SocketReader, SocketWriter, CancellationToken) {
        (self.reader, self.writer, self.closed)
    }
}
