//! Connection handshake
//!
//! Before general traffic may flow, the backend must be told which protocol
//! to use and how to configure it:
//!
//! ```text
//! gateway -> backend   select <protocol>
//! backend -> gateway   args <name> <name> ...
//! gateway -> backend   size <width> <height>
//! gateway -> backend   audio <mimetype> ...
//! gateway -> backend   video <mimetype> ...
//! gateway -> backend   connect <value> <value> ...
//! ```
//!
//! The values sent with `connect` line up one-to-one with the names the
//! backend requested in `args`.

use rdgate_proto::{opcode, Instruction, Status};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::error::TunnelError;
use crate::socket::BackendSocket;

pub const DEFAULT_SCREEN_WIDTH: u32 = 1024;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 768;

/// Backend protocol selection and its parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    protocol: String,
    /// Existing backend session to join instead of starting a new one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connection_id: Option<String>,
    #[serde(default)]
    parameters: HashMap<String, String>,
}

impl Configuration {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            connection_id: None,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<String> {
        self.parameters.remove(name)
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }
}

/// Display and media capabilities of the connecting client
///
/// Mimetypes are sent in the order they were added; equality ignores order.
#[derive(Debug, Clone)]
pub struct ClientInformation {
    width: u32,
    height: u32,
    audio_mimetypes: Vec<String>,
    video_mimetypes: Vec<String>,
}

impl ClientInformation {
    pub fn new() -> Self {
        Self {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
            audio_mimetypes: Vec::new(),
            video_mimetypes: Vec::new(),
        }
    }

    /// Set the optimal screen size. Both dimensions must be positive.
    pub fn set_optimal_size(&mut self, width: u32, height: u32) -> Result<(), TunnelError> {
        if width == 0 || height == 0 {
            return Err(TunnelError::Client(format!(
                "Invalid screen size {}x{}",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn optimal_width(&self) -> u32 {
        self.width
    }

    pub fn optimal_height(&self) -> u32 {
        self.height
    }

    pub fn add_audio_mimetype(&mut self, mimetype: impl Into<String>) {
        insert_unique(&mut self.audio_mimetypes, mimetype.into());
    }

    pub fn add_video_mimetype(&mut self, mimetype: impl Into<String>) {
        insert_unique(&mut self.video_mimetypes, mimetype.into());
    }

    pub fn audio_mimetypes(&self) -> impl Iterator<Item = &str> {
        self.audio_mimetypes.iter().map(String::as_str)
    }

    pub fn video_mimetypes(&self) -> impl Iterator<Item = &str> {
        self.video_mimetypes.iter().map(String::as_str)
    }
}

fn insert_unique(set: &mut Vec<String>, value: String) {
    if !set.contains(&value) {
        set.push(value);
    }
}

fn same_members(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|value| b.contains(value))
}

impl PartialEq for ClientInformation {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && same_members(&self.audio_mimetypes, &other.audio_mimetypes)
            && same_members(&self.video_mimetypes, &other.video_mimetypes)
    }
}

impl Eq for ClientInformation {}

impl Default for ClientInformation {
    fn default() -> Self {
        Self::new()
    }
}

/// How an instruction received while waiting for `args` is handled
#[derive(Debug)]
enum HandshakeReply {
    Args(Vec<String>),
    Error { message: String, status: Status },
    Ignored(String),
}

impl From<Instruction> for HandshakeReply {
    fn from(instruction: Instruction) -> Self {
        let text = |index: usize| {
            instruction
                .arg_bytes(index)
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
        };
        match instruction.opcode() {
            opcode::ARGS => {
                let names = (0..instruction.args().len()).filter_map(text).collect();
                HandshakeReply::Args(names)
            }
            opcode::ERROR => HandshakeReply::Error {
                message: text(0).unwrap_or_default(),
                status: instruction
                    .arg(1)
                    .and_then(Status::parse)
                    .unwrap_or(Status::UpstreamError),
            },
            other => HandshakeReply::Ignored(other.to_string()),
        }
    }
}

/// Drives the one-time configuration exchange over a fresh backend socket
pub struct HandshakeNegotiator<'a> {
    config: &'a Configuration,
    info: &'a ClientInformation,
}

impl<'a> HandshakeNegotiator<'a> {
    pub fn new(config: &'a Configuration, info: &'a ClientInformation) -> Self {
        Self { config, info }
    }

    /// Run the handshake, returning the socket ready for pass-through I/O
    pub async fn negotiate(&self, mut socket: BackendSocket) -> Result<BackendSocket, TunnelError> {
        let selector = self
            .config
            .connection_id()
            .unwrap_or_else(|| self.config.protocol());
        debug!(selector = %selector, "Starting handshake");

        socket
            .write_instruction(&Instruction::new(opcode::SELECT, [selector]))
            .await?;

        let requested = self.await_args(&mut socket).await?;
        let values = self.argument_values(&requested);
        debug!(
            requested = requested.len(),
            "Backend requested connection arguments"
        );

        socket
            .write_instructions(&[
                Instruction::new(
                    opcode::SIZE,
                    [
                        self.info.optimal_width().to_string(),
                        self.info.optimal_height().to_string(),
                    ],
                ),
                Instruction::new(opcode::AUDIO, self.info.audio_mimetypes()),
                Instruction::new(opcode::VIDEO, self.info.video_mimetypes()),
                Instruction::new(opcode::CONNECT, values),
            ])
            .await?;

        debug!(protocol = %self.config.protocol(), "Handshake complete");
        Ok(socket)
    }

    async fn await_args(&self, socket: &mut BackendSocket) -> Result<Vec<String>, TunnelError> {
        loop {
            let instruction = match socket.read_instruction().await {
                Ok(Some(instruction)) => instruction,
                Ok(None) | Err(TunnelError::EndOfStream) => {
                    return Err(TunnelError::handshake("incomplete handshake"))
                }
                Err(e) => return Err(e),
            };

            match HandshakeReply::from(instruction) {
                HandshakeReply::Args(names) => return Ok(names),
                HandshakeReply::Error { message, status } => {
                    warn!(status = ?status, "Backend rejected handshake: {}", message);
                    return Err(TunnelError::Handshake { message, status });
                }
                HandshakeReply::Ignored(op) => {
                    trace!(opcode = %op, "Ignoring instruction before args");
                }
            }
        }
    }

    /// Values for each requested name, in request order, blank when unset
    fn argument_values(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .map(|name| self.config.parameter(name).unwrap_or_default().to_string())
            .collect()
    }
}
