//! Gateway Protocol Definitions
//!
//! This crate defines the instruction type, the length-prefixed wire framing
//! and the status codes shared by the backend connection and the HTTP tunnel.

pub mod codec;
pub mod instruction;
pub mod status;

pub use codec::{CodecError, InstructionCodec};
pub use instruction::Instruction;
pub use status::Status;

/// Maximum encoded size of a single instruction (8MB)
pub const MAX_INSTRUCTION_SIZE: usize = 8 * 1024 * 1024;

/// Maximum number of decimal digits accepted in an element length prefix
pub const MAX_LENGTH_DIGITS: usize = 10;

/// Well-known opcodes used by the gateway itself
pub mod opcode {
    pub const SELECT: &str = "select";
    pub const ARGS: &str = "args";
    pub const SIZE: &str = "size";
    pub const AUDIO: &str = "audio";
    pub const VIDEO: &str = "video";
    pub const CONNECT: &str = "connect";
    pub const ERROR: &str = "error";
    pub const SYNC: &str = "sync";
}
