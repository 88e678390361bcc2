//! Length-prefixed instruction framing
//!
//! Every element is written as `<length>.<content>` where `<length>` is the
//! decimal byte length of `<content>`. Elements are separated by `,` and an
//! instruction is terminated by `;`. The first element is the opcode.
//!
//! ```text
//! 4.size,4.1024,3.768;
//! ```

use bytes::BytesMut;
use std::ops::Range;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::{Instruction, MAX_INSTRUCTION_SIZE, MAX_LENGTH_DIGITS};

/// Framing errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("End of stream in the middle of an instruction")]
    EndOfStream,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    fn protocol(message: impl Into<String>) -> Self {
        CodecError::Protocol(message.into())
    }
}

/// Instruction codec usable with `FramedRead`/`FramedWrite`.
///
/// Decoding is incremental: elements completed by earlier calls are
/// remembered, so an instruction arriving in many small reads is scanned
/// once. The codec therefore assumes the decode buffer is only ever
/// appended to between calls, which is how `FramedRead` drives it.
#[derive(Debug, Clone)]
pub struct InstructionCodec {
    max_instruction_size: usize,
    /// Offset of the next unparsed element in the decode buffer
    cursor: usize,
    /// Content ranges of the elements completed so far
    elements: Vec<Range<usize>>,
}

impl InstructionCodec {
    pub fn new() -> Self {
        Self::with_max_instruction_size(MAX_INSTRUCTION_SIZE)
    }

    pub fn with_max_instruction_size(max_instruction_size: usize) -> Self {
        Self {
            max_instruction_size,
            cursor: 0,
            elements: Vec::new(),
        }
    }

    pub fn max_instruction_size(&self) -> usize {
        self.max_instruction_size
    }

    /// Continue scanning `src` from where the previous call stopped.
    ///
    /// Returns the end offset of the instruction once its terminator has
    /// been seen. Element contents are not inspected, only the opcode.
    fn scan(&mut self, src: &[u8]) -> Result<Option<usize>, CodecError> {
        loop {
            let prefix_start = self.cursor;
            let mut pos = prefix_start;
            let dot = loop {
                let Some(&byte) = src.get(pos) else {
                    return self.need_more(src);
                };
                if byte == b'.' {
                    break pos;
                }
                if !byte.is_ascii_digit() {
                    return Err(CodecError::protocol(format!(
                        "invalid byte 0x{:02x} in element length",
                        byte
                    )));
                }
                if pos - prefix_start >= MAX_LENGTH_DIGITS {
                    return Err(CodecError::protocol("element length prefix too long"));
                }
                pos += 1;
            };

            if dot == prefix_start {
                return Err(CodecError::protocol("empty element length"));
            }

            let length = src[prefix_start..dot]
                .iter()
                .try_fold(0usize, |acc, digit| {
                    acc.checked_mul(10)?.checked_add(usize::from(digit - b'0'))
                })
                .ok_or_else(|| CodecError::protocol("invalid element length"))?;

            let content_start = dot + 1;
            let content_end = content_start
                .checked_add(length)
                .filter(|end| *end < self.max_instruction_size)
                .ok_or_else(|| {
                    CodecError::protocol(format!(
                        "instruction exceeds {} bytes",
                        self.max_instruction_size
                    ))
                })?;

            // Content plus one terminator byte
            if src.len() <= content_end {
                return self.need_more(src);
            }

            if self.elements.is_empty() {
                if length == 0 {
                    return Err(CodecError::protocol("empty opcode"));
                }
                if std::str::from_utf8(&src[content_start..content_end]).is_err() {
                    return Err(CodecError::protocol("opcode is not valid UTF-8"));
                }
            }
            self.elements.push(content_start..content_end);

            match src[content_end] {
                b',' => self.cursor = content_end + 1,
                b';' => return Ok(Some(content_end + 1)),
                other => {
                    return Err(CodecError::protocol(format!(
                        "unexpected byte 0x{:02x} after element",
                        other
                    )))
                }
            }
        }
    }

    fn need_more(&self, src: &[u8]) -> Result<Option<usize>, CodecError> {
        if src.len() >= self.max_instruction_size {
            return Err(CodecError::protocol(format!(
                "instruction exceeds {} bytes",
                self.max_instruction_size
            )));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.elements.clear();
    }
}

impl Default for InstructionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for InstructionCodec {
    type Item = Instruction;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let end = match self.scan(src) {
            Ok(Some(end)) => end,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let frame = src.split_to(end).freeze();
        let mut elements = self.elements.drain(..).map(|range| frame.slice(range));
        self.cursor = 0;

        let opcode = elements
            .next()
            .map(|opcode| String::from_utf8_lossy(&opcode).into_owned())
            .unwrap_or_default();
        let instruction = Instruction::from_parts(opcode, elements.collect());

        trace!(opcode = %instruction.opcode(), bytes = end, "Decoded instruction");
        Ok(Some(instruction))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(instruction) => Ok(Some(instruction)),
            None if src.is_empty() => Ok(None),
            None => {
                self.reset();
                Err(CodecError::EndOfStream)
            }
        }
    }
}

impl Encoder<&Instruction> for InstructionCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Instruction, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.encoded_len();
        if len > self.max_instruction_size {
            return Err(CodecError::protocol(format!(
                "instruction of {} bytes exceeds {} bytes",
                len, self.max_instruction_size
            )));
        }
        item.encode_into(dst);
        Ok(())
    }
}

impl Encoder<Instruction> for InstructionCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Instruction, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Instruction>::encode(self, &item, dst)
    }
}
