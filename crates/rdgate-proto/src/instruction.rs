//! Protocol instruction type

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::Decoder;

use crate::codec::{CodecError, InstructionCodec};

/// A single protocol instruction: an opcode followed by ordered arguments.
///
/// Arguments are carried verbatim as bytes; the length-prefixed framing
/// means no byte needs escaping, including `,`, `;` and `.`. Opcodes are
/// always text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: String,
    args: Vec<Bytes>,
}

impl Instruction {
    pub fn new<I, S>(opcode: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            opcode: opcode.into(),
            args: args
                .into_iter()
                .map(|arg| Bytes::copy_from_slice(arg.as_ref()))
                .collect(),
        }
    }

    /// Instruction without arguments
    pub fn bare(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            args: Vec::new(),
        }
    }

    /// Build from already owned argument buffers without copying
    pub fn from_parts(opcode: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            opcode: opcode.into(),
            args,
        }
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Argument as text, `None` if missing or not valid UTF-8
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|arg| std::str::from_utf8(arg).ok())
    }

    pub fn arg_bytes(&self, index: usize) -> Option<&[u8]> {
        self.args.get(index).map(|arg| &arg[..])
    }

    pub fn into_parts(self) -> (String, Vec<Bytes>) {
        (self.opcode, self.args)
    }

    /// Number of bytes this instruction occupies on the wire
    pub fn encoded_len(&self) -> usize {
        let elements = std::iter::once(self.opcode.as_bytes())
            .chain(self.args.iter().map(|arg| &arg[..]));
        let mut len = 0;
        for element in elements {
            // prefix + '.' + content + separator (',' or ';')
            len += decimal_digits(element.len()) + 1 + element.len() + 1;
        }
        len
    }

    /// Append the wire form of this instruction to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());

        put_element(dst, self.opcode.as_bytes());
        for arg in &self.args {
            dst.put_u8(b',');
            put_element(dst, arg);
        }
        dst.put_u8(b';');
    }

    /// Encode this instruction to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Parse a buffer that must contain only complete instructions.
    ///
    /// Trailing bytes that do not form a whole instruction are reported as
    /// [`CodecError::EndOfStream`].
    pub fn parse_all(data: &[u8]) -> Result<Vec<Instruction>, CodecError> {
        let mut codec = InstructionCodec::new();
        let mut buf = BytesMut::from(data);
        let mut instructions = Vec::new();

        while let Some(instruction) = codec.decode_eof(&mut buf)? {
            instructions.push(instruction);
        }

        Ok(instructions)
    }
}

/// Wire form, with non-UTF-8 argument bytes shown lossily
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.opcode.len(), self.opcode)?;
        for arg in &self.args {
            write!(f, ",{}.{}", arg.len(), String::from_utf8_lossy(arg))?;
        }
        f.write_str(";")
    }
}

fn put_element(dst: &mut BytesMut, value: &[u8]) {
    dst.put_slice(value.len().to_string().as_bytes());
    dst.put_u8(b'.');
    dst.put_slice(value);
}

fn decimal_digits(mut value: usize) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple() {
        let instruction = Instruction::new("size", ["1024", "768"]);
        assert_eq!(&instruction.encode()[..], b"4.size,4.1024,3.768;");
    }

    #[test]
    fn test_encode_no_args() {
        let instruction = Instruction::bare("nop");
        assert_eq!(&instruction.encode()[..], b"3.nop;");
    }

    #[test]
    fn test_encode_empty_argument() {
        let instruction = Instruction::new("connect", ["x", "", "22"]);
        assert_eq!(&instruction.encode()[..], b"7.connect,1.x,0.,2.22;");
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let instruction = Instruction::new("blob", ["0", "a".repeat(1234).as_str(), "é"]);
        assert_eq!(instruction.encoded_len(), instruction.encode().len());
    }

    #[test]
    fn test_length_counts_bytes() {
        // "é" is two bytes of UTF-8
        let instruction = Instruction::new("name", ["é"]);
        assert_eq!(&instruction.encode()[..], "4.name,2.é;".as_bytes());
    }

    #[test]
    fn test_display_matches_wire_form() {
        let instruction = Instruction::new("select", ["vnc"]);
        assert_eq!(instruction.to_string(), "6.select,3.vnc;");
    }

    #[test]
    fn test_round_trip_structural_characters() {
        let instruction = Instruction::new(
            "clipboard",
            ["a,b;c.d", "3.abc;", "\u{0}\u{1}\u{7f}\r\n", ";;;", ""],
        );

        let parsed = Instruction::parse_all(&instruction.encode()).unwrap();
        assert_eq!(parsed, vec![instruction]);
    }

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let instruction = Instruction::new("blob", [&b"\x00\xff\xfe;,."[..], &b"\x80"[..]]);

        let parsed = Instruction::parse_all(&instruction.encode()).unwrap();

        assert_eq!(parsed, vec![instruction]);
        assert_eq!(parsed[0].arg(0), None);
        assert_eq!(parsed[0].arg_bytes(1), Some(&b"\x80"[..]));
    }

    #[test]
    fn test_parse_all_multiple() {
        let data = b"4.sync,3.123;5.mouse,2.10,2.20;";
        let parsed = Instruction::parse_all(data).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].opcode(), "sync");
        assert_eq!(parsed[0].arg(0), Some("123"));
        assert_eq!(parsed[1].args(), &["10".to_string(), "20".to_string()]);
    }

    #[test]
    fn test_parse_all_empty_buffer() {
        assert!(Instruction::parse_all(b"").unwrap().is_empty());
    }

    #[test]
    fn test_parse_all_incomplete_trailer() {
        let result = Instruction::parse_all(b"4.sync,3.123;5.mouse,2.1");
        assert!(matches!(result, Err(CodecError::EndOfStream)));
    }

    #[test]
    fn test_parse_all_malformed() {
        let result = Instruction::parse_all(b"4.sync,x.123;");
        assert!(matches!(result, Err(CodecError::Protocol(_))));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn instruction() -> impl Strategy<Value = Instruction> {
            (
                "[a-z]{1,12}",
                prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
            )
                .prop_map(|(opcode, args)| Instruction::new(opcode, args))
        }

        proptest! {
            #[test]
            fn test_any_instruction_round_trips(instructions in prop::collection::vec(instruction(), 1..6)) {
                let mut wire = BytesMut::new();
                for instruction in &instructions {
                    instruction.encode_into(&mut wire);
                }

                prop_assert_eq!(Instruction::parse_all(&wire).unwrap(), instructions);
            }

            #[test]
            fn test_any_split_decodes_the_same(
                instructions in prop::collection::vec(instruction(), 1..6),
                chunk in 1usize..32,
            ) {
                let mut wire = BytesMut::new();
                for instruction in &instructions {
                    instruction.encode_into(&mut wire);
                }

                let mut codec = InstructionCodec::new();
                let mut buf = BytesMut::new();
                let mut decoded = Vec::new();
                for piece in wire.chunks(chunk) {
                    buf.extend_from_slice(piece);
                    while let Some(instruction) = codec.decode(&mut buf).unwrap() {
                        decoded.push(instruction);
                    }
                }

                prop_assert!(buf.is_empty());
                prop_assert_eq!(decoded, instructions);
            }
        }
    }
}
