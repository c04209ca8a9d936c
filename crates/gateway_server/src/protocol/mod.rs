//! Game protocol framing.
//!
//! A [`Frame`] is one opcode and its payload. The [`codec`] module turns byte
//! streams into frames and back, [`buffer`] reads and writes payload fields,
//! and [`packets`] builds the server messages the gateway answers with itself.

pub mod buffer;
pub mod codec;
pub mod guid;
pub mod opcode;
pub mod packets;

pub use buffer::{PacketError, PacketReader, PacketWriter};
pub use codec::{CodecError, FrameCodec, FrameDecoder, FrameEncoder, OpcodeWidth};
pub use opcode::Opcode;

use bytes::Bytes;

/// Which side of the gateway a frame was produced for.
///
/// Frames read from the client socket and frames the gateway writes toward a
/// backend are [`Source::Client`]; frames read from a backend and frames the
/// gateway writes toward the client are [`Source::Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Client,
    Backend,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Bytes,
    pub source: Source,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>, source: Source) -> Self {
        Self { opcode, payload: payload.into(), source }
    }

    /// Payload length in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.payload)
    }
}
