//! Frame codec for `tokio_util::codec`.
//!
//! A header is a big-endian u16 size followed by a little-endian opcode. The size
//! counts the opcode bytes plus the payload. The opcode is 4 bytes in frames sent
//! by a game client and 2 bytes in frames sent by a game server, so each codec
//! is configured with one width per direction. When a cipher is installed only
//! the header bytes are encrypted; payloads always travel in the clear.

use super::{Frame, Opcode, Source};
use crate::crypto::{HeaderCrypt, SessionCipher};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const SIZE_FIELD_LEN: usize = 2;

/// Width of the opcode field in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeWidth {
    /// Server to client headers.
    Short,
    /// Client to server headers.
    Long,
}

impl OpcodeWidth {
    pub fn bytes(self) -> usize {
        match self {
            OpcodeWidth::Short => 2,
            OpcodeWidth::Long => 4,
        }
    }

    fn header_len(self) -> usize {
        SIZE_FIELD_LEN + self.bytes()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header: size {size} is smaller than the {width}-byte opcode")]
    MalformedHeader { size: usize, width: usize },

    #[error("Connection closed in the middle of a frame")]
    UnexpectedEof,

    #[error("Payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// Decoding half of a [`FrameCodec`].
#[derive(Debug)]
pub struct FrameDecoder {
    width: OpcodeWidth,
    source: Source,
    decrypt: Option<HeaderCrypt>,
    // Header of a frame whose payload has not fully arrived. Kept so the header
    // is decrypted exactly once.
    pending: Option<(Opcode, usize)>,
}

impl FrameDecoder {
    pub fn new(width: OpcodeWidth, source: Source) -> Self {
        Self { width, source, decrypt: None, pending: None }
    }

    pub fn set_cipher(&mut self, decrypt: HeaderCrypt) {
        self.decrypt = Some(decrypt);
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<(Opcode, usize)>, CodecError> {
        let header_len = self.width.header_len();
        if src.len() < header_len {
            src.reserve(header_len - src.len());
            return Ok(None);
        }

        let mut header = src.split_to(header_len);
        if let Some(decrypt) = &mut self.decrypt {
            decrypt.apply(&mut header);
        }

        let size = u16::from_be_bytes([header[0], header[1]]) as usize;
        let width = self.width.bytes();
        if size < width {
            return Err(CodecError::MalformedHeader { size, width });
        }

        let opcode = match self.width {
            OpcodeWidth::Short => u16::from_le_bytes([header[2], header[3]]) as u32,
            OpcodeWidth::Long => u32::from_le_bytes([header[2], header[3], header[4], header[5]]),
        };
        Ok(Some((Opcode(opcode), size - width)))
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        let (opcode, len) = match self.pending.take() {
            Some(header) => header,
            None => match self.decode_header(src)? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        if src.len() < len {
            src.reserve(len - src.len());
            self.pending = Some((opcode, len));
            return Ok(None);
        }

        let payload = src.split_to(len).freeze();
        Ok(Some(Frame::new(opcode, payload, self.source)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(CodecError::UnexpectedEof),
        }
    }
}

/// Encoding half of a [`FrameCodec`].
#[derive(Debug)]
pub struct FrameEncoder {
    width: OpcodeWidth,
    encrypt: Option<HeaderCrypt>,
}

impl FrameEncoder {
    pub fn new(width: OpcodeWidth) -> Self {
        Self { width, encrypt: None }
    }

    pub fn set_cipher(&mut self, encrypt: HeaderCrypt) {
        self.encrypt = Some(encrypt);
    }
}

impl Encoder<Frame> for FrameEncoder {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let width = self.width.bytes();
        let size = u16::try_from(frame.payload.len() + width)
            .map_err(|_| CodecError::PayloadTooLarge(frame.payload.len()))?;

        let mut header = [0u8; 6];
        header[..2].copy_from_slice(&size.to_be_bytes());
        match self.width {
            OpcodeWidth::Short => header[2..4].copy_from_slice(&(frame.opcode.0 as u16).to_le_bytes()),
            OpcodeWidth::Long => header[2..6].copy_from_slice(&frame.opcode.0.to_le_bytes()),
        }
        let header = &mut header[..self.width.header_len()];
        if let Some(encrypt) = &mut self.encrypt {
            encrypt.apply(header);
        }

        dst.reserve(header.len() + frame.payload.len());
        dst.put_slice(header);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

/// Full-duplex codec for one socket.
#[derive(Debug)]
pub struct FrameCodec {
    decoder: FrameDecoder,
    encoder: FrameEncoder,
}

impl FrameCodec {
    pub fn new(inbound: OpcodeWidth, outbound: OpcodeWidth, source: Source) -> Self {
        Self {
            decoder: FrameDecoder::new(inbound, source),
            encoder: FrameEncoder::new(outbound),
        }
    }

    /// Codec for a game client socket: reads client headers, writes server headers.
    pub fn client_facing() -> Self {
        Self::new(OpcodeWidth::Long, OpcodeWidth::Short, Source::Client)
    }

    /// Codec for a world server socket: reads server headers, writes client headers.
    pub fn backend_facing() -> Self {
        Self::new(OpcodeWidth::Short, OpcodeWidth::Long, Source::Backend)
    }

    pub fn set_cipher(&mut self, cipher: SessionCipher) {
        let (encrypt, decrypt) = cipher.split();
        self.encoder.set_cipher(encrypt);
        self.decoder.set_cipher(decrypt);
    }

    pub fn into_parts(self) -> (FrameDecoder, FrameEncoder) {
        (self.decoder, self.encoder)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        self.decoder.decode_eof(src)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.encoder.encode(frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    fn ping(payload: &'static [u8]) -> Frame {
        Frame::new(Opcode::CMSG_PING, Bytes::from_static(payload), Source::Client)
    }

    #[test]
    fn test_short_header_layout() {
        let mut encoder = FrameEncoder::new(OpcodeWidth::Short);
        let mut buf = BytesMut::new();
        encoder
            .encode(Frame::new(Opcode::SMSG_PONG, Bytes::from_static(&[1, 2, 3]), Source::Backend), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x00, 0x05, 0xDD, 0x01, 1, 2, 3]);
    }

    #[test]
    fn test_long_header_layout() {
        let mut encoder = FrameEncoder::new(OpcodeWidth::Long);
        let mut buf = BytesMut::new();
        encoder.encode(ping(&[9]), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x05, 0xDC, 0x01, 0x00, 0x00, 9]);
    }

    #[test]
    fn test_partial_reads_accumulate() {
        let mut encoder = FrameEncoder::new(OpcodeWidth::Long);
        let mut wire = BytesMut::new();
        encoder.encode(ping(b"hello"), &mut wire).unwrap();

        let mut decoder = FrameDecoder::new(OpcodeWidth::Long, Source::Client);
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = decoder.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none(), "frame decoded early at byte {}", i);
            } else {
                assert_eq!(decoded, Some(ping(b"hello")));
            }
        }
    }

    #[test]
    fn test_zero_length_payload() {
        let mut encoder = FrameEncoder::new(OpcodeWidth::Long);
        let mut decoder = FrameDecoder::new(OpcodeWidth::Long, Source::Client);
        let mut buf = BytesMut::new();
        encoder.encode(ping(&[]), &mut buf).unwrap();
        encoder.encode(ping(&[1]), &mut buf).unwrap();

        let first = decoder.decode(&mut buf).unwrap().expect("empty frame");
        assert_eq!(first.size(), 0);
        let second = decoder.decode(&mut buf).unwrap().expect("second frame");
        assert_eq!(second.payload.as_ref(), &[1]);
    }

    #[test]
    fn test_size_smaller_than_opcode_is_malformed() {
        let mut decoder = FrameDecoder::new(OpcodeWidth::Long, Source::Client);
        let mut buf = BytesMut::from(&[0x00, 0x02, 0xDC, 0x01, 0x00, 0x00][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CodecError::MalformedHeader { size: 2, width: 4 })
        ));
    }

    #[test]
    fn test_eof_between_frames_ends_stream() {
        let mut decoder = FrameDecoder::new(OpcodeWidth::Short, Source::Backend);
        let mut buf = BytesMut::new();
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_eof_mid_frame_is_error() {
        let mut decoder = FrameDecoder::new(OpcodeWidth::Short, Source::Backend);
        let mut buf = BytesMut::from(&[0x00, 0x06, 0xDD, 0x01, 1][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(matches!(decoder.decode_eof(&mut buf), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let mut encoder = FrameEncoder::new(OpcodeWidth::Short);
        let mut buf = BytesMut::new();
        let frame = Frame::new(Opcode::SMSG_MOTD, vec![0u8; u16::MAX as usize], Source::Backend);
        assert!(matches!(encoder.encode(frame, &mut buf), Err(CodecError::PayloadTooLarge(_))));
    }

    #[tokio::test]
    async fn test_ciphered_duplex_between_gateway_and_client() {
        let session_key = [3u8; 40];
        let (gateway_io, client_io) = tokio::io::duplex(64);

        let mut gateway = tokio_util::codec::Framed::new(gateway_io, FrameCodec::client_facing());
        gateway.codec_mut().set_cipher(SessionCipher::server(&session_key).unwrap());

        let mut client_codec = FrameCodec::new(OpcodeWidth::Short, OpcodeWidth::Long, Source::Backend);
        client_codec.set_cipher(SessionCipher::client(&session_key).unwrap());
        let mut client = tokio_util::codec::Framed::new(client_io, client_codec);

        client.send(ping(&[1, 2, 3, 4])).await.unwrap();
        client.send(ping(&[])).await.unwrap();
        let first = gateway.next().await.unwrap().unwrap();
        let second = gateway.next().await.unwrap().unwrap();
        assert_eq!(first, ping(&[1, 2, 3, 4]));
        assert_eq!(second.size(), 0);

        let pong = Frame::new(Opcode::SMSG_PONG, Bytes::from_static(&[4, 3, 2, 1]), Source::Backend);
        gateway.send(pong.clone()).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), pong);
    }

    #[tokio::test]
    async fn test_split_halves_over_duplex() {
        let (reader_io, mut writer_io) = tokio::io::duplex(16);
        let mut reader = FramedRead::new(reader_io, FrameDecoder::new(OpcodeWidth::Long, Source::Client));

        let mut wire = BytesMut::new();
        FrameEncoder::new(OpcodeWidth::Long).encode(ping(b"split"), &mut wire).unwrap();
        writer_io.write_all(&wire[..3]).await.unwrap();
        writer_io.write_all(&wire[3..]).await.unwrap();
        drop(writer_io);

        assert_eq!(reader.next().await.unwrap().unwrap(), ping(b"split"));
        assert!(reader.next().await.is_none());
    }
}
