//! Little-endian payload readers and writers.
//!
//! Payload fields are little-endian; strings are NUL-terminated. Only the frame
//! header size field is big-endian, and that is handled by the codec.

use super::{Frame, Opcode, Source};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("Payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("String is not NUL-terminated")]
    UnterminatedString,

    #[error("String is not valid UTF-8")]
    InvalidString,
}

/// Sequential reader over a payload. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        if self.remaining() < len {
            return Err(PacketError::Truncated { needed: len, remaining: self.remaining() });
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Everything not read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.position..];
        self.position = self.data.len();
        slice
    }

    pub fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, PacketError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, PacketError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn cstring(&mut self) -> Result<String, PacketError> {
        let rest = &self.data[self.position..];
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(PacketError::UnterminatedString)?;
        let value = std::str::from_utf8(&rest[..end]).map_err(|_| PacketError::InvalidString)?;
        self.position += end + 1;
        Ok(value.to_string())
    }
}

/// Builder for an outgoing payload.
#[derive(Debug)]
pub struct PacketWriter {
    opcode: Opcode,
    payload: BytesMut,
}

impl PacketWriter {
    pub fn new(opcode: Opcode) -> Self {
        Self::with_capacity(opcode, 0)
    }

    pub fn with_capacity(opcode: Opcode, capacity: usize) -> Self {
        Self { opcode, payload: BytesMut::with_capacity(capacity) }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.payload.put_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.payload.put_u16_le(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.payload.put_u32_le(value);
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.payload.put_i32_le(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.payload.put_u64_le(value);
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.payload.put_f32_le(value);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.payload.put_slice(value);
        self
    }

    pub fn cstring(&mut self, value: &str) -> &mut Self {
        self.payload.put_slice(value.as_bytes());
        self.payload.put_u8(0);
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn finish(self, source: Source) -> Frame {
        Frame::new(self.opcode, Bytes::from(self.payload), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reads_little_endian_fields() {
        let mut writer = PacketWriter::new(Opcode::CMSG_PING);
        writer.u32(0xDEADBEEF).u8(7).cstring("Thrall").u64(42).f32(1.5);
        let frame = writer.finish(Source::Client);

        let mut reader = frame.reader();
        assert_eq!(reader.u32(), Ok(0xDEADBEEF));
        assert_eq!(reader.u8(), Ok(7));
        assert_eq!(reader.cstring(), Ok("Thrall".to_string()));
        assert_eq!(reader.u64(), Ok(42));
        assert_eq!(reader.f32(), Ok(1.5));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = PacketReader::new(&[1, 2]);
        assert_eq!(reader.u32(), Err(PacketError::Truncated { needed: 4, remaining: 2 }));
        // A failed read consumes nothing.
        assert_eq!(reader.u16(), Ok(0x0201));
    }

    #[test]
    fn test_reader_rejects_unterminated_string() {
        let mut reader = PacketReader::new(b"abc");
        assert_eq!(reader.cstring(), Err(PacketError::UnterminatedString));
    }
}
