//! Addon block of the auth session request.
//!
//! The block is a u32 uncompressed size followed by zlib data. The gateway does
//! not verify addon signatures; every reported addon is acknowledged as allowed.

use crate::protocol::{Frame, Opcode, PacketError, PacketReader, PacketWriter, Source};
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::debug;

/// Upper bound of the uncompressed addon block.
pub const MAX_ADDON_BLOCK_SIZE: u32 = 0xFFFFF;

#[derive(Debug, thiserror::Error)]
pub enum AddonError {
    #[error("Addon block is too big: {0} bytes")]
    TooLarge(u32),

    #[error("Can't inflate addon block: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("Addon block size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Malformed addon block: {0}")]
    Malformed(#[from] PacketError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonInfo {
    pub name: String,
    pub has_key: bool,
    pub public_key_crc: u32,
    pub url_crc: u32,
}

/// Parses the addon block. `Ok(None)` means the client reported no addons.
pub fn parse_addon_block(block: &[u8]) -> Result<Option<Vec<AddonInfo>>, AddonError> {
    let mut reader = PacketReader::new(block);
    let size = reader.u32()?;
    if size == 0 {
        return Ok(None);
    }
    if size > MAX_ADDON_BLOCK_SIZE {
        return Err(AddonError::TooLarge(size));
    }

    let expected = size as usize;
    let mut inflated = Vec::with_capacity(expected);
    // One byte past the expected size is enough to detect an oversized block.
    ZlibDecoder::new(reader.rest())
        .take(expected as u64 + 1)
        .read_to_end(&mut inflated)?;
    if inflated.len() != expected {
        return Err(AddonError::SizeMismatch { expected, actual: inflated.len() });
    }

    let mut reader = PacketReader::new(&inflated);
    let count = reader.u32()?;
    let mut addons = Vec::new();
    for _ in 0..count {
        let addon = AddonInfo {
            name: reader.cstring()?,
            has_key: reader.u8()? == 1,
            public_key_crc: reader.u32()?,
            url_crc: reader.u32()?,
        };
        debug!(
            "Addon received: {} (has key: {}, public key crc: {:#X}, url crc: {:#X})",
            addon.name, addon.has_key, addon.public_key_crc, addon.url_crc
        );
        addons.push(addon);
    }
    Ok(Some(addons))
}

/// SMSG_ADDON_INFO acknowledging every addon as allowed.
pub fn addon_info_packet(addons: &[AddonInfo]) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_ADDON_INFO, addons.len() * 8 + 4);
    for addon in addons {
        w.u8(2).u8(addon.has_key as u8);
        if addon.has_key {
            w.u8(0).u32(0);
        }
        w.u8(0);
    }
    w.u32(0); // banned addons
    w.finish(Source::Backend)
}

#[cfg(test)]
pub(crate) fn encode_addon_block(addons: &[AddonInfo]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut raw = PacketWriter::new(Opcode(0));
    raw.u32(addons.len() as u32);
    for addon in addons {
        raw.cstring(&addon.name)
            .u8(addon.has_key as u8)
            .u32(addon.public_key_crc)
            .u32(addon.url_crc);
    }
    let raw = raw.finish(Source::Client).payload;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut block = (raw.len() as u32).to_le_bytes().to_vec();
    block.extend_from_slice(&compressed);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addons() -> Vec<AddonInfo> {
        vec![
            AddonInfo { name: "Blizzard_AchievementUI".into(), has_key: true, public_key_crc: 0x4C1C776D, url_crc: 0 },
            AddonInfo { name: "DBM-Core".into(), has_key: false, public_key_crc: 0, url_crc: 0 },
        ]
    }

    #[test]
    fn test_parse_compressed_block() {
        let parsed = parse_addon_block(&encode_addon_block(&addons())).unwrap();
        assert_eq!(parsed, Some(addons()));
    }

    #[test]
    fn test_zero_size_means_no_addons() {
        assert_eq!(parse_addon_block(&[0, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_oversized_block_is_rejected() {
        let block = (MAX_ADDON_BLOCK_SIZE + 1).to_le_bytes();
        assert!(matches!(parse_addon_block(&block), Err(AddonError::TooLarge(_))));
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let mut block = encode_addon_block(&addons());
        let declared = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) + 5;
        block[..4].copy_from_slice(&declared.to_le_bytes());
        assert!(matches!(parse_addon_block(&block), Err(AddonError::SizeMismatch { .. })));
    }

    #[test]
    fn test_garbage_fails_to_inflate() {
        let block = [16, 0, 0, 0, 0xDE, 0xAD, 0xBE, 0xEF];
        assert!(matches!(parse_addon_block(&block), Err(AddonError::Inflate(_))));
    }

    #[test]
    fn test_addon_info_layout() {
        let frame = addon_info_packet(&addons());
        assert_eq!(frame.payload.as_ref(), &[2, 1, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0]);
    }
}
