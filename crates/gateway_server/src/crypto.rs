//! Header cipher for client-facing frames.
//!
//! Two RC4 keystreams are derived from the 40-byte session key produced by the
//! authentication server: one for frames the gateway sends and one for frames
//! it receives. Each stream discards its first 1024 bytes before use.

use hmac::{Hmac, Mac};
use rc4::consts::U20;
use rc4::{KeyInit, Rc4, StreamCipher};
use sha1::Sha1;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

/// HMAC key for the stream the server encrypts with.
pub const SERVER_ENCRYPTION_KEY: [u8; 16] = [
    0xCC, 0x98, 0xAE, 0x04, 0xE8, 0x97, 0xEA, 0xCA, 0x12, 0xDD, 0xC0, 0x93, 0x42, 0x91, 0x53, 0x57,
];

/// HMAC key for the stream the client encrypts with.
pub const CLIENT_ENCRYPTION_KEY: [u8; 16] = [
    0xC2, 0xB3, 0x72, 0x3C, 0xC6, 0xAE, 0xD9, 0xB5, 0x34, 0x3C, 0x53, 0xEE, 0x2F, 0x43, 0x67, 0xCE,
];

const KEYSTREAM_DROP: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid cipher key length")]
    InvalidKeyLength,
}

/// One direction of the cipher. Applying it advances the keystream.
pub struct HeaderCrypt {
    rc4: Rc4<U20>,
}

impl HeaderCrypt {
    fn derive(hmac_key: &[u8], session_key: &[u8]) -> Result<Self, CipherError> {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(hmac_key).map_err(|_| CipherError::InvalidKeyLength)?;
        mac.update(session_key);
        let digest = mac.finalize().into_bytes();

        let mut rc4 = <Rc4<U20> as KeyInit>::new_from_slice(&digest).map_err(|_| CipherError::InvalidKeyLength)?;
        let mut drop = [0u8; KEYSTREAM_DROP];
        rc4.apply_keystream(&mut drop);
        Ok(Self { rc4 })
    }

    /// XORs `data` with the next keystream bytes, in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.rc4.apply_keystream(data);
    }
}

impl fmt::Debug for HeaderCrypt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeaderCrypt")
    }
}

/// Both keystreams of a connection.
#[derive(Debug)]
pub struct SessionCipher {
    pub encrypt: HeaderCrypt,
    pub decrypt: HeaderCrypt,
}

impl SessionCipher {
    /// Cipher for the server side of a client connection.
    pub fn server(session_key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            encrypt: HeaderCrypt::derive(&SERVER_ENCRYPTION_KEY, session_key)?,
            decrypt: HeaderCrypt::derive(&CLIENT_ENCRYPTION_KEY, session_key)?,
        })
    }

    /// Cipher with the key roles swapped, as a game client would hold it.
    pub fn client(session_key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            encrypt: HeaderCrypt::derive(&CLIENT_ENCRYPTION_KEY, session_key)?,
            decrypt: HeaderCrypt::derive(&SERVER_ENCRYPTION_KEY, session_key)?,
        })
    }

    pub fn split(self) -> (HeaderCrypt, HeaderCrypt) {
        (self.encrypt, self.decrypt)
    }
}
