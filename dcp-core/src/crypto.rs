//! Content keys and the per-asset cipher context
//!
//! Each encrypted frame is stored as a random 16-byte IV followed by the
//! AES-128-CTR ciphertext of the payload. Key delivery is out of scope: the
//! caller hands a [`ContentKey`] to the writer or reader together with the
//! key id recorded on the asset.

use crate::{Error, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use rand::RngCore;
use std::fmt;
use uuid::Uuid;

/// Size of an AES-128 key in bytes
pub const KEY_SIZE: usize = 16;

/// Size of the IV prefixed to every encrypted frame
pub const IV_SIZE: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// A 128-bit content key
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Generates a random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Parses a key from 32 hex digits
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text.trim()).map_err(|e| Error::Key(e.to_string()))?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Key(format!("expected {KEY_SIZE} key bytes, got {}", b.len()))
        })?;
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey([redacted])")
    }
}

/// The single cipher context bound to an encrypted asset
#[derive(Clone, Debug)]
pub struct CipherContext {
    key_id: Uuid,
    key: ContentKey,
}

impl CipherContext {
    pub fn new(key_id: Uuid, key: ContentKey) -> Self {
        Self { key_id, key }
    }

    pub fn key_id(&self) -> Uuid {
        self.key_id
    }

    /// Ensures this context belongs to an asset carrying `expected` as key id
    pub fn check_binding(&self, expected: Option<Uuid>) -> Result<()> {
        match expected {
            Some(id) if id == self.key_id => Ok(()),
            Some(id) => Err(Error::Key(format!(
                "key {} does not match asset key id {}",
                self.key_id, id
            ))),
            None => Err(Error::Key("asset is not encrypted".into())),
        }
    }

    /// Encrypts one frame payload under a fresh IV
    pub fn encrypt_frame(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut output = Vec::with_capacity(IV_SIZE + plaintext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(plaintext);
        self.cipher(&iv).apply_keystream(&mut output[IV_SIZE..]);
        output
    }

    /// Decrypts a payload produced by [`encrypt_frame`](Self::encrypt_frame)
    pub fn decrypt_frame(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_SIZE {
            return Err(Error::Codec(format!(
                "encrypted frame of {} bytes is shorter than its IV",
                data.len()
            )));
        }
        let (iv, ciphertext) = data.split_at(IV_SIZE);
        let mut iv_bytes = [0u8; IV_SIZE];
        iv_bytes.copy_from_slice(iv);

        let mut plaintext = ciphertext.to_vec();
        self.cipher(&iv_bytes).apply_keystream(&mut plaintext);
        Ok(plaintext)
    }

    fn cipher(&self, iv: &[u8; IV_SIZE]) -> Aes128Ctr {
        Aes128Ctr::new(self.key.as_bytes().into(), iv.into())
    }
}
