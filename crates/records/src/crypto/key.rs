//! [`KeyMaterial`]: the process-wide secret, loaded once at startup.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Errors produced while loading key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key was configured.
    #[error("field key is not configured")]
    Missing,

    /// The configured value is not base64 in any accepted alphabet.
    #[error("field key is not valid base64")]
    InvalidEncoding,

    /// The decoded key material has an unexpected length.
    #[error("field key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// Sub-key derivation failed.
    #[error("key derivation failed")]
    Derivation,
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// The memory is overwritten with zeroes on drop. Key material never appears
/// in `Debug` output, logs or the record store.
pub struct KeyMaterial(Box<[u8; KEY_LEN]>);

impl KeyMaterial {
    /// Build key material from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Parse key material from its configured base64 form.
    ///
    /// URL-safe and standard alphabets are both accepted, padded or not, so
    /// keys minted by common tooling load without re-encoding.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Missing);
        }
        let decoded = [&URL_SAFE, &URL_SAFE_NO_PAD, &STANDARD, &STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(trimmed).ok())
            .ok_or(KeyError::InvalidEncoding)?;
        let key = Self::from_bytes(&decoded);
        zero(decoded);
        key
    }

    /// Derive an independent sub-key bound to `label` (HMAC-SHA-256 of the label).
    ///
    /// Called once per purpose at startup; results are held for the process lifetime.
    pub fn derive(&self, label: &[u8]) -> Result<Self, KeyError> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.0[..]).map_err(|_| KeyError::Derivation)?;
        mac.update(label);
        let out = mac.finalize().into_bytes();
        Self::from_bytes(&out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

fn zero(mut buf: Vec<u8>) {
    buf.iter_mut().for_each(|b| *b = 0);
}
