//! AES-256-GCM-SIV encryption and decryption of individual string fields.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! A fresh random nonce is drawn for every call, so encrypting the same
//! plaintext twice yields two different envelopes and ciphertext comparison
//! reveals nothing about equality of the underlying values.

use std::sync::Arc;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use common::protocol::DECRYPTION_ERROR_SENTINEL;
use thiserror::Error;

use super::key::KeyMaterial;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Leading byte of every stored envelope.
pub const ENVELOPE_VERSION: u8 = 1;

/// Byte length of the authentication tag appended to the ciphertext.
const TAG_LEN: usize = 16;

/// A parsed, encrypted field value.
///
/// The stored representation is `version || nonce || ciphertext+tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode this value to the bytes persisted in the record store.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + NONCE_LEN + self.ciphertext.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse stored bytes back into an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] for an unknown version byte or
    /// input too short to hold a nonce and tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let (version, rest) = bytes.split_first().ok_or(CipherError::InvalidFormat)?;
        if *version != ENVELOPE_VERSION || rest.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length.
    #[error("invalid field key length")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The stored bytes do not match the envelope layout.
    #[error("invalid envelope format")]
    InvalidFormat,

    /// Authenticated plaintext is not UTF-8.
    #[error("decrypted field is not valid UTF-8")]
    InvalidUtf8,
}

/// Outcome of decrypting one stored envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Plaintext(String),
    /// Wrong key, tampered or truncated envelope. Displayed as
    /// [`DECRYPTION_ERROR_SENTINEL`] so the rest of the record stays readable.
    Failed,
}

impl Decrypted {
    pub fn is_failed(&self) -> bool {
        matches!(self, Decrypted::Failed)
    }

    /// The value shown to callers.
    pub fn into_display(self) -> String {
        match self {
            Decrypted::Plaintext(s) => s,
            Decrypted::Failed => DECRYPTION_ERROR_SENTINEL.to_owned(),
        }
    }
}

/// Encrypts and decrypts protected attributes with the process-wide key.
///
/// The AEAD instance is built once from [`KeyMaterial`] and shared; cloning
/// a `FieldCipher` is cheap.
#[derive(Clone)]
pub struct FieldCipher {
    aead: Arc<Aes256GcmSiv>,
}

impl FieldCipher {
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] if the key cannot seed AES-256.
    pub fn new(key: &KeyMaterial) -> Result<Self, CipherError> {
        let aead =
            Aes256GcmSiv::new_from_slice(key.as_bytes()).map_err(|_| CipherError::InvalidKeyLength)?;
        Ok(Self {
            aead: Arc::new(aead),
        })
    }

    /// Encrypt an optional plaintext into stored envelope bytes.
    ///
    /// `None` passes through unchanged.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<Vec<u8>>, CipherError> {
        plaintext
            .map(|p| self.seal(p.as_bytes()).map(|e| e.to_bytes()))
            .transpose()
    }

    /// Decrypt optional stored envelope bytes.
    ///
    /// `None` passes through unchanged. Any failure becomes [`Decrypted::Failed`];
    /// this never returns an error to the caller.
    pub fn decrypt(&self, stored: Option<&[u8]>) -> Option<Decrypted> {
        stored.map(|bytes| match self.open_bytes(bytes) {
            Ok(s) => Decrypted::Plaintext(s),
            Err(_) => Decrypted::Failed,
        })
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Envelope, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::AeadFailure)?;

        Ok(Envelope {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    fn open_bytes(&self, bytes: &[u8]) -> Result<String, CipherError> {
        let envelope = Envelope::from_bytes(bytes)?;
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
            .map_err(|_| CipherError::AeadFailure)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldCipher([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::KEY_LEN;

    fn random_cipher() -> FieldCipher {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        FieldCipher::new(&KeyMaterial::from_bytes(&key).unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = random_cipher();
        for plaintext in ["123 Main St", "", "héllo wörld ✓", "line one\nline two"] {
            let stored = cipher.encrypt(Some(plaintext)).unwrap();
            assert_eq!(
                cipher.decrypt(stored.as_deref()),
                Some(Decrypted::Plaintext(plaintext.to_owned()))
            );
        }
    }

    #[test]
    fn none_passes_through() {
        let cipher = random_cipher();
        assert_eq!(cipher.encrypt(None).unwrap(), None);
        assert_eq!(cipher.decrypt(None), None);
    }

    #[test]
    fn same_plaintext_yields_different_envelopes() {
        let cipher = random_cipher();
        let a = cipher.encrypt(Some("555-0100")).unwrap().unwrap();
        let b = cipher.encrypt(Some("555-0100")).unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn envelope_never_contains_plaintext() {
        let cipher = random_cipher();
        let stored = cipher.encrypt(Some("123 Main St")).unwrap().unwrap();
        assert!(!stored.windows(11).any(|w| w == b"123 Main St"));
        assert_eq!(stored[0], ENVELOPE_VERSION);
    }

    #[test]
    fn wrong_key_yields_sentinel() {
        let c1 = random_cipher();
        let c2 = random_cipher();
        let stored = c1.encrypt(Some("secret history")).unwrap();
        let out = c2.decrypt(stored.as_deref()).unwrap();
        assert!(out.is_failed());
        assert_eq!(out.into_display(), DECRYPTION_ERROR_SENTINEL);
    }

    #[test]
    fn tampered_ciphertext_yields_sentinel() {
        let cipher = random_cipher();
        let mut stored = cipher.encrypt(Some("tamper me")).unwrap().unwrap();
        let last = stored.len() - 1;
        stored[last] ^= 0xFF;
        assert_eq!(cipher.decrypt(Some(stored.as_slice())), Some(Decrypted::Failed));
    }

    #[test]
    fn truncated_and_garbage_input_yield_sentinel() {
        let cipher = random_cipher();
        let stored = cipher.encrypt(Some("truncate me")).unwrap().unwrap();
        for bad in [&stored[..5], &stored[..stored.len() - 1], &[][..], &[9u8, 1, 2][..]] {
            assert_eq!(
                cipher
                    .decrypt(Some(bad))
                    .map(Decrypted::into_display)
                    .as_deref(),
                Some(DECRYPTION_ERROR_SENTINEL)
            );
        }
    }

    #[test]
    fn from_bytes_rejects_unknown_version() {
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(&[0u8; NONCE_LEN + TAG_LEN]);
        assert!(Envelope::from_bytes(&bytes).is_err());
        bytes[0] = ENVELOPE_VERSION;
        assert!(Envelope::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn debug_is_redacted() {
        assert!(format!("{:?}", random_cipher()).contains("REDACTED"));
    }
}
