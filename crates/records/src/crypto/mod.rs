//! AES-256-GCM-SIV field encryption primitives and the process-wide key.
//!
//! Nothing here touches storage or HTTP.
//!
//! # Envelope format
//!
//! ```text
//! 0x01 || nonce (12 bytes) || ciphertext+tag
//! ```
//!
//! Envelopes with any other leading version byte are rejected.

pub mod cipher;
pub mod key;

pub use cipher::{CipherError, Decrypted, FieldCipher};
pub use key::{KeyError, KeyMaterial};
