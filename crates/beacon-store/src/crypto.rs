//! At-rest encryption envelope.
//!
//! Snapshots are encrypted with ChaCha20-Poly1305 under a process-lifetime
//! key loaded from (or generated into) a hex-encoded key file at first boot.
//! The wire format is `nonceHex:cipherHex` with a fresh random nonce per
//! write. Decryption is passthrough-tolerant: anything that is not a valid
//! envelope (no colon, bad hex, failed authentication) comes back unchanged,
//! so files written before encryption was enabled keep loading.
//!
//! Rotating the key invalidates every existing envelope; there is no
//! re-encryption path.

use std::path::Path;

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Envelope encryption errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The cipher rejected the plaintext.
    #[error("encryption failed")]
    EncryptionFailed,
    /// The key file holds something other than 32 hex-encoded bytes.
    #[error("invalid key material")]
    InvalidKey,
    /// Reading or writing the key file failed.
    #[error("key file I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Symmetric envelope bound to one key for the process lifetime.
#[derive(Clone)]
pub struct Envelope {
    key: [u8; KEY_LEN],
}

impl Envelope {
    /// Create an envelope from raw key bytes.
    #[must_use]
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Create an envelope with the key from `path`, generating and
    /// persisting a fresh one (mode 600) on first boot.
    pub fn from_key_file(path: &Path) -> Result<Self, CryptoError> {
        Ok(Self::new(load_or_create_key(path)?))
    }

    /// Encrypt a plaintext into `nonceHex:cipherHex`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let mut nonce_bytes = [0u8; NONCE_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an envelope, or return the input unchanged when it is not
    /// one (plaintext passthrough for pre-encryption files).
    #[must_use]
    pub fn decrypt(&self, data: &str) -> String {
        self.try_decrypt(data).unwrap_or_else(|| data.to_string())
    }

    fn try_decrypt(&self, data: &str) -> Option<String> {
        let (nonce_hex, cipher_hex) = data.split_once(':')?;
        let nonce_bytes = hex::decode(nonce_hex).ok()?;
        if nonce_bytes.len() != NONCE_LEN {
            return None;
        }
        let ciphertext = hex::decode(cipher_hex).ok()?;
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// Load the hex-encoded key from `path`, or generate and persist a fresh one.
///
/// New key files are written with mode 600 on Unix.
pub fn load_or_create_key(path: &Path) -> Result<[u8; KEY_LEN], CryptoError> {
    if path.exists() {
        let encoded = std::fs::read_to_string(path)?;
        let bytes = hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(key)
    } else {
        let mut key = [0u8; KEY_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(key))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(key)
    }
}

/// Constant-time byte comparison for bearer-token checks.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
