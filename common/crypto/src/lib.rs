use aes_gcm::{aead::Aead, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, warn};
use zeroize::Zeroizing;

pub mod config;

pub use config::{CipherMode, CryptoConfig, DEV_FALLBACK_IV, DEV_FALLBACK_KEY};

type HmacSha256 = Hmac<Sha256>;

pub const KEY_LENGTH: usize = 32;
pub const IV_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Errors produced by the common-crypto helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected at least {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("invalid IV length: expected at least {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },
    #[error("missing configuration value {0}")]
    MissingConfig(&'static str),
    #[error("unknown cipher mode '{0}'")]
    UnknownMode(String),
    #[error("ciphertext too short")]
    Truncated,
    #[error("encryption failure")]
    EncryptFailure,
    #[error("decryption failure")]
    DecryptFailure,
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("invalid HMAC key length")]
    InvalidMacKey,
}

/// Seals and opens individual string fields with AES-256-GCM.
///
/// Output is base64(nonce || ciphertext || tag). Opening does not depend on the
/// mode the value was sealed with, so deterministic and randomized values can
/// live side by side in one collection.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
    nonce_key: Zeroizing<[u8; KEY_LENGTH]>,
    mode: CipherMode,
}

impl FieldCipher {
    pub fn new(config: &CryptoConfig) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(config.key()));
        Self {
            cipher,
            nonce_key: Zeroizing::new(derive_nonce_key(config.key(), config.iv())),
            mode: config.mode(),
        }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes = match self.mode {
            CipherMode::Deterministic => self.synthetic_nonce(plaintext.as_bytes())?,
            CipherMode::Randomized => {
                let mut bytes = [0u8; NONCE_LENGTH];
                OsRng.fill_bytes(&mut bytes);
                bytes
            }
        };
        let mut sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailure)?;
        let mut output = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        output.extend_from_slice(&nonce_bytes);
        output.append(&mut sealed);
        Ok(BASE64_STANDARD.encode(output))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let raw = BASE64_STANDARD.decode(ciphertext.trim())?;
        if raw.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CryptoError::DecryptFailure)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Encrypts, or logs and hands back the plaintext when sealing fails.
    pub fn encrypt_or_passthrough(&self, plaintext: &str) -> String {
        self.encrypt_or_else(plaintext, |_| {})
    }

    /// Decrypts, or logs and hands back the input. Legacy plaintext rows take this path.
    pub fn decrypt_or_passthrough(&self, ciphertext: &str) -> String {
        self.decrypt_or_else(ciphertext, |_| {})
    }

    /// [`FieldCipher::encrypt_or_passthrough`] that also reports the failure to `on_fallback`.
    pub fn encrypt_or_else<F>(&self, plaintext: &str, on_fallback: F) -> String
    where
        F: FnOnce(&CryptoError),
    {
        match self.encrypt(plaintext) {
            Ok(sealed) => sealed,
            Err(err) => {
                error!(error = %err, "field encryption failed; value stored as plaintext");
                on_fallback(&err);
                plaintext.to_string()
            }
        }
    }

    pub fn decrypt_or_else<F>(&self, ciphertext: &str, on_fallback: F) -> String
    where
        F: FnOnce(&CryptoError),
    {
        match self.decrypt(ciphertext) {
            Ok(plain) => plain,
            Err(err) => {
                warn!(error = %err, "field decryption failed; returning stored value unchanged");
                on_fallback(&err);
                ciphertext.to_string()
            }
        }
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> Result<[u8; NONCE_LENGTH], CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.nonce_key.as_ref())
            .map_err(|_| CryptoError::InvalidMacKey)?;
        mac.update(plaintext);
        let digest = mac.finalize().into_bytes();
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&digest[..NONCE_LENGTH]);
        Ok(nonce)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("mode", &self.mode)
            .field("keys", &"***redacted***")
            .finish()
    }
}

/// Lowercase hex SHA-256 of `value`. Case-sensitive; callers normalise first.
pub fn hash_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn derive_nonce_key(key: &[u8; KEY_LENGTH], iv: &[u8; IV_LENGTH]) -> [u8; KEY_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(iv);
    hasher.update(b"dsr-vault-nonce-key");
    let digest = hasher.finalize();
    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&digest);
    out
}
