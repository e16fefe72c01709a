use std::env;
use std::str::FromStr;

use tracing::warn;
use zeroize::Zeroizing;

use crate::{CryptoError, IV_LENGTH, KEY_LENGTH};

pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";
pub const ENCRYPTION_IV_ENV: &str = "ENCRYPTION_IV";

/// Development-only key used when `ENCRYPTION_KEY` is absent or too short.
pub const DEV_FALLBACK_KEY: &str = "dsr-vault-dev-fallback-key-00000";
/// Development-only IV used when `ENCRYPTION_IV` is absent or too short.
pub const DEV_FALLBACK_IV: &str = "dsr-vault-dev-iv";

/// How nonces are chosen when sealing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherMode {
    /// Nonce is derived from the plaintext and the configured key/IV, so equal
    /// plaintexts seal to equal ciphertexts under one configuration.
    #[default]
    Deterministic,
    /// Fresh random nonce per call.
    Randomized,
}

impl CipherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherMode::Deterministic => "deterministic",
            CipherMode::Randomized => "randomized",
        }
    }
}

impl FromStr for CipherMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(CipherMode::Deterministic),
            "randomized" | "random" => Ok(CipherMode::Randomized),
            other => Err(CryptoError::UnknownMode(other.to_string())),
        }
    }
}

/// Key material and mode for [`crate::FieldCipher`].
///
/// Built once at startup and handed to the cipher; nothing here is read from
/// process-wide state after construction.
#[derive(Clone)]
pub struct CryptoConfig {
    key: Zeroizing<[u8; KEY_LENGTH]>,
    iv: Zeroizing<[u8; IV_LENGTH]>,
    mode: CipherMode,
    fallback: bool,
}

impl CryptoConfig {
    /// Strict constructor. Values longer than the required length are truncated;
    /// shorter values are rejected.
    pub fn new<K, I>(key: K, iv: I) -> Result<Self, CryptoError>
    where
        K: AsRef<[u8]>,
        I: AsRef<[u8]>,
    {
        let key = fixed::<KEY_LENGTH>(key.as_ref()).ok_or(CryptoError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: key.as_ref().len(),
        })?;
        let iv = fixed::<IV_LENGTH>(iv.as_ref()).ok_or(CryptoError::InvalidIvLength {
            expected: IV_LENGTH,
            actual: iv.as_ref().len(),
        })?;
        Ok(Self {
            key: Zeroizing::new(key),
            iv: Zeroizing::new(iv),
            mode: CipherMode::default(),
            fallback: false,
        })
    }

    /// Reads `ENCRYPTION_KEY` / `ENCRYPTION_IV`, falling back to the development
    /// constants (with a warning) when either is missing or too short.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`CryptoConfig::from_env`] but refuses to start without real key material.
    pub fn from_env_strict() -> Result<Self, CryptoError> {
        Self::from_lookup_strict(|name| env::var(name).ok())
    }

    /// Lenient construction from any source keyed by the env variable names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_values(lookup(ENCRYPTION_KEY_ENV), lookup(ENCRYPTION_IV_ENV))
    }

    pub fn from_lookup_strict<F>(lookup: F) -> Result<Self, CryptoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup(ENCRYPTION_KEY_ENV).ok_or(CryptoError::MissingConfig(ENCRYPTION_KEY_ENV))?;
        let iv = lookup(ENCRYPTION_IV_ENV).ok_or(CryptoError::MissingConfig(ENCRYPTION_IV_ENV))?;
        Self::new(key, iv)
    }

    /// Lenient construction from optional raw values.
    pub fn from_values(key: Option<String>, iv: Option<String>) -> Self {
        let mut fallback = false;
        let key = match key.as_deref().and_then(|k| fixed::<KEY_LENGTH>(k.as_bytes())) {
            Some(k) => k,
            None => {
                warn!(
                    env = ENCRYPTION_KEY_ENV,
                    "encryption key is not set or is too short; using development fallback key"
                );
                fallback = true;
                fixed_or_zero::<KEY_LENGTH>(DEV_FALLBACK_KEY.as_bytes())
            }
        };
        let iv = match iv.as_deref().and_then(|v| fixed::<IV_LENGTH>(v.as_bytes())) {
            Some(v) => v,
            None => {
                warn!(
                    env = ENCRYPTION_IV_ENV,
                    "encryption IV is not set or is too short; using development fallback IV"
                );
                fallback = true;
                fixed_or_zero::<IV_LENGTH>(DEV_FALLBACK_IV.as_bytes())
            }
        };
        Self {
            key: Zeroizing::new(key),
            iv: Zeroizing::new(iv),
            mode: CipherMode::default(),
            fallback,
        }
    }

    pub fn with_mode(mut self, mode: CipherMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// True when any part of the key material came from the development constants.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub(crate) fn key(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    pub(crate) fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("key", &"***redacted***")
            .field("iv", &"***redacted***")
            .field("mode", &self.mode)
            .field("fallback", &self.fallback)
            .finish()
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    if bytes.len() < N {
        return None;
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    Some(out)
}

fn fixed_or_zero<const N: usize>(bytes: &[u8]) -> [u8; N] {
    fixed::<N>(bytes).unwrap_or([0u8; N])
}
