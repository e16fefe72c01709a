use anyhow::{Context, Result};
use common_crypto::config::{ENCRYPTION_IV_ENV, ENCRYPTION_KEY_ENV};
use common_crypto::{CipherMode, CryptoConfig};
use std::env;

pub const PII_CIPHER_MODE_ENV: &str = "PII_CIPHER_MODE";
pub const AUDIT_QUERY_MAX_LIMIT_ENV: &str = "AUDIT_QUERY_MAX_LIMIT";
pub const ENCRYPTION_STRICT_ENV: &str = "ENCRYPTION_STRICT";
pub const DEFAULT_AUDIT_QUERY_MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub crypto: CryptoConfig,
    pub audit_query_max_limit: u64,
}

impl ServiceConfig {
    /// Lenient unless `ENCRYPTION_STRICT` is set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Refuses to start on development fallback key material.
    pub fn from_env_strict() -> Result<Self> {
        Self::load(|name| env::var(name).ok(), true)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strict = lookup(ENCRYPTION_STRICT_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self::load(lookup, strict)
    }

    fn load<F>(lookup: F, strict: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let crypto = if strict {
            CryptoConfig::from_lookup_strict(&lookup)
                .with_context(|| format!("{ENCRYPTION_KEY_ENV} and {ENCRYPTION_IV_ENV} must be valid in strict mode"))?
        } else {
            CryptoConfig::from_lookup(&lookup)
        };
        let mode = lookup(PII_CIPHER_MODE_ENV)
            .map(|v| v.parse::<CipherMode>())
            .transpose()
            .context("PII_CIPHER_MODE must be 'deterministic' or 'randomized'")?
            .unwrap_or_default();
        let audit_query_max_limit = lookup(AUDIT_QUERY_MAX_LIMIT_ENV)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_AUDIT_QUERY_MAX_LIMIT);

        Ok(Self {
            crypto: crypto.with_mode(mode),
            audit_query_max_limit: audit_query_max_limit.max(1),
        })
    }
}
