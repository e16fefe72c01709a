//! Field-level protection for requester PII.
//!
//! Each field is sealed independently. The email additionally gets a
//! searchable hash of its normalized form so lookups never decrypt rows.

use common_crypto::{hash_value, FieldCipher};
use common_observability::AuditMetrics;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dsr::RequestType;
use crate::error::DsrError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainDsrFields {
    pub requester_email: String,
    pub requester_name: String,
    pub request_type: String,
    pub details: Option<String>,
}

impl PlainDsrFields {
    pub fn parsed_request_type(&self) -> Result<RequestType, DsrError> {
        self.request_type
            .parse()
            .map_err(|_| DsrError::validation("invalid_request_type", "Invalid request type"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedDsrFields {
    pub requester_email: String,
    pub requester_email_hash: String,
    pub requester_name: String,
    pub request_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Trimmed and lowercased. Both the stored hash and search queries go through this.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Hash to match against `requesterEmailHash`. Case-insensitive on the input.
pub fn email_search_hash(query: &str) -> String {
    hash_value(&normalize_email(query))
}

/// The email hash is taken over the normalized address, so padded input hashes
/// the same as the trimmed form that [`email_search_hash`] looks up.
pub fn encrypt_dsr_fields(cipher: &FieldCipher, fields: &PlainDsrFields) -> EncryptedDsrFields {
    seal_fields(cipher, None, fields)
}

pub fn decrypt_dsr_fields(cipher: &FieldCipher, fields: &EncryptedDsrFields) -> PlainDsrFields {
    open_fields(cipher, None, fields)
}

/// Cipher plus optional fallback accounting, shared by the DSR service.
#[derive(Clone)]
pub struct PiiCodec {
    cipher: FieldCipher,
    metrics: Option<AuditMetrics>,
}

impl PiiCodec {
    pub fn new(cipher: FieldCipher) -> Self {
        Self { cipher, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: AuditMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn encrypt_dsr_fields(&self, fields: &PlainDsrFields) -> EncryptedDsrFields {
        seal_fields(&self.cipher, self.metrics.as_ref(), fields)
    }

    pub fn decrypt_dsr_fields(&self, fields: &EncryptedDsrFields) -> PlainDsrFields {
        open_fields(&self.cipher, self.metrics.as_ref(), fields)
    }
}

fn seal(cipher: &FieldCipher, metrics: Option<&AuditMetrics>, field: &'static str, value: &str) -> String {
    cipher.encrypt_or_else(value, |_| {
        debug!(field, "PII field stored unencrypted");
        if let Some(m) = metrics {
            m.record_crypto_fallback("encrypt");
        }
    })
}

fn open(cipher: &FieldCipher, metrics: Option<&AuditMetrics>, field: &'static str, value: &str) -> String {
    cipher.decrypt_or_else(value, |_| {
        debug!(field, "PII field returned as stored");
        if let Some(m) = metrics {
            m.record_crypto_fallback("decrypt");
        }
    })
}

fn seal_fields(cipher: &FieldCipher, metrics: Option<&AuditMetrics>, fields: &PlainDsrFields) -> EncryptedDsrFields {
    EncryptedDsrFields {
        requester_email: seal(cipher, metrics, "requesterEmail", &fields.requester_email),
        requester_email_hash: email_search_hash(&fields.requester_email),
        requester_name: seal(cipher, metrics, "requesterName", &fields.requester_name),
        request_type: seal(cipher, metrics, "requestType", &fields.request_type),
        details: fields.details.as_deref().map(|d| seal(cipher, metrics, "details", d)),
    }
}

fn open_fields(cipher: &FieldCipher, metrics: Option<&AuditMetrics>, fields: &EncryptedDsrFields) -> PlainDsrFields {
    PlainDsrFields {
        requester_email: open(cipher, metrics, "requesterEmail", &fields.requester_email),
        requester_name: open(cipher, metrics, "requesterName", &fields.requester_name),
        request_type: open(cipher, metrics, "requestType", &fields.request_type),
        details: fields.details.as_deref().map(|d| open(cipher, metrics, "details", d)),
    }
}
