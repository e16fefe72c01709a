pub mod audit_query;
pub mod auth_audit;
pub mod company;
pub mod config;
pub mod dsr;
pub mod error;
pub mod notify;
pub mod pii;
pub mod requests;

use std::sync::Arc;

use common_audit::AuditStore;
use common_crypto::FieldCipher;
use common_docstore::DocumentStore;
use common_observability::AuditMetrics;
use tracing_subscriber::EnvFilter;

pub use audit_query::{query_audit_logs, AuditLogQueryParams};
pub use company::{CompanyDirectory, CompanyRecord, NewCompany};
pub use config::ServiceConfig;
pub use dsr::{CompanyRef, DsrListQuery, DsrPage, DsrStatus, DsrUpdate, DsrView, InternalNote, NewDsrSubmission, RequestType};
pub use error::DsrError;
pub use notify::{DsrNotice, Notifier, NotifyError};
pub use pii::{decrypt_dsr_fields, email_search_hash, encrypt_dsr_fields, EncryptedDsrFields, PiiCodec, PlainDsrFields};
pub use requests::DsrService;

/// Installs the fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Shared handles, built once at startup around a single document store.
#[derive(Clone)]
pub struct AppState {
    pub audit: AuditStore,
    pub dsr: DsrService,
    pub metrics: AuditMetrics,
    pub audit_query_max_limit: u64,
}

impl AppState {
    pub fn new(config: &ServiceConfig, db: Arc<dyn DocumentStore>) -> Self {
        let metrics = AuditMetrics::new();
        let audit = AuditStore::new(Arc::clone(&db)).with_metrics(metrics.clone());
        let codec = PiiCodec::new(FieldCipher::new(&config.crypto)).with_metrics(metrics.clone());
        let dsr = DsrService::new(db, codec, audit.clone());
        Self { audit, dsr, metrics, audit_query_max_limit: config.audit_query_max_limit }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.dsr = self.dsr.with_notifier(notifier);
        self
    }
}
