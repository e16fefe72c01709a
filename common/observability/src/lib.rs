use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Counters for the audit trail and the PII field cipher.
#[derive(Clone)]
pub struct AuditMetrics {
    pub registry: Registry,
    pub audit_log_writes_total: IntCounterVec,
    pub audit_log_write_failures_total: IntCounter,
    pub pii_crypto_fallbacks_total: IntCounterVec,
}

impl AuditMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let audit_log_writes_total = IntCounterVec::new(
            Opts::new("audit_log_writes_total", "Audit log entries persisted"),
            &["action", "severity"],
        ).unwrap();
        let audit_log_write_failures_total = IntCounter::new(
            "audit_log_write_failures_total",
            "Audit log writes rejected by the document store",
        ).unwrap();
        let pii_crypto_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "pii_crypto_fallbacks_total",
                "PII field operations that degraded to pass-through",
            ),
            &["op"],
        ).unwrap();
        let _ = registry.register(Box::new(audit_log_writes_total.clone()));
        let _ = registry.register(Box::new(audit_log_write_failures_total.clone()));
        let _ = registry.register(Box::new(pii_crypto_fallbacks_total.clone()));
        AuditMetrics { registry, audit_log_writes_total, audit_log_write_failures_total, pii_crypto_fallbacks_total }
    }

    pub fn record_write(&self, action: &str, severity: &str) {
        self.audit_log_writes_total.with_label_values(&[action, severity]).inc();
    }

    pub fn record_write_failure(&self) {
        self.audit_log_write_failures_total.inc();
    }

    pub fn record_crypto_fallback(&self, op: &str) {
        self.pii_crypto_fallbacks_total.with_label_values(&[op]).inc();
    }
}

impl Default for AuditMetrics {
    fn default() -> Self { Self::new() }
}
