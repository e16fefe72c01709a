use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tracing::error;

use crate::model::AuditError;
use crate::store::{AuditStore, CreateAuditLogParams};

#[derive(Debug, Error)]
pub enum AuditedError<E> {
    #[error("{0}")]
    Operation(E),
    #[error("operation succeeded but audit write failed: {0}")]
    Audit(#[source] AuditError),
}

impl<E> AuditedError<E> {
    pub fn into_operation(self) -> Option<E> {
        match self {
            AuditedError::Operation(e) => Some(e),
            AuditedError::Audit(_) => None,
        }
    }
}

/// Runs `operation` and records exactly one audit entry for it.
///
/// A failed operation is audited with `success = false` and the error
/// message, and its original error is returned even if that audit write
/// fails. A successful operation whose audit write fails yields
/// [`AuditedError::Audit`].
pub async fn audited_operation<T, E, F, Fut>(
    store: &AuditStore,
    operation: F,
    params: CreateAuditLogParams,
) -> Result<T, AuditedError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match operation().await {
        Ok(value) => {
            store.create_audit_log(params).await.map_err(AuditedError::Audit)?;
            Ok(value)
        }
        Err(err) => {
            let message = err.to_string();
            let mut failed = params;
            failed.metadata.success = Some(false);
            failed.metadata.error =
                Some(if message.trim().is_empty() { "Unknown error".to_string() } else { message });
            if let Err(audit_err) = store.create_audit_log(failed).await {
                error!(error = %audit_err, operation_error = %err, "could not audit failed operation");
            }
            Err(AuditedError::Operation(err))
        }
    }
}
