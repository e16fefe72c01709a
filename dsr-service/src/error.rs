use common_audit::AuditError;
use common_docstore::StoreError;
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum DsrError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error("DSR not found")]
    NotFound,
    #[error("Company not found")]
    CompanyNotFound,
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
    #[error("audit trail error: {0}")]
    Audit(#[from] AuditError),
    #[error("malformed DSR record: {0}")]
    Malformed(String),
}

impl DsrError {
    pub(crate) fn validation(code: &'static str, message: impl Into<String>) -> Self {
        DsrError::Validation { code, message: message.into() }
    }
}

impl From<DsrError> for ApiError {
    fn from(err: DsrError) -> Self {
        match err {
            DsrError::Validation { code, message } => ApiError::BadRequest { code, message: Some(message) },
            DsrError::NotFound => ApiError::not_found("dsr_not_found"),
            DsrError::CompanyNotFound => ApiError::not_found("company_not_found"),
            other => {
                error!(error = %other, "DSR operation failed");
                ApiError::internal("Internal server error")
            }
        }
    }
}
