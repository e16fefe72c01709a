//! Append-only audit trail: entry model, severity classification, request
//! context capture and the audited-operation wrapper.

pub mod context;
pub mod model;
pub mod severity;
pub mod store;
pub mod wrapper;

pub use common_docstore::SortDirection as SortOrder;
pub use context::{extract_audit_context, AuditContext, Session, SessionInfo, SessionUser, UNKNOWN};
pub use model::{
    AuditAction, AuditEntry, AuditError, AuditMetadata, AuditResult, AuditSeverity, IdRef, ResourceType,
};
pub use severity::{severity_for_action, severity_for_action_name};
pub use store::{
    AuditLogFilter, AuditLogPage, AuditSortField, AuditStore, CreateAuditLogParams, ResourcePageOptions,
    AUDIT_COLLECTION,
};
pub use wrapper::{audited_operation, AuditedError};
