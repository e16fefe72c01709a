use std::sync::Arc;

use common_audit::{
    AuditAction, AuditContext, AuditLogFilter, AuditSeverity, ResourcePageOptions, ResourceType, AUDIT_COLLECTION,
};
use common_crypto::hash_value;
use async_trait::async_trait;
use common_docstore::{
    Document, DocumentStore, Filter, FindOptions, MemoryDocumentStore, StoreError, StoreResult, UpdateResult,
};
use dsr_service::dsr::DSR_COLLECTION;
use dsr_service::{
    AppState, CompanyRef, DsrError, DsrListQuery, DsrStatus, DsrUpdate, NewDsrSubmission, RequestType, ServiceConfig,
};
use serde_json::json;
use uuid::Uuid;

fn config() -> ServiceConfig {
    ServiceConfig::from_lookup(|name| match name {
        "ENCRYPTION_KEY" => Some("0123456789abcdef0123456789abcdef".to_string()),
        "ENCRYPTION_IV" => Some("fedcba9876543210".to_string()),
        _ => None,
    })
    .expect("config")
}

fn setup() -> (MemoryDocumentStore, AppState, CompanyRef) {
    let db = MemoryDocumentStore::new();
    let state = AppState::new(&config(), Arc::new(db.clone()));
    let company = CompanyRef::new(Uuid::new_v4(), "Acme");
    (db, state, company)
}

fn admin() -> AuditContext {
    AuditContext::default().with_user("admin-1", "admin@acme.test", "Ada Admin")
}

fn submission(email: &str, name: &str, kind: &str) -> NewDsrSubmission {
    NewDsrSubmission {
        requester_email: email.into(),
        requester_name: name.into(),
        request_type: kind.into(),
        details: None,
    }
}

#[tokio::test]
async fn submitted_pii_is_encrypted_hashed_and_searchable() {
    let (db, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "ACCESS"), AuditContext::default())
        .await
        .expect("submit");

    let stored = db.dump(DSR_COLLECTION).await;
    assert_eq!(stored.len(), 1);
    let doc = &stored[0];
    assert_ne!(doc["requesterEmail"], "a@b.com");
    assert_ne!(doc["requesterName"], "A B");
    assert_ne!(doc["requestType"], "ACCESS");
    assert_eq!(doc["requesterEmailHash"], hash_value("a@b.com"));
    assert_eq!(doc["status"], "NEW");
    assert_eq!(doc["companyId"], company.id.to_string());

    let view = state.dsr.get(company.id, id).await.unwrap().expect("dsr present");
    assert_eq!(view.requester_email, "a@b.com");
    assert_eq!(view.requester_name, "A B");
    assert_eq!(view.request_type, RequestType::Access.as_str());
    assert!(state.dsr.get(Uuid::new_v4(), id).await.unwrap().is_none());

    let found = state.dsr.find_by_requester_email(company.id, "A@B.com").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert!(state.dsr.find_by_requester_email(Uuid::new_v4(), "a@b.com").await.unwrap().is_empty());
    assert!(state.dsr.find_by_requester_email(company.id, "   ").await.unwrap().is_empty());

    let trail = state
        .audit
        .get_resource_audit_logs(ResourceType::DsrRequest, id, ResourcePageOptions::default())
        .await
        .unwrap();
    assert_eq!(trail.total, 1);
    let entry = &trail.logs[0];
    assert_eq!(entry.action, AuditAction::DsrCreate);
    assert_eq!(entry.company_id, Some(company.id));
    assert_eq!(entry.severity(), Some(AuditSeverity::Medium));
    assert_eq!(entry.metadata.request_type.as_deref(), Some("ACCESS"));
    assert_eq!(entry.metadata.company_name.as_deref(), Some("Acme"));
    let metadata = serde_json::to_string(&entry.metadata).unwrap();
    assert!(!metadata.contains("a@b.com"));
    assert!(!metadata.contains("A B"));
}

#[tokio::test]
async fn invalid_submissions_write_nothing() {
    let (db, state, company) = setup();
    let err = state
        .dsr
        .submit(&company, submission("nope", "A B", "ACCESS"), AuditContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::Validation { code: "invalid_email", .. }));
    let err = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "FORGET_ME"), AuditContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::Validation { code: "invalid_request_type", .. }));
    assert!(db.dump(DSR_COLLECTION).await.is_empty());
    assert!(db.dump(AUDIT_COLLECTION).await.is_empty());
}

#[tokio::test]
async fn status_updates_are_diffed_into_the_trail() {
    let (_, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "DELETE"), AuditContext::default())
        .await
        .unwrap();

    let view = state
        .dsr
        .update(company.id, id, DsrUpdate { status: Some(DsrStatus::InProgress), ..Default::default() }, admin())
        .await
        .unwrap();
    assert_eq!(view.status, DsrStatus::InProgress);

    let changes = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrStatusChange), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(changes.total, 1);
    let entry = &changes.logs[0];
    assert_eq!(entry.user_id.as_deref(), Some("admin-1"));
    assert_eq!(entry.company_id, Some(company.id));
    assert_eq!(entry.severity(), Some(AuditSeverity::High));
    assert_eq!(entry.metadata.changes, Some(vec!["status".to_string()]));
    assert_eq!(entry.metadata.old_values.as_ref().unwrap()["status"], "NEW");
    assert_eq!(entry.metadata.new_values.as_ref().unwrap()["status"], "IN_PROGRESS");
    assert_eq!(entry.metadata.dsr_status.as_deref(), Some("IN_PROGRESS"));

    let done = state
        .dsr
        .update(company.id, id, DsrUpdate { status: Some(DsrStatus::Completed), ..Default::default() }, admin())
        .await
        .unwrap();
    assert!(done.completed_at.is_some());
    let all = state.audit.get_audit_logs(&AuditLogFilter::default()).await.unwrap();
    let completion = all
        .logs
        .iter()
        .find(|l| l.metadata.dsr_status.as_deref() == Some("COMPLETED"))
        .expect("completion entry");
    assert_eq!(completion.action, AuditAction::DsrStatusChange);
    assert_eq!(completion.metadata.completed_at, done.completed_at);

    // same status plus a new field is a plain update
    let acknowledged_at = chrono::Utc::now();
    state
        .dsr
        .update(
            company.id,
            id,
            DsrUpdate { status: Some(DsrStatus::Completed), acknowledged_at: Some(acknowledged_at), ..Default::default() },
            admin(),
        )
        .await
        .unwrap();
    let updates = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrUpdate), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updates.total, 1);
    assert_eq!(updates.logs[0].metadata.changes, Some(vec!["acknowledgedAt".to_string()]));
}

#[tokio::test]
async fn updates_are_scoped_to_the_company() {
    let (_, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "ACCESS"), AuditContext::default())
        .await
        .unwrap();
    let err = state
        .dsr
        .update(Uuid::new_v4(), id, DsrUpdate { status: Some(DsrStatus::Rejected), ..Default::default() }, admin())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::NotFound));
    let err = state.dsr.update(company.id, id, DsrUpdate::default(), admin()).await.unwrap_err();
    assert!(matches!(err, DsrError::Validation { code: "empty_update", .. }));
}

#[tokio::test]
async fn notes_are_appended_and_audited() {
    let (_, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "CORRECT"), AuditContext::default())
        .await
        .unwrap();

    let note = state.dsr.add_note(company.id, id, "  called the requester  ", admin()).await.unwrap();
    assert_eq!(note.note, "called the requester");
    assert_eq!(note.admin_user_id, "admin-1");
    state.dsr.add_note(company.id, id, "sent export", admin()).await.unwrap();

    let view = state.dsr.get(company.id, id).await.unwrap().unwrap();
    assert_eq!(view.internal_notes.len(), 2);
    assert_eq!(view.internal_notes[0], note);

    let notes = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrNoteAdd), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(notes.total, 2);
    assert_eq!(notes.logs.iter().filter(|l| l.metadata.extra.get("noteCount") == Some(&json!(2))).count(), 1);

    let err = state.dsr.add_note(company.id, id, "hi", AuditContext::default()).await.unwrap_err();
    assert!(matches!(err, DsrError::Validation { code: "missing_admin", .. }));
    let err = state.dsr.add_note(company.id, id, "   ", admin()).await.unwrap_err();
    assert!(matches!(err, DsrError::Validation { code: "empty_note", .. }));
}

#[tokio::test]
async fn lists_page_and_filter_by_status() {
    let (_, state, company) = setup();
    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(
            state
                .dsr
                .submit(&company, submission(&format!("r{n}@b.com"), "R", "ACCESS"), AuditContext::default())
                .await
                .unwrap(),
        );
    }
    let other = CompanyRef::new(Uuid::new_v4(), "Other");
    state.dsr.submit(&other, submission("x@y.com", "X", "OTHER"), AuditContext::default()).await.unwrap();
    state
        .dsr
        .update(company.id, ids[1], DsrUpdate { status: Some(DsrStatus::Rejected), ..Default::default() }, admin())
        .await
        .unwrap();

    let first = state.dsr.list(company.id, &DsrListQuery { limit: 2, ..Default::default() }).await.unwrap();
    assert_eq!(first.requests.len(), 2);
    assert_eq!((first.total, first.total_pages), (3, 2));
    let second = state.dsr.list(company.id, &DsrListQuery { page: 2, limit: 2, ..Default::default() }).await.unwrap();
    assert_eq!(second.requests.len(), 1);
    assert!(first.requests.iter().all(|r| r.id != second.requests[0].id));

    let rejected = state
        .dsr
        .list(company.id, &DsrListQuery { status: Some(DsrStatus::Rejected), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(rejected.total, 1);
    assert_eq!(rejected.requests[0].id, ids[1]);
    assert_eq!(rejected.requests[0].requester_email, "r1@b.com");
}

#[tokio::test]
async fn failed_audit_write_surfaces_after_update() {
    let (db, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "ACCESS"), AuditContext::default())
        .await
        .unwrap();
    db.reject_writes(AUDIT_COLLECTION).await;
    let err = state
        .dsr
        .update(company.id, id, DsrUpdate { status: Some(DsrStatus::InProgress), ..Default::default() }, admin())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::Audit(_)));
    assert_eq!(state.metrics.audit_log_write_failures_total.get(), 1);
    // business write and audit write are not atomic
    let view = state.dsr.get(company.id, id).await.unwrap().unwrap();
    assert_eq!(view.status, DsrStatus::InProgress);
}

#[tokio::test]
async fn failed_dsr_write_is_audited_as_unsuccessful() {
    let (db, state, company) = setup();
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "ACCESS"), AuditContext::default())
        .await
        .unwrap();
    db.reject_writes(DSR_COLLECTION).await;

    let err = state
        .dsr
        .update(company.id, id, DsrUpdate { status: Some(DsrStatus::InProgress), ..Default::default() }, admin())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::Store(StoreError::Unavailable(_))));

    let changes = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrStatusChange), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(changes.total, 1);
    let entry = &changes.logs[0];
    assert_eq!(entry.metadata.success, Some(false));
    assert!(entry.metadata.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert_eq!(entry.user_id.as_deref(), Some("admin-1"));

    let err = state.dsr.add_note(company.id, id, "called back", admin()).await.unwrap_err();
    assert!(matches!(err, DsrError::Store(_)));
    let notes = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrNoteAdd), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(notes.total, 1);
    assert_eq!(notes.logs[0].metadata.success, Some(false));

    db.accept_writes(DSR_COLLECTION).await;
    let view = state.dsr.get(company.id, id).await.unwrap().unwrap();
    assert_eq!(view.status, DsrStatus::New);
    assert!(view.internal_notes.is_empty());
}

/// Delegates to memory but loses every DSR row between read and write.
struct VanishingRows(MemoryDocumentStore);

#[async_trait]
impl DocumentStore for VanishingRows {
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Uuid> {
        self.0.insert_one(collection, doc).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.0.find_one(collection, filter).await
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        self.0.find(collection, filter, options).await
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<UpdateResult> {
        if collection == DSR_COLLECTION {
            return Ok(UpdateResult::default());
        }
        self.0.update_one(collection, filter, set).await
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.0.count_documents(collection, filter).await
    }
}

#[tokio::test]
async fn update_of_vanished_row_is_not_audited_as_success() {
    let state = AppState::new(&config(), Arc::new(VanishingRows(MemoryDocumentStore::new())));
    let company = CompanyRef::new(Uuid::new_v4(), "Acme");
    let id = state
        .dsr
        .submit(&company, submission("a@b.com", "A B", "ACCESS"), AuditContext::default())
        .await
        .unwrap();

    let err = state
        .dsr
        .update(company.id, id, DsrUpdate { status: Some(DsrStatus::Rejected), ..Default::default() }, admin())
        .await
        .unwrap_err();
    assert!(matches!(err, DsrError::NotFound));

    let changes = state
        .audit
        .get_audit_logs(&AuditLogFilter { action: Some(AuditAction::DsrStatusChange), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(changes.total, 1);
    assert_eq!(changes.logs[0].metadata.success, Some(false));
    assert_eq!(changes.logs[0].metadata.error.as_deref(), Some("DSR not found"));
}

#[tokio::test]
async fn legacy_plaintext_rows_still_read() {
    let (db, state, company) = setup();
    let id = Uuid::new_v4();
    let legacy = json!({
        "_id": id.to_string(),
        "companyId": company.id.to_string(),
        "requesterEmail": "old@example.com",
        "requesterEmailHash": hash_value("old@example.com"),
        "requesterName": "Old Row",
        "requestType": "OTHER",
        "status": "IN_PROGRESS",
        "createdAt": "2023-05-01T10:00:00Z",
        "updatedAt": "2023-05-01T10:00:00Z"
    });
    db.insert_one(DSR_COLLECTION, legacy.as_object().cloned().unwrap()).await.unwrap();

    let view = state.dsr.get(company.id, id).await.unwrap().unwrap();
    assert_eq!(view.requester_email, "old@example.com");
    assert!(view.internal_notes.is_empty());
    assert_eq!(state.metrics.pii_crypto_fallbacks_total.with_label_values(&["decrypt"]).get(), 3);
    assert_eq!(state.dsr.find_by_requester_email(company.id, "OLD@example.com").await.unwrap().len(), 1);
}
