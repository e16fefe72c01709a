use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_audit::{
    audited_operation, AuditAction, AuditContext, AuditMetadata, AuditStore, AuditedError, CreateAuditLogParams,
    ResourceType,
};
use common_docstore::{
    from_document, to_document, Document, DocumentStore, Filter, FindOptions, SortDirection, StoreError,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::company::CompanyDirectory;
use crate::dsr::{
    CompanyRef, DsrListQuery, DsrPage, DsrRecord, DsrStatus, DsrUpdate, DsrView, InternalNote, NewDsrSubmission,
    DSR_COLLECTION,
};
use crate::error::DsrError;
use crate::notify::{DsrNotice, Notifier};
use crate::pii::{email_search_hash, normalize_email, PiiCodec, PlainDsrFields};

pub(crate) static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_submission(submission: NewDsrSubmission) -> Result<PlainDsrFields, DsrError> {
    let fields = PlainDsrFields {
        requester_email: submission.requester_email.trim().to_string(),
        requester_name: submission.requester_name.trim().to_string(),
        request_type: submission.request_type.trim().to_string(),
        details: sanitize_optional(submission.details),
    };
    if fields.requester_email.is_empty() || fields.requester_name.is_empty() || fields.request_type.is_empty() {
        return Err(DsrError::validation("missing_fields", "Missing required fields"));
    }
    if !EMAIL_RE.is_match(&fields.requester_email) {
        return Err(DsrError::validation("invalid_email", "Invalid email format"));
    }
    fields.parsed_request_type()?;
    Ok(fields)
}

fn scoped(company_id: Uuid, dsr_id: Uuid) -> Filter {
    Filter::by_id(dsr_id).eq("companyId", company_id.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotesPatch<'a> {
    internal_notes: &'a [InternalNote],
    updated_at: DateTime<Utc>,
}

/// DSR intake and admin tracking. Every mutation lands in the audit trail.
#[derive(Clone)]
pub struct DsrService {
    db: Arc<dyn DocumentStore>,
    codec: PiiCodec,
    audit: AuditStore,
    companies: CompanyDirectory,
    notifier: Option<Arc<dyn Notifier>>,
}

impl DsrService {
    pub fn new(db: Arc<dyn DocumentStore>, codec: PiiCodec, audit: AuditStore) -> Self {
        let companies = CompanyDirectory::new(Arc::clone(&db), audit.clone());
        Self { db, codec, audit, companies, notifier: None }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn companies(&self) -> &CompanyDirectory {
        &self.companies
    }

    /// Public form submission. Returns the new DSR id.
    pub async fn submit(
        &self,
        company: &CompanyRef,
        submission: NewDsrSubmission,
        context: AuditContext,
    ) -> Result<Uuid, DsrError> {
        let fields = validate_submission(submission)?;
        self.file(company, fields, context).await
    }

    /// Public form submission addressed by the company's form identifier.
    pub async fn submit_by_identifier(
        &self,
        company_identifier: &str,
        submission: NewDsrSubmission,
        context: AuditContext,
    ) -> Result<Uuid, DsrError> {
        if company_identifier.trim().is_empty() {
            return Err(DsrError::validation("missing_fields", "Missing required fields"));
        }
        let fields = validate_submission(submission)?;
        let company = self
            .companies
            .company_by_form_identifier(company_identifier)
            .await?
            .ok_or(DsrError::CompanyNotFound)?;
        self.file(&company.to_ref(), fields, context).await
    }

    async fn file(&self, company: &CompanyRef, fields: PlainDsrFields, context: AuditContext) -> Result<Uuid, DsrError> {
        let now = Utc::now();
        let record = DsrRecord {
            id: Uuid::new_v4(),
            company_id: company.id,
            pii: self.codec.encrypt_dsr_fields(&fields),
            status: DsrStatus::New,
            internal_notes: Vec::new(),
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            completed_at: None,
        };
        let dsr_id = self.db.insert_one(DSR_COLLECTION, to_document(&record)?).await?;
        info!(dsr_id = %dsr_id, company_id = %company.id, request_type = %fields.request_type, "DSR submitted");

        let metadata = AuditMetadata {
            request_type: Some(fields.request_type.clone()),
            company_name: Some(company.name.clone()),
            description: Some(format!("New DSR request created ({})", fields.request_type)),
            ..AuditMetadata::default()
        }
        .with_extra("requesterEmailHash", record.pii.requester_email_hash.clone());
        let context = AuditContext {
            company_id: Some(company.id.into()),
            user_email: Some(fields.requester_email.clone()),
            user_name: Some(fields.requester_name.clone()),
            ..context
        };
        self.audit
            .create_audit_log(
                CreateAuditLogParams::new(AuditAction::DsrCreate, ResourceType::DsrRequest, dsr_id)
                    .with_metadata(metadata)
                    .with_context(context),
            )
            .await?;

        self.notify_filed(company, dsr_id, &fields).await;
        Ok(dsr_id)
    }

    async fn notify_filed(&self, company: &CompanyRef, dsr_id: Uuid, fields: &PlainDsrFields) {
        let Some(notifier) = &self.notifier else { return };
        let mut notices = Vec::with_capacity(2);
        if let Some(admin_email) = &company.admin_email {
            notices.push(DsrNotice::AdminAlert {
                to: admin_email.clone(),
                company_name: company.name.clone(),
                dsr_id,
                requester_name: fields.requester_name.clone(),
                request_type: fields.request_type.clone(),
            });
        }
        notices.push(DsrNotice::RequesterConfirmation {
            to: fields.requester_email.clone(),
            company_name: company.name.clone(),
            requester_name: fields.requester_name.clone(),
            request_type: fields.request_type.clone(),
        });
        for notice in &notices {
            if let Err(err) = notifier.notify(notice).await {
                warn!(dsr_id = %dsr_id, kind = notice.kind(), error = %err, "DSR notification not delivered");
            }
        }
    }

    async fn load(&self, company_id: Uuid, dsr_id: Uuid) -> Result<Option<(Document, DsrRecord)>, DsrError> {
        let Some(doc) = self.db.find_one(DSR_COLLECTION, &scoped(company_id, dsr_id)).await? else {
            return Ok(None);
        };
        let record = from_document::<DsrRecord>(doc.clone()).map_err(|e| DsrError::Malformed(e.to_string()))?;
        Ok(Some((doc, record)))
    }

    fn hydrate(&self, record: DsrRecord) -> DsrView {
        let plain = self.codec.decrypt_dsr_fields(&record.pii);
        DsrView {
            id: record.id,
            company_id: record.company_id,
            requester_email: plain.requester_email,
            requester_name: plain.requester_name,
            request_type: plain.request_type,
            details: plain.details,
            status: record.status,
            internal_notes: record.internal_notes,
            created_at: record.created_at,
            updated_at: record.updated_at,
            acknowledged_at: record.acknowledged_at,
            completed_at: record.completed_at,
        }
    }

    fn hydrate_all(&self, docs: Vec<Document>) -> Result<Vec<DsrView>, DsrError> {
        docs.into_iter()
            .map(|doc| {
                from_document::<DsrRecord>(doc)
                    .map(|record| self.hydrate(record))
                    .map_err(|e| DsrError::Malformed(e.to_string()))
            })
            .collect()
    }

    pub async fn get(&self, company_id: Uuid, dsr_id: Uuid) -> Result<Option<DsrView>, DsrError> {
        Ok(self.load(company_id, dsr_id).await?.map(|(_, record)| self.hydrate(record)))
    }

    pub async fn list(&self, company_id: Uuid, query: &DsrListQuery) -> Result<DsrPage, DsrError> {
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let mut filter = Filter::new().eq("companyId", company_id.to_string());
        if let Some(status) = query.status {
            filter = filter.eq("status", status.as_str());
        }
        let options = FindOptions::default()
            .sort("createdAt", query.sort_order)
            .skip((page - 1).saturating_mul(limit))
            .limit(limit);
        let total = self.db.count_documents(DSR_COLLECTION, &filter).await?;
        let docs = self.db.find(DSR_COLLECTION, &filter, &options).await?;
        Ok(DsrPage { requests: self.hydrate_all(docs)?, page, limit, total, total_pages: total.div_ceil(limit) })
    }

    /// Lookup by requester email through the stored hash; rows are never
    /// decrypted to compare.
    pub async fn find_by_requester_email(&self, company_id: Uuid, email: &str) -> Result<Vec<DsrView>, DsrError> {
        if normalize_email(email).is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .eq("companyId", company_id.to_string())
            .eq("requesterEmailHash", email_search_hash(email));
        let options = FindOptions::default().sort("createdAt", SortDirection::Descending);
        let docs = self.db.find(DSR_COLLECTION, &filter, &options).await?;
        self.hydrate_all(docs)
    }

    pub async fn update(
        &self,
        company_id: Uuid,
        dsr_id: Uuid,
        mut update: DsrUpdate,
        context: AuditContext,
    ) -> Result<DsrView, DsrError> {
        let (existing_doc, existing) = self.load(company_id, dsr_id).await?.ok_or(DsrError::NotFound)?;
        if update.status == Some(DsrStatus::Completed) && update.completed_at.is_none() && existing.completed_at.is_none() {
            update.completed_at = Some(Utc::now());
        }
        let new_values = to_document(&update)?;
        if new_values.is_empty() {
            return Err(DsrError::validation("empty_update", "No updatable fields supplied"));
        }

        let changes: Vec<String> = new_values
            .iter()
            .filter(|(key, value)| existing_doc.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        let old_values: Map<String, Value> = changes
            .iter()
            .map(|key| (key.clone(), existing_doc.get(key).cloned().unwrap_or(Value::Null)))
            .collect();
        let status_change = update.status.filter(|status| *status != existing.status);
        let (action, description) = match status_change {
            Some(status) => (
                AuditAction::DsrStatusChange,
                format!("DSR status changed from {} to {}", existing.status, status),
            ),
            None => (AuditAction::DsrUpdate, "DSR updated".to_string()),
        };
        let metadata = AuditMetadata {
            old_values: Some(old_values),
            new_values: Some(new_values.clone()),
            changes: Some(changes.clone()),
            dsr_status: update.status.map(|s| s.as_str().to_string()),
            completed_at: update.completed_at,
            description: Some(description),
            ..AuditMetadata::default()
        };

        let mut set = new_values;
        set.insert(
            "updatedAt".into(),
            serde_json::to_value(Utc::now()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        );
        let params = CreateAuditLogParams::new(action, ResourceType::DsrRequest, dsr_id)
            .with_metadata(metadata)
            .with_context(context.with_company(company_id));
        self.write_audited(company_id, dsr_id, set, params).await?;
        info!(dsr_id = %dsr_id, action = %action, changed = changes.len(), "DSR updated");

        self.get(company_id, dsr_id).await?.ok_or(DsrError::NotFound)
    }

    /// Appends an internal note authored by the acting admin.
    pub async fn add_note(
        &self,
        company_id: Uuid,
        dsr_id: Uuid,
        note: &str,
        context: AuditContext,
    ) -> Result<InternalNote, DsrError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(DsrError::validation("empty_note", "Note must not be empty"));
        }
        let admin_user_id = context
            .resolved_user_id()
            .ok_or_else(|| DsrError::validation("missing_admin", "An authenticated admin is required"))?;
        let (_, existing) = self.load(company_id, dsr_id).await?.ok_or(DsrError::NotFound)?;

        let now = Utc::now();
        let entry = InternalNote { note: note.to_string(), admin_user_id, timestamp: now };
        let mut notes = existing.internal_notes;
        notes.push(entry.clone());
        let set = to_document(&NotesPatch { internal_notes: &notes, updated_at: now })?;

        let metadata = AuditMetadata::described("Internal note added")
            .with_extra("noteCount", notes.len());
        let params = CreateAuditLogParams::new(AuditAction::DsrNoteAdd, ResourceType::DsrRequest, dsr_id)
            .with_metadata(metadata)
            .with_context(context.with_company(company_id));
        self.write_audited(company_id, dsr_id, set, params).await?;
        debug!(dsr_id = %dsr_id, notes = notes.len(), "internal note added");
        Ok(entry)
    }

    /// A write that matches nothing counts as a failed operation, so the
    /// audit entry records it as unsuccessful.
    async fn write_audited(
        &self,
        company_id: Uuid,
        dsr_id: Uuid,
        set: Document,
        params: CreateAuditLogParams,
    ) -> Result<(), DsrError> {
        let db = Arc::clone(&self.db);
        let filter = scoped(company_id, dsr_id);
        audited_operation(
            &self.audit,
            || async move {
                match db.update_one(DSR_COLLECTION, &filter, set).await {
                    Ok(result) if result.matched == 0 => Err(DsrError::NotFound),
                    Ok(_) => Ok(()),
                    Err(err) => Err(DsrError::Store(err)),
                }
            },
            params,
        )
        .await
        .map_err(|err| match err {
            AuditedError::Operation(e) => e,
            AuditedError::Audit(e) => DsrError::Audit(e),
        })
    }
}
