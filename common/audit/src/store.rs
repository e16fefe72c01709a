use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use common_docstore::{from_document, to_document, DocumentStore, Filter, FindOptions, SortDirection};
use common_observability::AuditMetrics;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::context::{AuditContext, UNKNOWN};
use crate::model::{AuditAction, AuditEntry, AuditError, AuditMetadata, AuditResult, IdRef, ResourceType};
use crate::severity::severity_for_action;

pub const AUDIT_COLLECTION: &str = "auditLogs";

#[derive(Debug, Clone)]
pub struct CreateAuditLogParams {
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: IdRef,
    pub metadata: AuditMetadata,
    pub context: AuditContext,
}

impl CreateAuditLogParams {
    pub fn new(action: AuditAction, resource_type: ResourceType, resource_id: impl Into<IdRef>) -> Self {
        Self {
            action,
            resource_type,
            resource_id: resource_id.into(),
            metadata: AuditMetadata::default(),
            context: AuditContext::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: AuditMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditSortField {
    #[default]
    Timestamp,
    Action,
    ResourceType,
}

impl AuditSortField {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Action => "action",
            Self::ResourceType => "resourceType",
        }
    }
}

/// Query over the audit trail. Unset fields do not constrain the result.
///
/// Date bounds are inclusive. A `limit` of `None` or zero returns every
/// matching entry after `skip`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLogFilter {
    pub company_id: Option<IdRef>,
    pub user_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<IdRef>,
    pub action: Option<AuditAction>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub skip: u64,
    pub sort_by: AuditSortField,
    pub sort_order: SortDirection,
}

impl AuditLogFilter {
    fn to_store_filter(&self) -> AuditResult<Filter> {
        let mut filter = Filter::new();
        if let Some(company) = &self.company_id {
            filter = filter.eq("companyId", company.to_uuid()?.to_string());
        }
        if let Some(user_id) = &self.user_id {
            filter = filter.eq("userId", user_id.as_str());
        }
        if let Some(resource_type) = self.resource_type {
            filter = filter.eq("resourceType", resource_type.as_str());
        }
        if let Some(resource_id) = &self.resource_id {
            filter = filter.eq("resourceId", resource_id.to_string());
        }
        if let Some(action) = self.action {
            filter = filter.eq("action", action.as_str());
        }
        let bound = |d: &DateTime<Utc>| Value::String(d.to_rfc3339());
        Ok(filter.range("timestamp", self.start_date.as_ref().map(bound), self.end_date.as_ref().map(bound)))
    }

    fn find_options(&self) -> FindOptions {
        let options = FindOptions::default()
            .sort(self.sort_by.field_name(), self.sort_order)
            .skip(self.skip);
        match self.limit {
            Some(limit) if limit > 0 => options.limit(limit),
            _ => options,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourcePageOptions {
    pub limit: Option<u64>,
    pub skip: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub logs: Vec<AuditEntry>,
    pub total: u64,
    pub has_more: bool,
}

/// Document written for a new entry; the store assigns `_id`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingEntry<'a> {
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company_id: Option<Uuid>,
    metadata: &'a AuditMetadata,
    ip_address: String,
    user_agent: String,
    timestamp: DateTime<Utc>,
}

/// Append-only audit trail over a document store.
#[derive(Clone)]
pub struct AuditStore {
    db: Arc<dyn DocumentStore>,
    metrics: Option<AuditMetrics>,
    last_timestamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AuditStore {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db, metrics: None, last_timestamp: Arc::new(Mutex::new(None)) }
    }

    pub fn with_metrics(mut self, metrics: AuditMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Write-time clock that never goes backwards within this store.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_timestamp.lock() {
            Ok(mut last) => {
                let stamp = last.map_or(now, |prev| prev.max(now));
                *last = Some(stamp);
                stamp
            }
            Err(_) => now,
        }
    }

    /// Persists one audit entry and returns its id.
    pub async fn create_audit_log(&self, params: CreateAuditLogParams) -> AuditResult<Uuid> {
        let CreateAuditLogParams { action, resource_type, resource_id, mut metadata, context } = params;

        let company_id = match &context.company_id {
            Some(company) => Some(company.to_uuid().inspect_err(|e| {
                error!(action = %action, error = %e, "rejecting audit entry with malformed company id");
            })?),
            None => None,
        };
        let severity = *metadata.severity.get_or_insert_with(|| severity_for_action(&action));

        let pending = PendingEntry {
            action,
            resource_type,
            resource_id: resource_id.to_string(),
            user_id: context.resolved_user_id(),
            user_email: context.resolved_user_email(),
            user_name: context.resolved_user_name(),
            company_id,
            metadata: &metadata,
            ip_address: context.ip_address.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            user_agent: context.user_agent.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            timestamp: self.next_timestamp(),
        };
        let doc = to_document(&pending)?;

        match self.db.insert_one(AUDIT_COLLECTION, doc).await {
            Ok(id) => {
                if let Some(m) = &self.metrics {
                    m.record_write(action.as_str(), severity.as_str());
                }
                debug!(audit_id = %id, action = %action, resource_type = %resource_type, severity = %severity, "audit entry recorded");
                Ok(id)
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.record_write_failure();
                }
                error!(action = %action, resource_type = %resource_type, error = %e, "failed to write audit entry");
                Err(AuditError::Store(e))
            }
        }
    }

    pub async fn get_audit_logs(&self, filter: &AuditLogFilter) -> AuditResult<AuditLogPage> {
        let store_filter = filter.to_store_filter()?;
        let docs = self.db.find(AUDIT_COLLECTION, &store_filter, &filter.find_options()).await?;
        let total = self.db.count_documents(AUDIT_COLLECTION, &store_filter).await?;
        let logs = docs
            .into_iter()
            .map(|doc| from_document::<AuditEntry>(doc).map_err(|e| AuditError::Malformed(e.to_string())))
            .collect::<AuditResult<Vec<_>>>()?;
        let has_more = filter.skip + (logs.len() as u64) < total;
        Ok(AuditLogPage { logs, total, has_more })
    }

    /// Trail of one resource, newest first.
    pub async fn get_resource_audit_logs(
        &self,
        resource_type: ResourceType,
        resource_id: impl Into<IdRef>,
        options: ResourcePageOptions,
    ) -> AuditResult<AuditLogPage> {
        let filter = AuditLogFilter {
            resource_type: Some(resource_type),
            resource_id: Some(resource_id.into()),
            limit: options.limit,
            skip: options.skip,
            ..AuditLogFilter::default()
        };
        self.get_audit_logs(&filter).await
    }
}
