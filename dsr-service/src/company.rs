//! Companies that receive DSRs through their public form.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_audit::{AuditAction, AuditContext, AuditMetadata, AuditStore, CreateAuditLogParams, ResourceType};
use common_docstore::{from_document, to_document, DocumentStore, Filter};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::dsr::CompanyRef;
use crate::error::DsrError;
use crate::requests::EMAIL_RE;

pub const COMPANY_COLLECTION: &str = "companies";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub admin_user_id: String,
    pub dsr_form_identifier: String,
    pub admin_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyRecord {
    pub fn to_ref(&self) -> CompanyRef {
        CompanyRef::new(self.id, self.name.clone()).with_admin_email(self.admin_email.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dsr_form_identifier: String,
    #[serde(default)]
    pub admin_email: String,
}

#[derive(Clone)]
pub struct CompanyDirectory {
    db: Arc<dyn DocumentStore>,
    audit: AuditStore,
}

impl CompanyDirectory {
    pub fn new(db: Arc<dyn DocumentStore>, audit: AuditStore) -> Self {
        Self { db, audit }
    }

    /// Registers a company owned by the acting admin. Form identifiers are unique.
    pub async fn create_company(&self, company: NewCompany, context: AuditContext) -> Result<CompanyRecord, DsrError> {
        let name = company.name.trim().to_string();
        let identifier = company.dsr_form_identifier.trim().to_string();
        let admin_email = company.admin_email.trim().to_string();
        if name.is_empty() || identifier.is_empty() || admin_email.is_empty() {
            return Err(DsrError::validation("missing_fields", "Missing required fields"));
        }
        if !EMAIL_RE.is_match(&admin_email) {
            return Err(DsrError::validation("invalid_email", "Invalid email format"));
        }
        let admin_user_id = context
            .resolved_user_id()
            .ok_or_else(|| DsrError::validation("missing_admin", "An authenticated admin is required"))?;
        if self.company_by_form_identifier(&identifier).await?.is_some() {
            return Err(DsrError::validation("identifier_taken", "Form identifier is already in use"));
        }

        let now = Utc::now();
        let record = CompanyRecord {
            id: Uuid::new_v4(),
            name,
            admin_user_id,
            dsr_form_identifier: identifier,
            admin_email,
            created_at: now,
            updated_at: now,
        };
        let id = self.db.insert_one(COMPANY_COLLECTION, to_document(&record)?).await?;
        info!(company_id = %id, identifier = %record.dsr_form_identifier, "company created");

        let metadata = AuditMetadata {
            company_name: Some(record.name.clone()),
            description: Some(format!("Company \"{}\" created", record.name)),
            ..AuditMetadata::default()
        }
        .with_extra("identifier", record.dsr_form_identifier.clone());
        self.audit
            .create_audit_log(
                CreateAuditLogParams::new(AuditAction::CompanyCreate, ResourceType::Company, id)
                    .with_metadata(metadata)
                    .with_context(context.with_company(id)),
            )
            .await?;
        Ok(record)
    }

    pub async fn company_by_form_identifier(&self, identifier: &str) -> Result<Option<CompanyRecord>, DsrError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        let filter = Filter::new().eq("dsrFormIdentifier", identifier);
        self.db
            .find_one(COMPANY_COLLECTION, &filter)
            .await?
            .map(|doc| from_document::<CompanyRecord>(doc).map_err(|e| DsrError::Malformed(e.to_string())))
            .transpose()
    }
}
