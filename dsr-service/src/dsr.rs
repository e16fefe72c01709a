use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common_docstore::SortDirection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::EncryptedDsrFields;

pub const DSR_COLLECTION: &str = "dsrRequests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DsrStatus {
    New,
    PendingVerification,
    InProgress,
    Completed,
    Rejected,
    Cancelled,
}

impl DsrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsrStatus::New => "NEW",
            DsrStatus::PendingVerification => "PENDING_VERIFICATION",
            DsrStatus::InProgress => "IN_PROGRESS",
            DsrStatus::Completed => "COMPLETED",
            DsrStatus::Rejected => "REJECTED",
            DsrStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DsrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DsrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(DsrStatus::New),
            "PENDING_VERIFICATION" => Ok(DsrStatus::PendingVerification),
            "IN_PROGRESS" => Ok(DsrStatus::InProgress),
            "COMPLETED" => Ok(DsrStatus::Completed),
            "REJECTED" => Ok(DsrStatus::Rejected),
            "CANCELLED" => Ok(DsrStatus::Cancelled),
            other => Err(format!("invalid DSR status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Access,
    Delete,
    Correct,
    Other,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Access => "ACCESS",
            RequestType::Delete => "DELETE",
            RequestType::Correct => "CORRECT",
            RequestType::Other => "OTHER",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCESS" => Ok(RequestType::Access),
            "DELETE" => Ok(RequestType::Delete),
            "CORRECT" => Ok(RequestType::Correct),
            "OTHER" => Ok(RequestType::Other),
            other => Err(format!("invalid request type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalNote {
    pub note: String,
    pub admin_user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// The company a public submission is filed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRef {
    pub id: Uuid,
    pub name: String,
    /// Where new-request alerts go; no alert is sent without one.
    pub admin_email: Option<String>,
}

impl CompanyRef {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), admin_email: None }
    }

    pub fn with_admin_email(mut self, admin_email: impl Into<String>) -> Self {
        self.admin_email = Some(admin_email.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDsrSubmission {
    #[serde(default)]
    pub requester_email: String,
    #[serde(default)]
    pub requester_name: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Admin-side changes to a DSR. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsrUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DsrStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<Vec<InternalNote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored form of a DSR. Requester fields are ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsrRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(flatten)]
    pub pii: EncryptedDsrFields,
    pub status: DsrStatus,
    #[serde(default)]
    pub internal_notes: Vec<InternalNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Decrypted DSR as returned to an authorized admin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DsrView {
    pub id: Uuid,
    pub company_id: Uuid,
    pub requester_email: String,
    pub requester_name: String,
    pub request_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status: DsrStatus,
    pub internal_notes: Vec<InternalNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsrListQuery {
    pub status: Option<DsrStatus>,
    /// 1-based.
    pub page: u64,
    pub limit: u64,
    pub sort_order: SortDirection,
}

impl Default for DsrListQuery {
    fn default() -> Self {
        Self { status: None, page: 1, limit: 10, sort_order: SortDirection::Descending }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DsrPage {
    pub requests: Vec<DsrView>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}
