use chrono::{DateTime, Utc};
use common_docstore::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UserLogin,
    UserLogout,
    UserRegister,
    UserPasswordChange,
    UserEmailVerify,
    CompanyCreate,
    CompanyUpdate,
    CompanyDelete,
    DsrCreate,
    DsrUpdate,
    DsrStatusChange,
    DsrDelete,
    DsrNoteAdd,
    DsrView,
    AdminLogin,
    AdminAccessGranted,
    AdminRoleChange,
    SystemBackup,
    SystemMaintenance,
    DataExport,
    DataImport,
}

impl AuditAction {
    pub const ALL: [AuditAction; 21] = [
        AuditAction::UserLogin,
        AuditAction::UserLogout,
        AuditAction::UserRegister,
        AuditAction::UserPasswordChange,
        AuditAction::UserEmailVerify,
        AuditAction::CompanyCreate,
        AuditAction::CompanyUpdate,
        AuditAction::CompanyDelete,
        AuditAction::DsrCreate,
        AuditAction::DsrUpdate,
        AuditAction::DsrStatusChange,
        AuditAction::DsrDelete,
        AuditAction::DsrNoteAdd,
        AuditAction::DsrView,
        AuditAction::AdminLogin,
        AuditAction::AdminAccessGranted,
        AuditAction::AdminRoleChange,
        AuditAction::SystemBackup,
        AuditAction::SystemMaintenance,
        AuditAction::DataExport,
        AuditAction::DataImport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserLogin => "USER_LOGIN",
            Self::UserLogout => "USER_LOGOUT",
            Self::UserRegister => "USER_REGISTER",
            Self::UserPasswordChange => "USER_PASSWORD_CHANGE",
            Self::UserEmailVerify => "USER_EMAIL_VERIFY",
            Self::CompanyCreate => "COMPANY_CREATE",
            Self::CompanyUpdate => "COMPANY_UPDATE",
            Self::CompanyDelete => "COMPANY_DELETE",
            Self::DsrCreate => "DSR_CREATE",
            Self::DsrUpdate => "DSR_UPDATE",
            Self::DsrStatusChange => "DSR_STATUS_CHANGE",
            Self::DsrDelete => "DSR_DELETE",
            Self::DsrNoteAdd => "DSR_NOTE_ADD",
            Self::DsrView => "DSR_VIEW",
            Self::AdminLogin => "ADMIN_LOGIN",
            Self::AdminAccessGranted => "ADMIN_ACCESS_GRANTED",
            Self::AdminRoleChange => "ADMIN_ROLE_CHANGE",
            Self::SystemBackup => "SYSTEM_BACKUP",
            Self::SystemMaintenance => "SYSTEM_MAINTENANCE",
            Self::DataExport => "DATA_EXPORT",
            Self::DataImport => "DATA_IMPORT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("invalid audit action: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    User,
    Company,
    DsrRequest,
    AuditLog,
    System,
    Session,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::User,
        ResourceType::Company,
        ResourceType::DsrRequest,
        ResourceType::AuditLog,
        ResourceType::System,
        ResourceType::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Company => "COMPANY",
            Self::DsrRequest => "DSR_REQUEST",
            Self::AuditLog => "AUDIT_LOG",
            Self::System => "SYSTEM",
            Self::Session => "SESSION",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("invalid resource type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known audit metadata fields plus a free-form extension map.
///
/// `extra` is flattened on the wire, so stored documents look like one flat
/// object regardless of which keys are typed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsr_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<AuditSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditMetadata {
    pub fn described(description: impl Into<String>) -> Self {
        Self { description: Some(description.into()), ..Self::default() }
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A persisted audit log entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    pub metadata: AuditMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Severity recorded at write time.
    pub fn severity(&self) -> Option<AuditSeverity> {
        self.metadata.severity
    }
}

/// An identifier handed in either as a database id or as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdRef {
    Id(Uuid),
    Raw(String),
}

impl IdRef {
    /// Canonical database id; raw strings must parse as a uuid.
    pub fn to_uuid(&self) -> AuditResult<Uuid> {
        match self {
            IdRef::Id(id) => Ok(*id),
            IdRef::Raw(raw) => Uuid::parse_str(raw.trim()).map_err(|_| AuditError::InvalidId(raw.clone())),
        }
    }
}

impl fmt::Display for IdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdRef::Id(id) => write!(f, "{id}"),
            IdRef::Raw(raw) => f.write_str(raw),
        }
    }
}

impl From<Uuid> for IdRef {
    fn from(value: Uuid) -> Self {
        IdRef::Id(value)
    }
}

impl From<&str> for IdRef {
    fn from(value: &str) -> Self {
        IdRef::Raw(value.to_string())
    }
}

impl From<String> for IdRef {
    fn from(value: String) -> Self {
        IdRef::Raw(value)
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid id '{0}'")]
    InvalidId(String),
    #[error("audit store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed audit entry: {0}")]
    Malformed(String),
}

pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_names_round_trip() {
        for action in AuditAction::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("DSR_EXPLODE".parse::<AuditAction>().is_err());
    }

    #[test]
    fn resource_type_names() {
        assert_eq!(ResourceType::DsrRequest.as_str(), "DSR_REQUEST");
        assert_eq!("AUDIT_LOG".parse::<ResourceType>().unwrap(), ResourceType::AuditLog);
        assert!("dsr_request".parse::<ResourceType>().is_err());
    }

    #[test]
    fn metadata_flattens_extra_fields() {
        let meta = AuditMetadata::described("Company created")
            .with_severity(AuditSeverity::Medium)
            .with_extra("identifier", "acme");
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            value,
            json!({"description": "Company created", "severity": "MEDIUM", "identifier": "acme"})
        );
        let back: AuditMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn id_ref_normalizes_strings() {
        let id = Uuid::new_v4();
        assert_eq!(IdRef::from(id.to_string()).to_uuid().unwrap(), id);
        assert_eq!(IdRef::from(id).to_uuid().unwrap(), id);
        assert!(matches!(IdRef::from("acme").to_uuid(), Err(AuditError::InvalidId(_))));
        assert_eq!(IdRef::from("session-1").to_string(), "session-1");
    }
}
