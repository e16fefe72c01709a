use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::model::IdRef;

pub const UNKNOWN: &str = "unknown";

/// Proxy headers consulted for the client address, in priority order.
const IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Authenticated session as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session: SessionInfo,
    pub user: SessionUser,
}

/// Who did something and from where. Explicit fields win over the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub company_id: Option<IdRef>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session: Option<Session>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl AuditContext {
    pub fn with_company(mut self, company_id: impl Into<IdRef>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    pub fn with_user(mut self, id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self.user_email = Some(email.into());
        self.user_name = Some(name.into());
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn resolved_user_id(&self) -> Option<String> {
        non_empty(&self.user_id).or_else(|| {
            self.session.as_ref().map(|s| s.session.user_id.clone()).filter(|s| !s.is_empty())
        })
    }

    pub fn resolved_user_email(&self) -> Option<String> {
        non_empty(&self.user_email)
            .or_else(|| self.session.as_ref().map(|s| s.user.email.clone()).filter(|s| !s.is_empty()))
    }

    pub fn resolved_user_name(&self) -> Option<String> {
        non_empty(&self.user_name)
            .or_else(|| self.session.as_ref().map(|s| s.user.name.clone()).filter(|s| !s.is_empty()))
    }
}

fn header_str(map: &HeaderMap, name: &str) -> Option<String> {
    map.get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Builds an audit context from request headers and the optional session.
pub fn extract_audit_context(headers: &HeaderMap, session: Option<&Session>) -> AuditContext {
    let ip_address = IP_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let user_agent = header_str(headers, "user-agent").unwrap_or_else(|| UNKNOWN.to_string());
    AuditContext {
        ip_address: Some(ip_address),
        user_agent: Some(user_agent),
        session: session.cloned(),
        ..AuditContext::default()
    }
}
