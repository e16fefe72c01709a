//! Audit entries for authentication events.
//!
//! These never fail the auth flow: a failed audit write is logged and dropped.

use axum::http::HeaderMap;
use common_audit::{
    extract_audit_context, AuditAction, AuditMetadata, AuditStore, CreateAuditLogParams, ResourceType, Session,
};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

fn identity_metadata(email: &str, name: &str, description: String) -> AuditMetadata {
    AuditMetadata::described(description)
        .with_extra("userEmail", email)
        .with_extra("userName", name)
}

async fn record(store: &AuditStore, params: CreateAuditLogParams, event: &'static str) {
    if let Err(err) = store.create_audit_log(params).await {
        warn!(event, error = %err, "failed to audit authentication event");
    }
}

pub async fn log_user_login(store: &AuditStore, session: &Session, headers: &HeaderMap) {
    let params = CreateAuditLogParams::new(AuditAction::UserLogin, ResourceType::Session, session.session.id.as_str())
        .with_metadata(identity_metadata(
            &session.user.email,
            &session.user.name,
            format!("User {} logged in", session.user.name),
        ))
        .with_context(extract_audit_context(headers, Some(session)));
    record(store, params, "user_login").await;
}

pub async fn log_user_logout(store: &AuditStore, session: &Session, headers: &HeaderMap) {
    let params = CreateAuditLogParams::new(AuditAction::UserLogout, ResourceType::Session, session.session.id.as_str())
        .with_metadata(identity_metadata(
            &session.user.email,
            &session.user.name,
            format!("User {} logged out", session.user.name),
        ))
        .with_context(extract_audit_context(headers, Some(session)));
    record(store, params, "user_logout").await;
}

pub async fn log_user_registration(store: &AuditStore, user: &RegisteredUser, headers: &HeaderMap) {
    let context = extract_audit_context(headers, None).with_user(&user.id, &user.email, &user.name);
    let params = CreateAuditLogParams::new(AuditAction::UserRegister, ResourceType::User, user.id.as_str())
        .with_metadata(identity_metadata(&user.email, &user.name, format!("User {} registered", user.name)))
        .with_context(context);
    record(store, params, "user_register").await;
}

pub async fn log_password_change(store: &AuditStore, session: &Session, headers: &HeaderMap) {
    let params = CreateAuditLogParams::new(AuditAction::UserPasswordChange, ResourceType::User, session.user.id.as_str())
        .with_metadata(identity_metadata(
            &session.user.email,
            &session.user.name,
            format!("User {} changed password", session.user.name),
        ))
        .with_context(extract_audit_context(headers, Some(session)));
    record(store, params, "password_change").await;
}
