use std::sync::Arc;

use axum::http::HeaderMap;
use common_audit::{
    AuditAction, AuditLogFilter, AuditSeverity, AuditStore, ResourceType, Session, SessionInfo, SessionUser,
    AUDIT_COLLECTION,
};
use common_docstore::MemoryDocumentStore;
use dsr_service::auth_audit::{
    log_password_change, log_user_login, log_user_logout, log_user_registration, RegisteredUser,
};

fn session() -> Session {
    Session {
        session: SessionInfo { id: "sess-1".into(), user_id: "user-1".into() },
        user: SessionUser { id: "user-1".into(), email: "ada@acme.test".into(), name: "Ada".into() },
    }
}

fn headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
    headers.insert("user-agent", "curl/8.0".parse().unwrap());
    headers
}

fn store() -> (MemoryDocumentStore, AuditStore) {
    let db = MemoryDocumentStore::new();
    let store = AuditStore::new(Arc::new(db.clone()));
    (db, store)
}

#[tokio::test]
async fn login_and_logout_are_session_events() {
    let (_, store) = store();
    log_user_login(&store, &session(), &headers()).await;
    log_user_logout(&store, &session(), &HeaderMap::new()).await;

    let page = store
        .get_audit_logs(&AuditLogFilter { resource_type: Some(ResourceType::Session), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let login = page.logs.iter().find(|l| l.action == AuditAction::UserLogin).expect("login entry");
    assert_eq!(login.resource_id, "sess-1");
    assert_eq!(login.user_id.as_deref(), Some("user-1"));
    assert_eq!(login.user_email.as_deref(), Some("ada@acme.test"));
    assert_eq!(login.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(login.user_agent.as_deref(), Some("curl/8.0"));
    assert_eq!(login.metadata.description.as_deref(), Some("User Ada logged in"));
    assert_eq!(login.severity(), Some(AuditSeverity::Low));

    let logout = page.logs.iter().find(|l| l.action == AuditAction::UserLogout).expect("logout entry");
    assert_eq!(logout.ip_address.as_deref(), Some("unknown"));
}

#[tokio::test]
async fn registration_and_password_change_are_user_events() {
    let (_, store) = store();
    let user = RegisteredUser { id: "user-2".into(), email: "new@acme.test".into(), name: "Newt".into() };
    log_user_registration(&store, &user, &headers()).await;
    log_password_change(&store, &session(), &headers()).await;

    let page = store
        .get_audit_logs(&AuditLogFilter { resource_type: Some(ResourceType::User), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let registered = page.logs.iter().find(|l| l.action == AuditAction::UserRegister).unwrap();
    assert_eq!(registered.user_id.as_deref(), Some("user-2"));
    assert_eq!(registered.resource_id, "user-2");
    assert_eq!(registered.severity(), Some(AuditSeverity::Medium));
    let changed = page.logs.iter().find(|l| l.action == AuditAction::UserPasswordChange).unwrap();
    assert_eq!(changed.resource_id, "user-1");
    assert_eq!(changed.severity(), Some(AuditSeverity::High));
}

#[tokio::test]
async fn audit_failures_do_not_break_auth_flows() {
    let (db, store) = store();
    db.reject_writes(AUDIT_COLLECTION).await;
    log_user_login(&store, &session(), &headers()).await;
    log_password_change(&store, &session(), &headers()).await;
    assert!(db.dump(AUDIT_COLLECTION).await.is_empty());
}
