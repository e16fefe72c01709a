use crate::model::{AuditAction, AuditSeverity};

/// Severity recorded for an action when the caller does not supply one.
pub fn severity_for_action(action: &AuditAction) -> AuditSeverity {
    use AuditAction::*;
    match action {
        CompanyDelete | DsrDelete | AdminRoleChange | DataExport => AuditSeverity::Critical,
        UserPasswordChange | CompanyUpdate | DsrStatusChange | AdminAccessGranted => AuditSeverity::High,
        CompanyCreate | DsrCreate | DsrUpdate | UserRegister | DsrNoteAdd => AuditSeverity::Medium,
        _ => AuditSeverity::Low,
    }
}

/// Same table keyed by wire name; unknown names are LOW.
pub fn severity_for_action_name(name: &str) -> AuditSeverity {
    name.parse::<AuditAction>()
        .map(|action| severity_for_action(&action))
        .unwrap_or(AuditSeverity::Low)
}
