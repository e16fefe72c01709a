//! Outbound notices sent when a DSR is filed. Delivery is best-effort.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsrNotice {
    /// Tells the company admin a request arrived.
    AdminAlert {
        to: String,
        company_name: String,
        dsr_id: Uuid,
        requester_name: String,
        request_type: String,
    },
    /// Receipt for the requester.
    RequesterConfirmation {
        to: String,
        company_name: String,
        requester_name: String,
        request_type: String,
    },
}

impl DsrNotice {
    pub fn recipient(&self) -> &str {
        match self {
            DsrNotice::AdminAlert { to, .. } | DsrNotice::RequesterConfirmation { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DsrNotice::AdminAlert { .. } => "admin_alert",
            DsrNotice::RequesterConfirmation { .. } => "requester_confirmation",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Mail transport seam. Rendering the message body is up to the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &DsrNotice) -> Result<(), NotifyError>;
}
