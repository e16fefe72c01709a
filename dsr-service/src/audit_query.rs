use chrono::{DateTime, NaiveDate, Utc};
use common_audit::{
    AuditAction, AuditLogFilter, AuditLogPage, AuditSortField, AuditStore, IdRef, ResourceType, SortOrder,
};
use common_http_errors::{ApiError, ApiResult};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::DsrError;

pub const DEFAULT_AUDIT_PAGE_LIMIT: u64 = 50;

/// Raw audit-log query string, validated by [`AuditLogQueryParams::into_filter`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQueryParams {
    pub company_id: Option<String>,
    pub user_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_count(raw: Option<String>, code: &'static str) -> ApiResult<Option<u64>> {
    present(raw)
        .map(|v| v.parse::<u64>().map_err(|_| ApiError::bad_request(code, format!("'{v}' is not a non-negative integer"))))
        .transpose()
}

/// RFC 3339 instant, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_date(raw: Option<String>, field: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = present(raw) else { return Ok(None) };
    if let Ok(instant) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| ApiError::bad_request("invalid_date", format!("{field} must be an RFC 3339 timestamp")))
}

impl AuditLogQueryParams {
    pub fn into_filter(self, max_limit: u64) -> ApiResult<AuditLogFilter> {
        let company_id = present(self.company_id)
            .map(|raw| {
                Uuid::parse_str(&raw)
                    .map(IdRef::from)
                    .map_err(|_| ApiError::bad_request("invalid_company_id", format!("invalid company id: {raw}")))
            })
            .transpose()?;
        let resource_type = present(self.resource_type)
            .map(|raw| raw.parse::<ResourceType>().map_err(|e| ApiError::bad_request("invalid_resource_type", e)))
            .transpose()?;
        let action = present(self.action)
            .map(|raw| raw.parse::<AuditAction>().map_err(|e| ApiError::bad_request("invalid_action", e)))
            .transpose()?;
        let start_date = parse_date(self.start_date, "startDate")?;
        let end_date = parse_date(self.end_date, "endDate")?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(ApiError::bad_request("invalid_date_range", "startDate is after endDate"));
            }
        }
        let limit = match parse_count(self.limit, "invalid_limit")? {
            Some(0) | None => DEFAULT_AUDIT_PAGE_LIMIT,
            Some(n) => n,
        }
        .min(max_limit.max(1));
        let skip = parse_count(self.skip, "invalid_skip")?.unwrap_or(0);
        let sort_by = match present(self.sort_by).as_deref() {
            None | Some("timestamp") => AuditSortField::Timestamp,
            Some("action") => AuditSortField::Action,
            Some("resourceType") => AuditSortField::ResourceType,
            Some(other) => return Err(ApiError::bad_request("invalid_sort_by", format!("cannot sort by {other}"))),
        };
        let sort_order = match present(self.sort_order).as_deref() {
            None | Some("desc") => SortOrder::Descending,
            Some("asc") => SortOrder::Ascending,
            Some(other) => return Err(ApiError::bad_request("invalid_sort_order", format!("invalid sort order: {other}"))),
        };

        Ok(AuditLogFilter {
            company_id,
            user_id: present(self.user_id),
            resource_type,
            resource_id: present(self.resource_id).map(IdRef::from),
            action,
            start_date,
            end_date,
            limit: Some(limit),
            skip,
            sort_by,
            sort_order,
        })
    }
}

/// Audit-log listing for an admin who manages `managed_companies`.
///
/// A requested company must be one of them. Without one the query is scoped
/// to the single managed company, and is ambiguous when there are several.
pub async fn query_audit_logs(
    store: &AuditStore,
    managed_companies: &[Uuid],
    params: AuditLogQueryParams,
    max_limit: u64,
) -> ApiResult<AuditLogPage> {
    let mut filter = params.into_filter(max_limit)?;
    match filter.company_id.clone() {
        Some(IdRef::Id(requested)) if managed_companies.contains(&requested) => {}
        Some(requested) => {
            warn!(company_id = %requested, "audit log access denied for unmanaged company");
            return Err(ApiError::Forbidden);
        }
        None => match managed_companies {
            [] => return Ok(AuditLogPage { logs: Vec::new(), total: 0, has_more: false }),
            [only] => filter.company_id = Some(IdRef::Id(*only)),
            _ => {
                return Err(ApiError::bad_request(
                    "company_required",
                    "Please specify a companyId when managing multiple companies",
                ))
            }
        },
    }
    store.get_audit_logs(&filter).await.map_err(|e| ApiError::from(DsrError::from(e)))
}
