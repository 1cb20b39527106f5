//! Query-parameter parsing and validation shared by the v2 endpoints.

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;

/// Query parameters accepted by the report endpoints. `tenant` is an alias
/// for `project_id`.
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub project_id: Option<String>,
    pub tenant: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub detailed: Option<bool>,
}

/// Query parameters for the products endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    /// Comma-separated region names.
    pub regions: Option<String>,
}

/// Parse a timestamp in one of exactly two accepted formats: a bare date
/// (midnight UTC) or a date-time with seconds. Anything else is a client
/// error.
pub fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let at = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::InternalError(anyhow!("invalid midnight for {}", value)))?;
        return Ok(at.and_utc());
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(at.and_utc());
    }
    Err(AppError::BadRequest(anyhow!(
        "invalid {} '{}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
        field,
        value
    )))
}

/// Project id from either accepted parameter name.
pub fn resolve_project_id(params: &ReportParams) -> Result<&str, AppError> {
    params
        .project_id
        .as_deref()
        .or(params.tenant.as_deref())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow!("missing required parameter 'project_id'")))
}

/// Validated `[start, end)` range: `start` is required, `end` defaults to
/// now and is clamped to now, and the range must be non-empty.
pub fn resolve_range(params: &ReportParams) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let start_raw = params
        .start
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(anyhow!("missing required parameter 'start'")))?;
    let start = parse_datetime("start", start_raw)?;

    let now = Utc::now();
    let end = match params.end.as_deref() {
        Some(raw) => parse_datetime("end", raw)?.min(now),
        None => now,
    };

    if end <= start {
        return Err(AppError::BadRequest(anyhow!(
            "'end' must be after 'start'"
        )));
    }
    Ok((start, end))
}
