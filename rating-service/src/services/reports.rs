//! Report assembly: measurements, costs, quotations and invoices for one
//! tenant over a validated time range.

use crate::models::{
    CostBreakdown, CostsOutput, InvoicesOutput, Measurement, MeasurementsOutput, QuotationsOutput,
    Tenant, UsageRow,
};
use crate::startup::AppState;
use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aggregated raw usage with merged resource metadata; no pricing applied.
pub async fn get_usage(
    state: &AppState,
    project_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<MeasurementsOutput, AppError> {
    let tenant = require_tenant(state, project_id).await?;
    let rows = state.store.usage(&tenant.id, start, end).await?;
    let resources = fetch_resources(state, &tenant.id, &rows).await?;

    let measurements = rows
        .into_iter()
        .map(|row| Measurement {
            resource: resources
                .get(&row.resource_id)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
            resource_id: row.resource_id,
            service: row.service,
            unit: row.unit,
            volume: row.volume,
        })
        .collect();

    Ok(MeasurementsOutput {
        start: start.format(TIMESTAMP_FORMAT).to_string(),
        end: end.format(TIMESTAMP_FORMAT).to_string(),
        project_id: tenant.id,
        project_name: tenant.name,
        measurements,
    })
}

/// Rated usage over an arbitrary validated range.
pub async fn get_costs(
    state: &AppState,
    project_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    detailed: bool,
) -> Result<CostsOutput, AppError> {
    let tenant = require_tenant(state, project_id).await?;
    let cost = build_range_cost(state, &tenant, start, end, detailed).await?;

    Ok(CostsOutput {
        start: start.format(TIMESTAMP_FORMAT).to_string(),
        end: end.format(TIMESTAMP_FORMAT).to_string(),
        project_id: tenant.id,
        project_name: tenant.name,
        cost,
    })
}

/// Live running cost for the current partial month. Recomputable at any
/// time; never persisted as a final charge.
pub async fn get_quotations(
    state: &AppState,
    project_id: &str,
    detailed: bool,
) -> Result<QuotationsOutput, AppError> {
    let tenant = require_tenant(state, project_id).await?;

    let now = Utc::now();
    let start = month_start(now)?;
    let region = state.region();

    info!(
        project_id = %tenant.id,
        project_name = %tenant.name,
        start = %start,
        end = %now,
        region = region.unwrap_or("-"),
        "Computing quotation"
    );

    let cost = build_range_cost(state, &tenant, start, now, detailed).await?;

    let mut quotations = BTreeMap::new();
    quotations.insert(now.date_naive().to_string(), cost);

    Ok(QuotationsOutput {
        start: start.format(TIMESTAMP_FORMAT).to_string(),
        end: now.format(TIMESTAMP_FORMAT).to_string(),
        project_id: tenant.id,
        project_name: tenant.name,
        quotations,
    })
}

/// Finalized cost per closed month wholly inside `[start, end]`, keyed by
/// each month's last day. Deterministic over unchanged usage and rates.
pub async fn get_invoices(
    state: &AppState,
    project_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    detailed: bool,
) -> Result<InvoicesOutput, AppError> {
    let tenant = require_tenant(state, project_id).await?;

    let mut invoices = BTreeMap::new();
    for (month_start, month_end) in month_spans(start, end)? {
        let cost = build_range_cost(state, &tenant, month_start, month_end, detailed).await?;
        let label = (month_end - Duration::days(1)).date_naive().to_string();
        invoices.insert(label, cost);
    }

    Ok(InvoicesOutput {
        start: start.format(TIMESTAMP_FORMAT).to_string(),
        end: end.format(TIMESTAMP_FORMAT).to_string(),
        project_id: tenant.id,
        project_name: tenant.name,
        invoices,
    })
}

async fn require_tenant(state: &AppState, project_id: &str) -> Result<Tenant, AppError> {
    state
        .store
        .get_tenant(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("project '{}' not found", project_id)))
}

async fn fetch_resources(
    state: &AppState,
    tenant_id: &str,
    rows: &[UsageRow],
) -> Result<HashMap<String, serde_json::Value>, AppError> {
    let mut ids: Vec<String> = rows.iter().map(|r| r.resource_id.clone()).collect();
    ids.sort();
    ids.dedup();
    state.store.get_resources(tenant_id, &ids).await
}

async fn build_range_cost(
    state: &AppState,
    tenant: &Tenant,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    detailed: bool,
) -> Result<CostBreakdown, AppError> {
    let rows = state.store.usage(&tenant.id, start, end).await?;
    let resources = fetch_resources(state, &tenant.id, &rows).await?;
    state
        .builder
        .build(&rows, &resources, state.rater.as_ref(), state.region(), detailed)
        .await
}

fn month_start(at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::InternalError(anyhow!("invalid month start for {}", at)))
}

fn next_month(at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::InternalError(anyhow!("invalid month boundary after {}", at)))
}

/// Calendar months lying wholly inside `[start, end]`.
fn month_spans(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, AppError> {
    let first = month_start(start)?;
    let mut cursor = if first == start { first } else { next_month(start)? };

    let mut spans = Vec::new();
    loop {
        let month_end = next_month(cursor)?;
        if month_end > end {
            break;
        }
        spans.push((cursor, month_end));
        cursor = month_end;
    }
    Ok(spans)
}
