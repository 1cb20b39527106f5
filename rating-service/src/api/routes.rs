//! The v2 HTTP endpoints.

use crate::api::params::{resolve_project_id, resolve_range, ProductParams, ReportParams};
use crate::models::PriceCatalog;
use crate::services::reports;
use crate::startup::AppState;
use anyhow::anyhow;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use tracing::instrument;

pub fn v2_router() -> Router<AppState> {
    Router::new()
        .route("/v2/products", get(get_products))
        .route("/v2/measurements", get(get_measurements))
        .route("/v2/costs", get(get_costs))
        .route("/v2/quotations", get(get_quotations))
        .route("/v2/invoices", get(get_invoices))
}

/// Current price catalog, optionally filtered to a set of regions. Only
/// served when a live pricing back end is configured.
#[instrument(skip(state))]
async fn get_products(
    State(state): State<AppState>,
    Query(params): Query<ProductParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let erp = state.erp.as_ref().ok_or(AppError::ServiceUnavailable)?;

    let catalog = erp
        .get_products(&[])
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    let catalog = match params.regions.as_deref() {
        Some(raw) => filter_regions(catalog, raw)?,
        None => catalog,
    };

    Ok(Json(json!({ "products": catalog })))
}

fn filter_regions(catalog: PriceCatalog, raw: &str) -> Result<PriceCatalog, AppError> {
    let requested: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for region in &requested {
        if !catalog.contains_key(*region) {
            let available: Vec<&String> = catalog.keys().collect();
            return Err(AppError::NotFound(anyhow!(
                "unknown region '{}', available regions: {:?}",
                region,
                available
            )));
        }
    }

    Ok(catalog
        .into_iter()
        .filter(|(region, _)| requested.contains(&region.as_str()))
        .collect())
}

/// Aggregated raw usage for one project over a range; no pricing.
#[instrument(skip(state))]
async fn get_measurements(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = resolve_project_id(&params)?;
    let (start, end) = resolve_range(&params)?;
    let out = reports::get_usage(&state, project_id, start, end).await?;
    Ok(Json(json!({ "measurements": out })))
}

/// Rated usage for one project over a range.
#[instrument(skip(state))]
async fn get_costs(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = resolve_project_id(&params)?;
    let (start, end) = resolve_range(&params)?;
    let detailed = params.detailed.unwrap_or(false);
    let out = reports::get_costs(&state, project_id, start, end, detailed).await?;
    Ok(Json(json!({ "costs": out })))
}

/// Running cost estimate for the current partial month. Takes no range:
/// the window is always first-of-month through now.
#[instrument(skip(state))]
async fn get_quotations(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = resolve_project_id(&params)?;
    let detailed = params.detailed.unwrap_or(false);
    let out = reports::get_quotations(&state, project_id, detailed).await?;
    Ok(Json(json!({ "quotations": out })))
}

/// Finalized per-month costs over a closed historical range.
#[instrument(skip(state))]
async fn get_invoices(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = resolve_project_id(&params)?;
    let (start, end) = resolve_range(&params)?;
    let detailed = params.detailed.unwrap_or(false);
    let out = reports::get_invoices(&state, project_id, start, end, detailed).await?;
    Ok(Json(json!({ "invoices": out })))
}
