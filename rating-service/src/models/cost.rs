//! Cost breakdown and report output shapes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One priced line item, kept when a detailed breakdown is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostItem {
    pub resource_id: String,
    pub resource_name: String,
    pub product: String,
    pub volume: Decimal,
    pub unit: String,
    pub rate: Decimal,
    pub cost: Decimal,
}

/// Cost figure for one tenant over one range: per-service subtotals plus the
/// grand total, with optional per-resource line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total_cost: Decimal,
    pub breakdown: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<CostItem>>,
}

/// One aggregated usage row rendered for the measurements endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub resource_id: String,
    pub resource: serde_json::Value,
    pub service: String,
    pub unit: String,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementsOutput {
    pub start: String,
    pub end: String,
    pub project_id: String,
    pub project_name: String,
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostsOutput {
    pub start: String,
    pub end: String,
    pub project_id: String,
    pub project_name: String,
    pub cost: CostBreakdown,
}

/// Current-month running cost, keyed by the as-of date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotationsOutput {
    pub start: String,
    pub end: String,
    pub project_id: String,
    pub project_name: String,
    pub quotations: BTreeMap<String, CostBreakdown>,
}

/// Finalized per-month costs over a closed historical range, keyed by the
/// last day of each month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicesOutput {
    pub start: String,
    pub end: String,
    pub project_id: String,
    pub project_name: String,
    pub invoices: BTreeMap<String, CostBreakdown>,
}
