//! Cost computation: aggregated usage × resolved rates.

use crate::models::{CostBreakdown, CostItem, UsageRow};
use crate::rater::RateSource;
use crate::units::{Unit, UnitConverter};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Lines at or below this converted volume cannot be submitted to the
/// invoicing back end and are dropped before output.
pub static MIN_BILLABLE_VOLUME: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 5));

/// Prices aggregated usage rows. Owns the unit conversion registry; rates
/// come from whichever `RateSource` the caller passes in.
pub struct CostBuilder {
    converter: UnitConverter,
}

impl CostBuilder {
    pub fn new() -> Self {
        Self {
            converter: UnitConverter::new(),
        }
    }

    /// Price every usage row and aggregate into a cost breakdown.
    ///
    /// Each row's rate is resolved by its service name and the given
    /// region; when the row's unit differs from the rate's billing unit the
    /// volume is converted first. A rate or conversion failure fails the
    /// whole build: silently omitting a line would under-bill. Summation is
    /// exact decimal arithmetic, so the result does not depend on row
    /// order, and recomputing over unchanged inputs reproduces it exactly.
    pub async fn build(
        &self,
        rows: &[UsageRow],
        resources: &HashMap<String, serde_json::Value>,
        rates: &dyn RateSource,
        region: Option<&str>,
        detailed: bool,
    ) -> Result<CostBreakdown, AppError> {
        let mut breakdown: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut details: Vec<CostItem> = Vec::new();

        for row in rows {
            let resolved = rates.rate(&row.service, region).await?;

            let from = Unit::from(row.unit.as_str());
            let to = Unit::from(resolved.unit.as_str());
            let volume = self.converter.convert_to(row.volume, &from, &to)?;

            if volume <= *MIN_BILLABLE_VOLUME {
                debug!(
                    resource = %row.resource_id,
                    service = %row.service,
                    volume = %volume,
                    "Dropping sub-threshold line"
                );
                continue;
            }

            let cost = volume * resolved.rate;
            *breakdown.entry(row.service.clone()).or_insert(Decimal::ZERO) += cost;

            if detailed {
                details.push(CostItem {
                    resource_id: row.resource_id.clone(),
                    resource_name: display_name(resources.get(&row.resource_id), &row.resource_id),
                    product: row.service.clone(),
                    volume,
                    unit: resolved.unit.clone(),
                    rate: resolved.rate,
                    cost,
                });
            }
        }

        let total_cost: Decimal = breakdown.values().copied().sum();

        Ok(CostBreakdown {
            total_cost,
            breakdown,
            details: if detailed { Some(details) } else { None },
        })
    }
}

impl Default for CostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reporting name for a resource: display name, then ip address, then the
/// raw id.
fn display_name(info: Option<&serde_json::Value>, resource_id: &str) -> String {
    info.and_then(|i| i.get("name").or_else(|| i.get("ip address")))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(resource_id)
        .to_string()
}
