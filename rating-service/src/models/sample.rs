//! Shapes supplied by the external metering source.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A cloud project as reported by the metering source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One raw usage sample for a (tenant, window) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSample {
    pub resource_id: String,
    pub resource_type: String,
    pub service: String,
    pub unit: String,
    pub volume: Decimal,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
