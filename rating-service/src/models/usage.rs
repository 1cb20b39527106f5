//! Usage entry models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One usage observation for a resource/service over a collection window.
/// Append-only once committed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub resource_id: String,
    pub service: String,
    pub unit: String,
    pub volume: Decimal,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

/// Input for committing a usage entry.
#[derive(Debug, Clone)]
pub struct NewUsageEntry {
    pub resource_id: String,
    pub service: String,
    pub unit: String,
    pub volume: Decimal,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

/// Aggregated usage: volumes summed per (tenant, resource, service, unit).
/// Entries with different units are never collapsed into one row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRow {
    pub tenant_id: String,
    pub resource_id: String,
    pub service: String,
    pub unit: String,
    pub volume: Decimal,
}
