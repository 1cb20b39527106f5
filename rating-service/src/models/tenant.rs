//! Tenant model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Billing subject, one per cloud project. `last_collected` is the
/// incremental-collection checkpoint and only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub info: serde_json::Value,
    pub created_utc: DateTime<Utc>,
    pub last_collected: DateTime<Utc>,
}
