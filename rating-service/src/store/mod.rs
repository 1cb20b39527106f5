//! Persistent store behind the aggregation and ingestion paths.
//!
//! A closed set of backends implements the `Store` capability: Postgres for
//! production and an in-memory variant for tests and throwaway deployments.
//! The aggregator side (`usage`, `get_resources`) is read-only and safe to
//! call concurrently with ingestion; the ingestion side commits a window's
//! entries and the checkpoint advance together, so a reader never observes
//! a half-committed window past `last_collected`.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::Database;

use crate::models::{NewUsageEntry, Project, ResourceRecord, Tenant, UsageRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Fetch an existing tenant, or create it with the checkpoint seeded to
    /// one hour before `now` so the first cycle tolerates late-arriving
    /// data. An existing tenant's checkpoint is never touched.
    async fn ensure_tenant(&self, project: &Project, now: DateTime<Utc>)
        -> Result<Tenant, AppError>;

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, AppError>;

    /// Tenants whose checkpoint has fallen behind `cutoff`. Feeds the
    /// health endpoint's collection summary.
    async fn stale_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>, AppError>;

    /// Merged metadata for one resource, if it has been observed before.
    async fn get_resource_info(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Option<serde_json::Value>, AppError>;

    /// Merged metadata for many resources at once, keyed by resource id.
    async fn get_resources(
        &self,
        tenant_id: &str,
        resource_ids: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, AppError>;

    /// Commit one collection window: upsert the touched resources, insert
    /// the window's usage entries, and advance `last_collected` to
    /// `window_end`, all in one atomic commit. Entries are keyed on
    /// (tenant, resource, service, unit, start, end) so a re-delivered
    /// window overwrites rather than double-counts.
    async fn commit_window(
        &self,
        tenant_id: &str,
        window_end: DateTime<Utc>,
        resources: &[ResourceRecord],
        entries: &[NewUsageEntry],
    ) -> Result<(), AppError>;

    /// Aggregated usage for a tenant over `[start, end]`: volumes summed
    /// per (tenant, resource, service, unit). Zero rows is a valid result.
    async fn usage(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRow>, AppError>;
}
