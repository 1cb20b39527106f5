//! In-memory store backend.
//!
//! Same contract as the Postgres store, held in process memory. Used by the
//! test harness and selectable as a storage backend for throwaway
//! deployments where durability does not matter.

use crate::models::{NewUsageEntry, Project, ResourceRecord, Tenant, UsageEntry, UsageRow};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Uniqueness key for usage entries, mirroring the Postgres constraint.
type EntryKey = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<String, Tenant>,
    resources: BTreeMap<(String, String), serde_json::Value>,
    entries: BTreeMap<EntryKey, UsageEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn ensure_tenant(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Tenant, AppError> {
        let mut inner = self.inner.write().await;
        let tenant = inner
            .tenants
            .entry(project.id.clone())
            .or_insert_with(|| Tenant {
                id: project.id.clone(),
                name: project.name.clone(),
                info: serde_json::json!({ "description": project.description }),
                created_utc: now,
                last_collected: now - Duration::hours(1),
            });
        tenant.name = project.name.clone();
        Ok(tenant.clone())
    }

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.get(tenant_id).cloned())
    }

    async fn stale_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .values()
            .filter(|t| t.last_collected < cutoff)
            .cloned()
            .collect())
    }

    async fn get_resource_info(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .resources
            .get(&(tenant_id.to_string(), resource_id.to_string()))
            .cloned())
    }

    async fn get_resources(
        &self,
        tenant_id: &str,
        resource_ids: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, AppError> {
        let inner = self.inner.read().await;
        Ok(resource_ids
            .iter()
            .filter_map(|id| {
                inner
                    .resources
                    .get(&(tenant_id.to_string(), id.clone()))
                    .map(|info| (id.clone(), info.clone()))
            })
            .collect())
    }

    async fn commit_window(
        &self,
        tenant_id: &str,
        window_end: DateTime<Utc>,
        resources: &[ResourceRecord],
        entries: &[NewUsageEntry],
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        for resource in resources {
            inner
                .resources
                .insert((tenant_id.to_string(), resource.id.clone()), resource.info.clone());
        }

        for entry in entries {
            let key: EntryKey = (
                tenant_id.to_string(),
                entry.resource_id.clone(),
                entry.service.clone(),
                entry.unit.clone(),
                entry.start_utc,
                entry.end_utc,
            );
            inner.entries.insert(
                key,
                UsageEntry {
                    id: Uuid::new_v4(),
                    tenant_id: tenant_id.to_string(),
                    resource_id: entry.resource_id.clone(),
                    service: entry.service.clone(),
                    unit: entry.unit.clone(),
                    volume: entry.volume,
                    start_utc: entry.start_utc,
                    end_utc: entry.end_utc,
                    created_utc: now,
                },
            );
        }

        if let Some(tenant) = inner.tenants.get_mut(tenant_id) {
            if tenant.last_collected < window_end {
                tenant.last_collected = window_end;
            }
        }

        Ok(())
    }

    async fn usage(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRow>, AppError> {
        let inner = self.inner.read().await;
        let mut grouped: BTreeMap<(String, String, String), Decimal> = BTreeMap::new();

        for entry in inner.entries.values() {
            if entry.tenant_id != tenant_id || entry.start_utc < start || entry.end_utc > end {
                continue;
            }
            let key = (
                entry.resource_id.clone(),
                entry.service.clone(),
                entry.unit.clone(),
            );
            *grouped.entry(key).or_insert(Decimal::ZERO) += entry.volume;
        }

        Ok(grouped
            .into_iter()
            .map(|((resource_id, service, unit), volume)| UsageRow {
                tenant_id: tenant_id.to_string(),
                resource_id,
                service,
                unit,
                volume,
            })
            .collect())
    }
}
