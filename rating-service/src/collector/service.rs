//! The periodic collection cycle.

use crate::collector::MeteringSource;
use crate::metadata::{merge_resource_metadata, MetadataDefs};
use crate::models::{NewUsageEntry, Project, ResourceRecord, Tenant};
use crate::services::metrics::{record_collection_cycle, record_error, record_usage_entries};
use crate::store::Store;
use crate::windows::{get_windows, Window};
use chrono::{DateTime, Duration, DurationRound, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Collects per-tenant usage on a single periodic timer. Tenants are
/// processed sequentially within a cycle; each tenant's windows are applied
/// strictly in order so the checkpoint only ever moves forward over fully
/// committed windows.
pub struct Collector {
    store: Arc<dyn Store>,
    source: Arc<dyn MeteringSource>,
    defs: MetadataDefs,
    window_size: Duration,
    max_windows: usize,
    ignore_tenants: Vec<String>,
    /// Tenants already collected at least once by this process. A tenant's
    /// first cycle after startup re-fetches the hour before its checkpoint,
    /// picking up samples that landed after the previous process committed.
    seen: Mutex<HashSet<String>>,
}

impl Collector {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn MeteringSource>,
        defs: MetadataDefs,
        window_size: Duration,
        max_windows: usize,
        ignore_tenants: Vec<String>,
    ) -> Self {
        Self {
            store,
            source,
            defs,
            window_size,
            max_windows,
            ignore_tenants,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Run collection cycles forever at the given period.
    pub async fn run(&self, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.collect_once().await {
                Ok(()) => record_collection_cycle("ok"),
                Err(e) => {
                    record_collection_cycle("error");
                    record_error("collector");
                    error!(error = %e, "Collection cycle failed");
                }
            }
        }
    }

    /// One collection cycle over every discovered project. A failing tenant
    /// is logged and skipped; its checkpoint stays put so the same windows
    /// are retried next cycle (at-least-once collection).
    pub async fn collect_once(&self) -> Result<(), AppError> {
        info!("Begin usage collection cycle");

        let projects = self
            .source
            .projects()
            .await
            .map_err(|e| AppError::BadGateway(e.to_string()))?;

        // Windows never extend into the hour still in flight.
        let end = Utc::now()
            .duration_trunc(Duration::hours(1))
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        for project in projects {
            if self.ignore_tenants.contains(&project.name) {
                debug!(project = %project.id, "Skipping ignored tenant");
                continue;
            }

            if let Err(e) = self.collect_project(&project, end).await {
                record_error("collector");
                error!(
                    project = %project.id,
                    error = %e,
                    "Usage collection failed for tenant, will retry next cycle"
                );
            }
        }

        info!("Usage collection cycle finished");
        Ok(())
    }

    /// Collect one project's outstanding windows up to `end`, in order.
    /// The first cycle for a tenant after process start rewinds one hour
    /// behind its checkpoint; the idempotent window commit absorbs the
    /// re-collected hour.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub async fn collect_project(
        &self,
        project: &Project,
        end: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let tenant = self.store.ensure_tenant(project, Utc::now()).await?;

        let first_cycle = !self.seen.lock().await.contains(&tenant.id);
        let start = if first_cycle {
            tenant.last_collected - Duration::hours(1)
        } else {
            tenant.last_collected
        };
        let windows = get_windows(start, end, self.window_size, self.max_windows);

        if windows.is_empty() {
            debug!(last_collected = %tenant.last_collected, "Tenant is up to date");
            return Ok(());
        }

        // Stop at the first failing window: later windows must not commit
        // (and advance the checkpoint) past an uncollected one.
        for window in &windows {
            self.collect_window(&tenant, window).await?;
        }

        // Marked only after a fully successful pass, so a failed first
        // cycle keeps the rewind for the retry.
        self.seen.lock().await.insert(tenant.id);

        Ok(())
    }

    async fn collect_window(&self, tenant: &Tenant, window: &Window) -> Result<(), AppError> {
        let samples = self
            .source
            .usage_samples(&tenant.id, window)
            .await
            .map_err(|e| AppError::BadGateway(e.to_string()))?;

        let mut resources: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        let mut entries: Vec<NewUsageEntry> = Vec::new();

        for sample in samples {
            if sample.volume < Decimal::ZERO {
                warn!(
                    resource = %sample.resource_id,
                    service = %sample.service,
                    volume = %sample.volume,
                    "Dropping negative-volume sample"
                );
                continue;
            }

            if !resources.contains_key(&sample.resource_id) {
                let info = self
                    .store
                    .get_resource_info(&tenant.id, &sample.resource_id)
                    .await?;
                let mut map = match info {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                // The type field is seeded on first observation and kept.
                map.entry("type".to_string())
                    .or_insert_with(|| Value::String(sample.resource_type.clone()));
                resources.insert(sample.resource_id.clone(), map);
            }

            if let Some(info) = resources.get_mut(&sample.resource_id) {
                if let Some(defs) = self.defs.get(&sample.resource_type) {
                    merge_resource_metadata(info, &sample.metadata, defs);
                }
            }

            entries.push(NewUsageEntry {
                resource_id: sample.resource_id,
                service: sample.service,
                unit: sample.unit,
                volume: sample.volume,
                start_utc: window.0,
                end_utc: window.1,
            });
        }

        let resource_records: Vec<ResourceRecord> = resources
            .into_iter()
            .map(|(id, info)| ResourceRecord {
                id,
                info: Value::Object(info),
            })
            .collect();

        record_usage_entries(&tenant.id, entries.len() as u64);
        self.store
            .commit_window(&tenant.id, window.1, &resource_records, &entries)
            .await
    }
}
