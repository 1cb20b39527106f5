//! Integration tests for the collection cycle against the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rating_service::collector::{Collector, MeteringError, MeteringSource};
use rating_service::metadata::{FieldDef, FieldDefs, MetadataDefs};
use rating_service::models::{Project, UsageSample};
use rating_service::store::{InMemoryStore, Store};
use rating_service::windows::Window;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

struct StubMetering {
    samples: Vec<UsageSample>,
    requested_windows: Mutex<Vec<Window>>,
}

impl StubMetering {
    fn new(samples: Vec<UsageSample>) -> Self {
        Self {
            samples,
            requested_windows: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MeteringSource for StubMetering {
    async fn projects(&self) -> Result<Vec<Project>, MeteringError> {
        Ok(vec![project()])
    }

    async fn usage_samples(
        &self,
        _project_id: &str,
        window: &Window,
    ) -> Result<Vec<UsageSample>, MeteringError> {
        self.requested_windows.lock().await.push(*window);
        Ok(self.samples.clone())
    }
}

struct FailingMetering;

#[async_trait]
impl MeteringSource for FailingMetering {
    async fn projects(&self) -> Result<Vec<Project>, MeteringError> {
        Ok(vec![project()])
    }

    async fn usage_samples(
        &self,
        _project_id: &str,
        _window: &Window,
    ) -> Result<Vec<UsageSample>, MeteringError> {
        Err(MeteringError::Transport("connection refused".to_string()))
    }
}

fn project() -> Project {
    Project {
        id: "p1".to_string(),
        name: "demo".to_string(),
        description: None,
    }
}

fn sample(resource_id: &str, service: &str, unit: &str, volume: &str) -> UsageSample {
    UsageSample {
        resource_id: resource_id.to_string(),
        resource_type: "Virtual Machine".to_string(),
        service: service.to_string(),
        unit: unit.to_string(),
        volume: Decimal::from_str(volume).unwrap(),
        metadata: serde_json::json!({}),
    }
}

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap()
}

fn collector(
    store: Arc<dyn Store>,
    source: Arc<dyn MeteringSource>,
    max_windows: usize,
) -> Collector {
    Collector::new(
        store,
        source,
        MetadataDefs::new(),
        Duration::hours(1),
        max_windows,
        Vec::new(),
    )
}

/// Seed a tenant whose checkpoint sits at the given hour.
async fn seed_tenant(store: &dyn Store, checkpoint: DateTime<Utc>) {
    store
        .ensure_tenant(&project(), checkpoint + Duration::hours(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn collection_commits_usage_and_advances_the_checkpoint() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(0)).await;
    let source = Arc::new(StubMetering::new(vec![sample("r1", "compute", "hour", "1")]));

    collector(store.clone(), source.clone(), 48)
        .collect_project(&project(), at(3))
        .await
        .unwrap();

    // Hourly windows in order, starting one hour behind the checkpoint
    // because this is the tenant's first pass since startup.
    let windows = source.requested_windows.lock().await.clone();
    assert_eq!(
        windows,
        vec![
            (at(0) - Duration::hours(1), at(0)),
            (at(0), at(1)),
            (at(1), at(2)),
            (at(2), at(3)),
        ]
    );

    let tenant = store.get_tenant("p1").await.unwrap().unwrap();
    assert_eq!(tenant.last_collected, at(3));

    let rows = store.usage("p1", at(0), at(3)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].volume, Decimal::from(3));
}

#[tokio::test]
async fn windows_per_cycle_are_capped() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(0)).await;
    let source = Arc::new(StubMetering::new(vec![]));

    collector(store.clone(), source.clone(), 2)
        .collect_project(&project(), at(10))
        .await
        .unwrap();

    // The cap counts the rewound hour too.
    let windows = source.requested_windows.lock().await.clone();
    assert_eq!(
        windows,
        vec![(at(0) - Duration::hours(1), at(0)), (at(0), at(1))]
    );
    let tenant = store.get_tenant("p1").await.unwrap().unwrap();
    assert_eq!(tenant.last_collected, at(1));
}

#[tokio::test]
async fn up_to_date_tenant_requests_no_windows_after_the_first_pass() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(3)).await;
    let source = Arc::new(StubMetering::new(vec![]));

    let collector = collector(store.clone(), source.clone(), 48);

    // The first pass re-fetches the hour behind the checkpoint.
    collector.collect_project(&project(), at(3)).await.unwrap();
    assert_eq!(
        source.requested_windows.lock().await.clone(),
        vec![(at(2), at(3))]
    );

    collector.collect_project(&project(), at(3)).await.unwrap();
    assert_eq!(source.requested_windows.lock().await.len(), 1);
}

#[tokio::test]
async fn restart_recollects_the_hour_behind_the_checkpoint() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(0)).await;
    let source = Arc::new(StubMetering::new(vec![sample("r1", "compute", "hour", "1")]));

    collector(store.clone(), source.clone(), 48)
        .collect_project(&project(), at(2))
        .await
        .unwrap();
    let tenant = store.get_tenant("p1").await.unwrap().unwrap();
    assert_eq!(tenant.last_collected, at(2));
    source.requested_windows.lock().await.clear();

    // A fresh collector on the same store stands in for a restarted
    // process: it must re-fetch the already-committed hour, not resume
    // from the checkpoint exactly.
    collector(store.clone(), source.clone(), 48)
        .collect_project(&project(), at(2))
        .await
        .unwrap();

    assert_eq!(
        source.requested_windows.lock().await.clone(),
        vec![(at(1), at(2))]
    );

    // The re-collected hour overwrites its earlier entries, so totals
    // are unchanged.
    let rows = store.usage("p1", at(0), at(2)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].volume, Decimal::from(2));
}

#[tokio::test]
async fn negative_volume_samples_are_dropped() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(0)).await;
    let source = Arc::new(StubMetering::new(vec![
        sample("r1", "compute", "hour", "-5"),
        sample("r2", "compute", "hour", "1"),
    ]));

    collector(store.clone(), source, 48)
        .collect_project(&project(), at(1))
        .await
        .unwrap();

    let rows = store.usage("p1", at(0), at(1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].resource_id, "r2");
}

#[tokio::test]
async fn resource_metadata_is_merged_during_ingestion() {
    let store = Arc::new(InMemoryStore::new());
    seed_tenant(store.as_ref(), at(0)).await;

    let mut fields = FieldDefs::new();
    fields.insert(
        "name".to_string(),
        FieldDef {
            sources: vec!["display_name".to_string(), "instance_name".to_string()],
            template: None,
        },
    );
    let mut defs = MetadataDefs::new();
    defs.insert("Virtual Machine".to_string(), fields);

    let mut sample = sample("r1", "compute", "hour", "1");
    sample.metadata = serde_json::json!({ "instance_name": "web-1" });
    let source = Arc::new(StubMetering::new(vec![sample]));

    Collector::new(store.clone(), source, defs, Duration::hours(1), 48, Vec::new())
        .collect_project(&project(), at(1))
        .await
        .unwrap();

    let info = store.get_resource_info("p1", "r1").await.unwrap().unwrap();
    assert_eq!(info["name"], "web-1");
    assert_eq!(info["type"], "Virtual Machine");
}

#[tokio::test]
async fn failing_tenant_increments_the_error_counter() {
    use rating_service::services::metrics::{init_metrics, ERRORS_TOTAL};

    init_metrics();
    let counter = |label: &str| {
        ERRORS_TOTAL
            .get()
            .unwrap()
            .with_label_values(&[label])
            .get()
    };
    let before = counter("collector");

    let store = Arc::new(InMemoryStore::new());
    let source = Arc::new(FailingMetering);
    collector(store.clone(), source, 48)
        .collect_once()
        .await
        .unwrap();

    assert!(counter("collector") > before);
    // The failed window never committed.
    let tenant = store.get_tenant("p1").await.unwrap().unwrap();
    assert!(store.usage("p1", tenant.last_collected - Duration::days(1), Utc::now())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn ignored_tenants_are_skipped_by_a_cycle() {
    let store = Arc::new(InMemoryStore::new());
    let source = Arc::new(StubMetering::new(vec![sample("r1", "compute", "hour", "1")]));

    let collector = Collector::new(
        store.clone(),
        source.clone(),
        MetadataDefs::new(),
        Duration::hours(1),
        48,
        vec!["demo".to_string()],
    );
    collector.collect_once().await.unwrap();

    assert!(source.requested_windows.lock().await.is_empty());
    assert!(store.get_tenant("p1").await.unwrap().is_none());
}
