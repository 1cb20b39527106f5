//! Test helper module for rating-service integration tests.
//!
//! Spawns the full HTTP application on a random port, backed by the
//! in-memory store and a temporary rate file.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rating_service::config::{
    CollectorConfig, DatabaseConfig, RaterBackend, RaterConfig, RatingConfig, StorageBackend,
    StorageConfig,
};
use rating_service::models::{NewUsageEntry, Project, ResourceRecord};
use rating_service::startup::{AppState, Application};
use rust_decimal::Decimal;
use service_core::config as core_config;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const RATE_FILE_CONTENTS: &str = "\
nz-1|compute|hour|0.5
nz-1|storage|gigabyte|0.1
";

/// Test application with a running HTTP server.
pub struct TestApp {
    pub port: u16,
    pub state: AppState,
    pub client: reqwest::Client,
    _rate_file: NamedTempFile,
}

impl TestApp {
    /// Spawn the application on a random port with the in-memory store.
    pub async fn spawn() -> Self {
        let mut rate_file = NamedTempFile::new().expect("Failed to create rate file");
        rate_file
            .write_all(RATE_FILE_CONTENTS.as_bytes())
            .expect("Failed to write rate file");

        let config = test_config(
            rate_file
                .path()
                .to_str()
                .expect("rate file path is not utf-8"),
        );

        let app = Application::build(config)
            .await
            .expect("Failed to build application");
        let port = app.port();
        let state = app.state();

        tokio::spawn(async move {
            let _ = app.run_until_stopped().await;
        });

        let client = reqwest::Client::new();
        let app = TestApp {
            port,
            state,
            client,
            _rate_file: rate_file,
        };
        app.wait_until_healthy().await;
        app
    }

    async fn wait_until_healthy(&self) {
        for _ in 0..50 {
            if let Ok(response) = self.client.get(self.url("/health")).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Server did not become healthy");
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path_and_query)
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client
            .get(self.url(path_and_query))
            .send()
            .await
            .expect("Request failed")
    }

    /// Register a project with the store.
    pub async fn seed_project(&self, id: &str, name: &str) {
        self.seed_project_at(id, name, Utc::now()).await;
    }

    /// Register a project whose checkpoint is seeded one hour before `now`.
    pub async fn seed_project_at(&self, id: &str, name: &str, now: DateTime<Utc>) {
        let project = Project {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
        };
        self.state
            .store
            .ensure_tenant(&project, now)
            .await
            .expect("Failed to seed project");
    }

    /// Commit one usage entry for a window, creating the resource with a
    /// display name derived from its id.
    pub async fn seed_usage(
        &self,
        tenant_id: &str,
        resource_id: &str,
        service: &str,
        unit: &str,
        volume: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        let resource = ResourceRecord {
            id: resource_id.to_string(),
            info: serde_json::json!({
                "name": format!("{}-name", resource_id),
                "type": "Virtual Machine",
            }),
        };
        let entry = NewUsageEntry {
            resource_id: resource_id.to_string(),
            service: service.to_string(),
            unit: unit.to_string(),
            volume: Decimal::from_str(volume).expect("bad test volume"),
            start_utc: start,
            end_utc: end,
        };
        self.state
            .store
            .commit_window(tenant_id, end, &[resource], &[entry])
            .await
            .expect("Failed to seed usage");
    }
}

fn test_config(rate_file: &str) -> RatingConfig {
    RatingConfig {
        common: core_config::Config { port: 0 },
        service_name: "rating-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            database: DatabaseConfig {
                url: None,
                max_connections: 2,
                min_connections: 1,
            },
        },
        collector: CollectorConfig {
            enabled: false,
            periodic_interval_secs: 3600,
            window_minutes: 60,
            max_windows_per_cycle: 48,
            stale_after_secs: 7200,
            metering_url: None,
            metadata_file: None,
            ignore_tenants: vec!["ignored".to_string()],
        },
        rater: RaterConfig {
            backend: RaterBackend::File,
            rate_file: rate_file.to_string(),
            erp_url: None,
            region: None,
            catalog_ttl_secs: 3600,
            request_timeout_secs: 2,
            max_retries: 1,
        },
    }
}
