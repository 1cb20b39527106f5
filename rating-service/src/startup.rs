//! Application startup and lifecycle management.

use crate::api::v2_router;
use crate::collector::{Collector, HttpMeteringSource};
use crate::config::{RaterBackend, RatingConfig, StorageBackend};
use crate::erp::{ErpDriver, HttpErpDriver};
use crate::metadata::{self, MetadataDefs};
use crate::rater::{CatalogRateSource, FileRateSource, RateSource};
use crate::services::{get_metrics, init_metrics, CostBuilder};
use crate::store::{Database, InMemoryStore, Store};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RatingConfig,
    pub store: Arc<dyn Store>,
    pub rater: Arc<dyn RateSource>,
    pub erp: Option<Arc<dyn ErpDriver>>,
    pub builder: Arc<CostBuilder>,
}

impl AppState {
    /// Configured pricing region, if any.
    pub fn region(&self) -> Option<&str> {
        self.config.rater.region.as_deref()
    }
}

/// Health check endpoint for Docker/K8s liveness probes. Beyond store
/// reachability it summarizes collection health (tenants whose checkpoint
/// is older than the configured staleness threshold, minus the ignore
/// list) and the ERP back end's reachability. Neither degrades the status
/// code: the service keeps serving reports from already-collected usage
/// and file rates while those lag.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.health_check().await {
        tracing::warn!(error = %e, "Health check failed - store unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "rating-service",
                "error": e.to_string()
            })),
        );
    }

    let cutoff =
        chrono::Utc::now() - chrono::Duration::seconds(state.config.collector.stale_after_secs as i64);
    let stale_tenants: Vec<String> = match state.store.stale_tenants(cutoff).await {
        Ok(tenants) => tenants
            .into_iter()
            .map(|t| t.name)
            .filter(|name| !state.config.collector.ignore_tenants.contains(name))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "rating-service",
                    "error": e.to_string()
                })),
            );
        }
    };

    let collection_status = if stale_tenants.is_empty() { "ok" } else { "stale" };
    let erp = match &state.erp {
        Some(erp) if erp.is_healthy().await => "ok",
        Some(_) => "unreachable",
        None => "disabled",
    };

    if collection_status != "ok" {
        tracing::warn!(
            stale_tenants = stale_tenants.len(),
            "Usage collection is lagging"
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "rating-service",
            "version": env!("CARGO_PKG_VERSION"),
            "erp": erp,
            "collection": {
                "status": collection_status,
                "stale_tenants": stale_tenants
            }
        })),
    )
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    collector: Option<Arc<Collector>>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RatingConfig) -> Result<Self, AppError> {
        init_metrics();

        let store = build_store(&config).await?;
        let (rater, erp) = build_rater(&config)?;
        let collector = build_collector(&config, store.clone())?;

        let state = AppState {
            config: config.clone(),
            store,
            rater,
            erp,
            builder: Arc::new(CostBuilder::new()),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Rating service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            collector,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a clone of the shared state.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        if let Some(collector) = self.collector {
            let period = Duration::from_secs(self.state.config.collector.periodic_interval_secs);
            tokio::spawn(async move {
                collector.run(period).await;
            });
        }

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .merge(v2_router())
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(port = self.port, "Starting HTTP server");
        axum::serve(self.listener, router).await
    }
}

async fn build_store(config: &RatingConfig) -> Result<Arc<dyn Store>, AppError> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config.storage.database.url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("postgres backend requires DATABASE_URL"))
            })?;
            let db = Database::new(
                url,
                config.storage.database.max_connections,
                config.storage.database.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                e
            })?;
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
            Ok(Arc::new(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store, data will not survive restarts");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Build the rate source, and the ERP driver when one is configured. The
/// file catalog is always loaded: with the ERP backend it serves as the
/// fallback when the catalog is unavailable.
fn build_rater(
    config: &RatingConfig,
) -> Result<(Arc<dyn RateSource>, Option<Arc<dyn ErpDriver>>), AppError> {
    let file = FileRateSource::load(&config.rater.rate_file)?;

    match config.rater.backend {
        RaterBackend::File => Ok((Arc::new(file), None)),
        RaterBackend::Erp => {
            let url = config.rater.erp_url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("erp backend requires ERP_URL"))
            })?;
            let driver: Arc<dyn ErpDriver> = Arc::new(HttpErpDriver::new(
                url,
                Duration::from_secs(config.rater.request_timeout_secs),
                config.rater.max_retries,
            )?);
            let rater = CatalogRateSource::new(
                driver.clone(),
                file,
                Duration::from_secs(config.rater.catalog_ttl_secs),
            );
            Ok((Arc::new(rater), Some(driver)))
        }
    }
}

fn build_collector(
    config: &RatingConfig,
    store: Arc<dyn Store>,
) -> Result<Option<Arc<Collector>>, AppError> {
    if !config.collector.enabled {
        return Ok(None);
    }

    let url = config.collector.metering_url.as_deref().ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("collector requires METERING_URL"))
    })?;
    let source = HttpMeteringSource::new(
        url,
        Duration::from_secs(config.rater.request_timeout_secs),
        config.rater.max_retries,
    )?;

    let defs: MetadataDefs = match config.collector.metadata_file.as_deref() {
        Some(path) => metadata::load_defs(path)?,
        None => MetadataDefs::new(),
    };

    Ok(Some(Arc::new(Collector::new(
        store,
        Arc::new(source),
        defs,
        chrono::Duration::minutes(config.collector.window_minutes),
        config.collector.max_windows_per_cycle,
        config.collector.ignore_tenants.clone(),
    ))))
}
