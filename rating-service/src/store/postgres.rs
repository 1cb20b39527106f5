//! PostgreSQL store for rating-service.

use crate::models::{NewUsageEntry, Project, ResourceRecord, Tenant, UsageRow};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "rating-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, project), fields(tenant_id = %project.id))]
    async fn ensure_tenant(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Tenant, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_tenant"])
            .start_timer();

        let info = serde_json::json!({ "description": project.description });
        // The no-op name update makes RETURNING yield the existing row
        // without ever touching last_collected.
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, info, created_utc, last_collected)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, info, created_utc, last_collected
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&info)
        .bind(now)
        .bind(now - Duration::hours(1))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to ensure tenant: {}", e)))?;

        timer.observe_duration();
        Ok(tenant)
    }

    #[instrument(skip(self))]
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tenant"])
            .start_timer();

        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, info, created_utc, last_collected FROM tenants WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch tenant: {}", e)))?;

        timer.observe_duration();
        Ok(tenant)
    }

    #[instrument(skip(self))]
    async fn stale_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["stale_tenants"])
            .start_timer();

        let tenants = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, info, created_utc, last_collected
            FROM tenants
            WHERE last_collected < $1
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch stale tenants: {}", e))
        })?;

        timer.observe_duration();
        Ok(tenants)
    }

    #[instrument(skip(self))]
    async fn get_resource_info(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_resource_info"])
            .start_timer();

        let info = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT info FROM resources WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch resource: {}", e)))?;

        timer.observe_duration();
        Ok(info)
    }

    #[instrument(skip(self, resource_ids), fields(count = resource_ids.len()))]
    async fn get_resources(
        &self,
        tenant_id: &str,
        resource_ids: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, AppError> {
        if resource_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_resources"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT id, info FROM resources WHERE tenant_id = $1 AND id = ANY($2)",
        )
        .bind(tenant_id)
        .bind(resource_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch resources: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows.into_iter().collect())
    }

    #[instrument(
        skip(self, resources, entries),
        fields(tenant_id = tenant_id, entries = entries.len())
    )]
    async fn commit_window(
        &self,
        tenant_id: &str,
        window_end: DateTime<Utc>,
        resources: &[ResourceRecord],
        entries: &[NewUsageEntry],
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_window"])
            .start_timer();

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        for resource in resources {
            sqlx::query(
                r#"
                INSERT INTO resources (id, tenant_id, info, created_utc)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id, tenant_id) DO UPDATE SET info = EXCLUDED.info
                "#,
            )
            .bind(&resource.id)
            .bind(tenant_id)
            .bind(&resource.info)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to upsert resource: {}", e))
            })?;
        }

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO usage_entries
                    (id, tenant_id, resource_id, service, unit, volume, start_utc, end_utc, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT ON CONSTRAINT usage_entries_window_key
                DO UPDATE SET volume = EXCLUDED.volume, created_utc = EXCLUDED.created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&entry.resource_id)
            .bind(&entry.service)
            .bind(&entry.unit)
            .bind(entry.volume)
            .bind(entry.start_utc)
            .bind(entry.end_utc)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert usage entry: {}", e))
            })?;
        }

        // Monotonic: the checkpoint never moves backwards.
        sqlx::query("UPDATE tenants SET last_collected = $2 WHERE id = $1 AND last_collected < $2")
            .bind(tenant_id)
            .bind(window_end)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to advance checkpoint: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit window: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn usage(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["usage"])
            .start_timer();

        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT tenant_id, resource_id, service, unit, SUM(volume) AS volume
            FROM usage_entries
            WHERE tenant_id = $1 AND start_utc >= $2 AND end_utc <= $3
            GROUP BY tenant_id, resource_id, service, unit
            ORDER BY resource_id, service, unit
            "#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to aggregate usage: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows)
    }
}
