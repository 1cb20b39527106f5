//! Service configuration, loaded from environment variables on top of the
//! shared `service_core` config.

use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct RatingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub collector: CollectorConfig,
    pub rater: RaterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub periodic_interval_secs: u64,
    pub window_minutes: i64,
    pub max_windows_per_cycle: usize,
    /// Checkpoint age beyond which a tenant counts as stale on `/health`.
    pub stale_after_secs: u64,
    pub metering_url: Option<String>,
    pub metadata_file: Option<String>,
    pub ignore_tenants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RaterConfig {
    pub backend: RaterBackend,
    pub rate_file: String,
    pub erp_url: Option<String>,
    pub region: Option<String>,
    pub catalog_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RaterBackend {
    Erp,
    File,
}

impl RatingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let config = RatingConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("rating-service"))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage: StorageConfig {
                backend: get_env("STORAGE_BACKEND", Some("postgres"))?.parse()?,
                database: DatabaseConfig {
                    url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                    max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                    min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
                },
            },
            collector: CollectorConfig {
                enabled: parse_env("COLLECTOR_ENABLED", "false")?,
                periodic_interval_secs: parse_env("COLLECTOR_INTERVAL_SECONDS", "3600")?,
                window_minutes: parse_env("COLLECTOR_WINDOW_MINUTES", "60")?,
                max_windows_per_cycle: parse_env("COLLECTOR_MAX_WINDOWS", "48")?,
                stale_after_secs: parse_env("COLLECTOR_STALE_SECONDS", "7200")?,
                metering_url: env::var("METERING_URL").ok().filter(|s| !s.is_empty()),
                metadata_file: env::var("METADATA_FILE").ok().filter(|s| !s.is_empty()),
                ignore_tenants: get_env("IGNORE_TENANTS", Some(""))?
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            },
            rater: RaterConfig {
                backend: get_env("RATER_BACKEND", Some("file"))?.parse()?,
                rate_file: get_env("RATE_FILE", Some("rates.csv"))?,
                erp_url: env::var("ERP_URL").ok().filter(|s| !s.is_empty()),
                region: env::var("REGION").ok().filter(|s| !s.is_empty()),
                catalog_ttl_secs: parse_env("CATALOG_TTL_SECONDS", "3600")?,
                request_timeout_secs: parse_env("ERP_TIMEOUT_SECONDS", "10")?,
                max_retries: parse_env("ERP_MAX_RETRIES", "3")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.storage.backend == StorageBackend::Postgres && self.storage.database.url.is_none()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_URL is required when STORAGE_BACKEND is postgres"
            )));
        }

        if self.rater.backend == RaterBackend::Erp {
            if self.rater.erp_url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ERP_URL is required when RATER_BACKEND is erp"
                )));
            }
            if self.rater.region.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "REGION is required when RATER_BACKEND is erp"
                )));
            }
        }

        if self.collector.enabled {
            if self.collector.metering_url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "METERING_URL is required when the collector is enabled"
                )));
            }
            if self.collector.window_minutes <= 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "COLLECTOR_WINDOW_MINUTES must be positive"
                )));
            }
        }

        Ok(())
    }
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "unknown storage backend '{}', expected 'postgres' or 'memory'",
                other
            ))),
        }
    }
}

impl FromStr for RaterBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "erp" => Ok(RaterBackend::Erp),
            "file" => Ok(RaterBackend::File),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "unknown rater backend '{}', expected 'erp' or 'file'",
                other
            ))),
        }
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default))?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("invalid {}: {}", key, e)))
}
