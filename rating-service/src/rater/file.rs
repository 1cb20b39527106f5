//! Static file-based rate catalog.

use crate::models::ResolvedRate;
use crate::rater::{RateError, RateSource};
use crate::services::metrics::record_rate_lookup;
use anyhow::anyhow;
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

/// Rates loaded once from a pipe-delimited file with rows of
/// `region|resource_name|unit|rate`. Lookup is by resource name only; the
/// region column is informational. Load failures are fatal: the rating
/// subsystem cannot serve without its fallback catalog.
pub struct FileRateSource {
    rates: HashMap<String, ResolvedRate>,
}

impl FileRateSource {
    pub fn load(path: &str) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::ConfigError(anyhow!("failed to read rate file '{}': {}", path, e)))?;

        let mut rates = HashMap::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != 4 {
                return Err(AppError::ConfigError(anyhow!(
                    "malformed row {} in rate file '{}': expected region|resource_name|unit|rate",
                    index + 1,
                    path
                )));
            }

            let rate = Decimal::from_str(fields[3].trim()).map_err(|e| {
                AppError::ConfigError(anyhow!(
                    "malformed rate on row {} in rate file '{}': {}",
                    index + 1,
                    path,
                    e
                ))
            })?;

            rates.insert(
                fields[1].trim().to_string(),
                ResolvedRate {
                    rate,
                    unit: fields[2].trim().to_string(),
                },
            );
        }

        info!(path = path, rates = rates.len(), "Loaded static rate catalog");
        Ok(Self { rates })
    }
}

#[async_trait]
impl RateSource for FileRateSource {
    async fn rate(
        &self,
        resource_name: &str,
        _region: Option<&str>,
    ) -> Result<ResolvedRate, RateError> {
        match self.rates.get(resource_name) {
            Some(rate) => {
                record_rate_lookup("file", "hit");
                Ok(rate.clone())
            }
            None => {
                record_rate_lookup("file", "miss");
                Err(RateError::NotFound(resource_name.to_string()))
            }
        }
    }
}
