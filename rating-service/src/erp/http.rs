//! HTTP JSON driver for the ERP pricing bridge.

use crate::erp::{ErpDriver, ErpError};
use crate::models::PriceCatalog;
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use std::time::Duration;
use tracing::warn;

/// Talks to the ERP bridge over HTTP with a bounded per-call timeout and a
/// bounded retry on transport failures, so a stuck ERP cannot stall a whole
/// collection or rating cycle.
pub struct HttpErpDriver {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl HttpErpDriver {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow!("failed to build ERP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ErpError> {
        let mut attempt = 0u32;
        loop {
            match self.try_get(url).await {
                Ok(value) => return Ok(value),
                // Decode failures are not transient; retrying cannot help.
                Err(e @ ErpError::Decode(_)) => return Err(e),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                    warn!(
                        url = url,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "ERP request failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ErpError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ErpError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ErpError::Transport(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| ErpError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ErpDriver for HttpErpDriver {
    async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn get_products(&self, regions: &[String]) -> Result<PriceCatalog, ErpError> {
        #[derive(Deserialize)]
        struct ProductsResponse {
            products: PriceCatalog,
        }

        let mut url = format!("{}/v1/products", self.base_url);
        if !regions.is_empty() {
            url.push_str("?regions=");
            url.push_str(&regions.join(","));
        }

        let response: ProductsResponse = self.get_json(&url).await?;
        Ok(response.products)
    }
}
