//! HTTP JSON metering source.

use crate::collector::{MeteringError, MeteringSource};
use crate::models::{Project, UsageSample};
use crate::windows::Window;
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use std::time::Duration;
use tracing::warn;

/// Pulls usage samples from the metering API over HTTP. Calls carry a
/// bounded timeout and bounded retry so one slow tenant cannot wedge the
/// whole collection cycle.
pub struct HttpMeteringSource {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl HttpMeteringSource {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow!("failed to build metering client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, MeteringError> {
        let mut attempt = 0u32;
        loop {
            match self.try_get(url).await {
                Ok(value) => return Ok(value),
                Err(e @ MeteringError::Decode(_)) => return Err(e),
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
                        "Metering request failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, MeteringError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MeteringError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| MeteringError::Transport(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| MeteringError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MeteringSource for HttpMeteringSource {
    async fn projects(&self) -> Result<Vec<Project>, MeteringError> {
        #[derive(Deserialize)]
        struct ProjectsResponse {
            projects: Vec<Project>,
        }

        let url = format!("{}/v1/projects", self.base_url);
        let response: ProjectsResponse = self.get_json(&url).await?;
        Ok(response.projects)
    }

    async fn usage_samples(
        &self,
        project_id: &str,
        window: &Window,
    ) -> Result<Vec<UsageSample>, MeteringError> {
        #[derive(Deserialize)]
        struct SamplesResponse {
            samples: Vec<UsageSample>,
        }

        let url = format!(
            "{}/v1/usage?project_id={}&start={}&end={}",
            self.base_url,
            project_id,
            window.0.format("%Y-%m-%dT%H:%M:%S"),
            window.1.format("%Y-%m-%dT%H:%M:%S"),
        );
        let response: SamplesResponse = self.get_json(&url).await?;
        Ok(response.samples)
    }
}
