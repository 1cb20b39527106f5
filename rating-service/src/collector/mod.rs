//! Usage collection from the external metering source.

mod http;
mod service;

pub use http::HttpMeteringSource;
pub use service::Collector;

use crate::models::{Project, UsageSample};
use crate::windows::Window;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeteringError {
    #[error("metering transport error: {0}")]
    Transport(String),

    #[error("metering response decode error: {0}")]
    Decode(String),
}

/// The metering back end the collector pulls from: project discovery plus
/// per-window usage samples.
#[async_trait]
pub trait MeteringSource: Send + Sync {
    async fn projects(&self) -> Result<Vec<Project>, MeteringError>;

    async fn usage_samples(
        &self,
        project_id: &str,
        window: &Window,
    ) -> Result<Vec<UsageSample>, MeteringError>;
}
