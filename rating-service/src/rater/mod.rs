//! Rate resolution: mapping a (resource name, region) pair to a price and
//! billing unit. The catalog source consults the live ERP price catalog with
//! a deterministic fallback to the static file catalog; the file source can
//! also serve as the only rater for deployments without an ERP.

mod catalog;
mod file;

pub use catalog::CatalogRateSource;
pub use file::FileRateSource;

use crate::models::ResolvedRate;
use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// The resource name matched nothing in any catalog. A configuration
    /// gap, not a transient condition; never retried.
    #[error("no rate found for resource '{0}'")]
    NotFound(String),

    /// The catalog path refuses to guess a region; callers must say which
    /// region's price list applies.
    #[error("region is required for price catalog lookup")]
    RegionRequired,
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// A source of rates. Lookups are by exact resource name; the region
/// selects the price list on catalog-backed sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn rate(&self, resource_name: &str, region: Option<&str>)
        -> Result<ResolvedRate, RateError>;
}
