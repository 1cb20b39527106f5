//! ERP-backed rate source with file fallback.

use crate::erp::ErpDriver;
use crate::models::{PriceCatalog, ResolvedRate};
use crate::rater::{FileRateSource, RateError, RateSource};
use crate::services::metrics::{record_error, record_rate_lookup};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

struct CachedCatalog {
    loaded_at: Instant,
    catalog: Arc<PriceCatalog>,
}

/// Resolves rates from the live ERP price catalog, falling back to the
/// static file catalog whenever the live catalog is unavailable, empty, or
/// has no match for the resource.
///
/// The catalog is cached process-wide behind an async mutex: concurrent
/// first callers share one load, and the cache is refreshed after `ttl`.
/// A failed refresh keeps serving the previous catalog if one exists.
pub struct CatalogRateSource {
    erp: Arc<dyn ErpDriver>,
    fallback: FileRateSource,
    ttl: Duration,
    cache: Mutex<Option<CachedCatalog>>,
}

impl CatalogRateSource {
    pub fn new(erp: Arc<dyn ErpDriver>, fallback: FileRateSource, ttl: Duration) -> Self {
        Self {
            erp,
            fallback,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// The current catalog, reloading it when stale. Holding the lock across
    /// the reload gives single-flight semantics on concurrent first use.
    async fn catalog(&self) -> Option<Arc<PriceCatalog>> {
        let mut guard = self.cache.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Some(cached.catalog.clone());
            }
        }

        match self.erp.get_products(&[]).await {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                *guard = Some(CachedCatalog {
                    loaded_at: Instant::now(),
                    catalog: catalog.clone(),
                });
                Some(catalog)
            }
            Err(e) => {
                record_error("rater");
                warn!(error = %e, "Price catalog refresh failed, serving stale or fallback rates");
                guard.as_ref().map(|cached| cached.catalog.clone())
            }
        }
    }
}

#[async_trait]
impl RateSource for CatalogRateSource {
    async fn rate(
        &self,
        resource_name: &str,
        region: Option<&str>,
    ) -> Result<ResolvedRate, RateError> {
        let Some(region) = region else {
            return Err(RateError::RegionRequired);
        };

        if let Some(catalog) = self.catalog().await {
            match catalog.get(region) {
                Some(region_prices) => {
                    for products in region_prices.values() {
                        for product in products {
                            if product.resource == resource_name {
                                record_rate_lookup("catalog", "hit");
                                return Ok(ResolvedRate {
                                    rate: product.price,
                                    unit: product.unit.clone(),
                                });
                            }
                        }
                    }
                }
                None => {
                    if !catalog.is_empty() {
                        warn!(
                            region = region,
                            "Region not present in price catalog, using file rates"
                        );
                    }
                }
            }
        }

        record_rate_lookup("catalog", "fallback");
        self.fallback.rate(resource_name, Some(region)).await
    }
}
