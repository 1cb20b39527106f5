//! ERP driver: the external pricing system the rating service pulls its
//! live price catalog from. Only the contract the core needs is modeled;
//! the ERP's internals stay on its side of the boundary.

mod http;

pub use http::HttpErpDriver;

use crate::models::PriceCatalog;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErpError {
    #[error("ERP transport error: {0}")]
    Transport(String),

    #[error("ERP response decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ErpDriver: Send + Sync {
    /// Whether the ERP back end currently answers.
    async fn is_healthy(&self) -> bool;

    /// The price catalog, optionally narrowed to the given regions. An
    /// empty region list returns every region the ERP knows about.
    async fn get_products(&self, regions: &[String]) -> Result<PriceCatalog, ErpError>;
}
