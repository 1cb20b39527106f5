//! HTTP API for rating-service.

pub mod params;
pub mod routes;

pub use routes::v2_router;
