//! Services module for rating-service.

pub mod costs;
pub mod metrics;
pub mod reports;

pub use costs::CostBuilder;
pub use metrics::{get_metrics, init_metrics};
