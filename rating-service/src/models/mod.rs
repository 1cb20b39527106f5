//! Domain models for rating-service.

mod cost;
mod rate;
mod resource;
mod sample;
mod tenant;
mod usage;

pub use cost::{CostBreakdown, CostItem, CostsOutput, InvoicesOutput, Measurement, MeasurementsOutput, QuotationsOutput};
pub use rate::{PriceCatalog, Product, ResolvedRate};
pub use resource::ResourceRecord;
pub use sample::{Project, UsageSample};
pub use tenant::Tenant;
pub use usage::{NewUsageEntry, UsageEntry, UsageRow};
