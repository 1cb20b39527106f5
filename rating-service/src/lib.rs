//! rating-service: collects per-tenant resource usage, converts raw metering
//! units into billable quantities, rates them against a price catalog, and
//! serves quotation/invoice figures over REST.

pub mod api;
pub mod collector;
pub mod config;
pub mod erp;
pub mod metadata;
pub mod models;
pub mod rater;
pub mod services;
pub mod startup;
pub mod store;
pub mod units;
pub mod windows;
