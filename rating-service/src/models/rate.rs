//! Price catalog models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One priced product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub resource: String,
    pub unit: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Live price catalog shape: region -> category -> products.
pub type PriceCatalog = BTreeMap<String, BTreeMap<String, Vec<Product>>>;

/// Result of a rate lookup: the price per billing unit, and the unit the
/// price is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate: Decimal,
    pub unit: String,
}
