//! Resource model.

/// A billable entity (instance, volume, router, ...) owned by a tenant,
/// as written during a window commit. `info` is merged metadata; it always
/// carries a `type` field seeded when the resource is first observed.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: String,
    pub info: serde_json::Value,
}
