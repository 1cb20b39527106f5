//! Unit conversion between raw metered units and billable units.
//!
//! Conversions run in exact decimal arithmetic because the results are
//! user-facing billing quantities. Only the raw-to-billable direction is
//! registered; anything else is an error.

use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A metering or billing unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    Byte,
    Gigabyte,
    Second,
    Hour,
    Count,
    Other(String),
}

impl Unit {
    pub fn as_str(&self) -> &str {
        match self {
            Unit::Byte => "byte",
            Unit::Gigabyte => "gigabyte",
            Unit::Second => "second",
            Unit::Hour => "hour",
            Unit::Count => "count",
            Unit::Other(s) => s,
        }
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        match s {
            "byte" => Unit::Byte,
            "gigabyte" => Unit::Gigabyte,
            "second" => Unit::Second,
            "hour" => Unit::Hour,
            "count" => Unit::Count,
            other => Unit::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("unable to convert from unit '{from}' to unit '{to}'")]
    Unsupported { from: String, to: String },
}

impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

type ConvertFn = fn(Decimal) -> Decimal;

/// Registry of unit conversions, owned by whoever prices usage.
/// Constructed once and shared; no module-level state.
pub struct UnitConverter {
    conversions: HashMap<(Unit, Unit), ConvertFn>,
}

impl UnitConverter {
    pub fn new() -> Self {
        let mut conversions: HashMap<(Unit, Unit), ConvertFn> = HashMap::new();
        conversions.insert((Unit::Byte, Unit::Gigabyte), to_gigabytes_from_bytes);
        conversions.insert((Unit::Second, Unit::Hour), to_hours_from_seconds);
        Self { conversions }
    }

    /// Convert `value` from `from` to `to`. Identity conversions return the
    /// value unchanged without rounding.
    pub fn convert_to(&self, value: Decimal, from: &Unit, to: &Unit) -> Result<Decimal, ConvertError> {
        if from == to {
            return Ok(value);
        }
        match self.conversions.get(&(from.clone(), to.clone())) {
            Some(convert) => Ok(convert(value)),
            None => Err(ConvertError::Unsupported {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes to gigabytes, unrounded.
fn to_gigabytes_from_bytes(value: Decimal) -> Decimal {
    value / Decimal::from(1024u32) / Decimal::from(1024u32) / Decimal::from(1024u32)
}

/// Seconds to hours, always rounded up: partial hours bill as full hours.
fn to_hours_from_seconds(value: Decimal) -> Decimal {
    (value / Decimal::from(3600u32)).ceil()
}
