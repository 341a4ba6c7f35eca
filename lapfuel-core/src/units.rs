//! Type-safe wrappers for physical units
//!
//! Newtype wrappers around f64 so fuel volumes and track lengths
//! can't be mixed up with bare lap fractions.
//!
//! Unit types serialize with 4 decimal places to keep status payloads small.
//! Live deltas and persisted curves use raw f64 values and are not rounded.

use serde::{Deserialize, Serialize};

/// Round f64 to 4 decimal places for compact JSON serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Serialize liters without rounding, for values clients combine arithmetically
pub(crate) fn unrounded_liters<S: serde::Serializer>(
    val: &Liters,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_f64(val.0)
}

const KM_PER_MILE: f64 = 1.609_344;

/// Liters (fuel volume)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Liters(#[serde(serialize_with = "round4")] pub f64);

/// Kilometers (track length)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kilometers(#[serde(serialize_with = "round4")] pub f64);

impl Kilometers {
    pub fn from_miles(miles: f64) -> Self {
        Self(miles * KM_PER_MILE)
    }

    /// Parse a sim-reported length such as `"5.51 km"` or `"3.42 mi"`.
    ///
    /// A bare number is taken as kilometers.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let value: f64 = parts.next()?.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        match parts.next().map(|u| u.to_ascii_lowercase()) {
            None => Some(Self(value)),
            Some(unit) if unit == "km" => Some(Self(value)),
            Some(unit) if unit == "mi" || unit == "miles" => Some(Self::from_miles(value)),
            Some(_) => None,
        }
    }
}
