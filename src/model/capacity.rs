//! Capacity value parsing
//!
//! Arrays report capacities as strings: plain byte counts when queried with
//! `bytes=true`, otherwise decimal values with a binary unit suffix.

use crate::error::{Error, Result};

const KIB: f64 = 1024.0;

/// Parse a capacity string such as `"10799695265792"` or `"1.50TB"` into bytes
pub fn parse_capacity(raw: &str) -> Result<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::CapacityParse("empty value".into()));
    }

    if let Ok(bytes) = value.parse::<f64>() {
        return finite(bytes, raw);
    }

    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| Error::CapacityParse(raw.to_string()))?;
    let (number, unit) = value.split_at(split);

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => KIB,
        "MB" | "MIB" => KIB.powi(2),
        "GB" | "GIB" => KIB.powi(3),
        "TB" | "TIB" => KIB.powi(4),
        "PB" | "PIB" => KIB.powi(5),
        _ => return Err(Error::CapacityParse(raw.to_string())),
    };

    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| Error::CapacityParse(raw.to_string()))?;

    finite(number * multiplier, raw)
}

fn finite(value: f64, raw: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::CapacityParse(raw.to_string()))
    }
}
