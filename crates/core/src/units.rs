//! Size and duration strings.
//!
//! Sizes are `<number><unit>` with unit `B`, `KB`, `MB` or `GB` (1024-based).
//! Durations are `<number><unit>` with unit `ms`, `s`, `m`, `h` or `d`.
//! Units are case-insensitive, whitespace between number and unit is allowed,
//! and the number may carry a decimal fraction (`1.5GB`). A bare number is
//! read as bytes or milliseconds. Zero is a legal value for both.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

const SECOND_MS: u64 = 1000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Parse a size string into a byte count.
///
/// # Errors
///
/// Returns [`Error::InvalidSize`] for malformed input, unknown units or overflow.
pub fn parse_size(input: &str) -> Result<u64> {
    let (number, unit) = split_number(input).map_err(|msg| Error::invalid_size(input, msg))?;
    let multiplier = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => KIB,
        "MB" | "M" => MIB,
        "GB" | "G" => GIB,
        other => {
            return Err(Error::invalid_size(
                input,
                format!("unknown unit '{other}'"),
            ));
        }
    };
    scale(number, multiplier).ok_or_else(|| Error::invalid_size(input, "value too large"))
}

/// Parse a duration string into a [`Duration`] with millisecond resolution.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] for malformed input, unknown units or overflow.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let (number, unit) =
        split_number(input).map_err(|msg| Error::invalid_duration(input, msg))?;
    let multiplier = match unit {
        "" | "ms" => 1,
        "s" => SECOND_MS,
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        other => match other.to_ascii_lowercase().as_str() {
            "ms" => 1,
            "s" => SECOND_MS,
            "h" => HOUR_MS,
            "d" => DAY_MS,
            // "M" is deliberately not accepted as minutes
            _ => {
                return Err(Error::invalid_duration(
                    input,
                    format!("unknown unit '{other}'"),
                ));
            }
        },
    };
    scale(number, multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| Error::invalid_duration(input, "value too large"))
}

/// Render a byte count for humans, e.g. `1.5 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // display only
pub fn format_size(bytes: u64) -> String {
    if bytes < KIB {
        return format!("{bytes} B");
    }
    let (value, unit) = if bytes >= GIB {
        (bytes as f64 / GIB as f64, "GB")
    } else if bytes >= MIB {
        (bytes as f64 / MIB as f64, "MB")
    } else {
        (bytes as f64 / KIB as f64, "KB")
    };
    format!("{value:.1} {unit}")
}

/// Render a duration using its largest whole unit, e.g. `3d` or `250ms`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    for (unit_ms, suffix) in [(DAY_MS, "d"), (HOUR_MS, "h"), (MINUTE_MS, "m"), (SECOND_MS, "s")] {
        if ms >= unit_ms {
            return format!("{}{suffix}", ms / unit_ms);
        }
    }
    format!("{ms}ms")
}

/// Decimal number split into integer and fractional digit strings.
struct Number<'a> {
    whole: &'a str,
    fraction: &'a str,
}

fn split_number(input: &str) -> std::result::Result<(Number<'_>, &str), String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(end);
    if digits.is_empty() {
        return Err("missing number".to_string());
    }
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() || fraction.contains('.') || (digits.contains('.') && fraction.is_empty())
    {
        return Err(format!("malformed number '{digits}'"));
    }
    Ok((Number { whole, fraction }, unit.trim()))
}

fn scale(number: Number<'_>, multiplier: u64) -> Option<u64> {
    let whole: u128 = number.whole.parse().ok()?;
    let mut total = whole.checked_mul(u128::from(multiplier))?;
    if !number.fraction.is_empty() {
        let digits = u32::try_from(number.fraction.len()).ok()?;
        let denominator = 10u128.checked_pow(digits)?;
        let fraction: u128 = number.fraction.parse().ok()?;
        total = total.checked_add(fraction.checked_mul(u128::from(multiplier))? / denominator)?;
    }
    u64::try_from(total).ok()
}

/// A byte count that reads and writes as a size string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    /// Raw byte count.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_size(s).map(Self)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(Self(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A duration that reads and writes as a duration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Age(pub Duration);

impl Age {
    /// The wrapped duration.
    #[must_use]
    pub const fn duration(self) -> Duration {
        self.0
    }
}

impl FromStr for Age {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_duration(s).map(Self)
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0.as_millis())
    }
}

impl Serialize for Age {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Age {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Millis(n) => Ok(Self(Duration::from_millis(n))),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
