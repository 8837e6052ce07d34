//! Eviction strategies and reasons

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the collector picks victims once expired units are gone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcStrategy {
    /// Only age; size limits are ignored
    Age,
    /// Least recently accessed first
    #[default]
    Lru,
    /// Oldest created first, ignoring access
    Fifo,
    /// Largest first
    Size,
    /// Age, then oversized units, then least recently accessed
    Hybrid,
}

impl GcStrategy {
    /// Every strategy, in documentation order
    pub const ALL: [Self; 5] = [Self::Age, Self::Lru, Self::Fifo, Self::Size, Self::Hybrid];

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Lru => "lru",
            Self::Fifo => "fifo",
            Self::Size => "size",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for GcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GcStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "Unknown GC strategy '{s}' (expected one of: age, lru, fifo, size, hybrid)"
                ))
            })
    }
}

/// Why a unit was chosen for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionReason {
    /// Past `maxAge` during an lru/fifo expiry pass
    Expired,
    /// Least recently accessed under size pressure
    Lru,
    /// Oldest created under size pressure
    Fifo,
    /// Largest under size pressure
    Size,
    /// Past `maxAge` under the age or hybrid strategy
    AgeExpired,
    /// Indexed but the blob is gone
    MissingBlob,
}

impl EvictionReason {
    /// Stable kebab-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Lru => "lru",
            Self::Fifo => "fifo",
            Self::Size => "size",
            Self::AgeExpired => "age-expired",
            Self::MissingBlob => "missing-blob",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!("lru".parse::<GcStrategy>().unwrap(), GcStrategy::Lru);
        assert_eq!(" Hybrid ".parse::<GcStrategy>().unwrap(), GcStrategy::Hybrid);
        assert!("random".parse::<GcStrategy>().is_err());
    }

    #[test]
    fn test_strategy_round_trips_through_display() {
        for strategy in GcStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<GcStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_default_strategy_is_lru() {
        assert_eq!(GcStrategy::default(), GcStrategy::Lru);
    }

    #[test]
    fn test_reason_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&EvictionReason::AgeExpired).unwrap(),
            "\"age-expired\""
        );
        assert_eq!(EvictionReason::MissingBlob.to_string(), "missing-blob");
    }
}
