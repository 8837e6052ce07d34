//! Injectable time source.
//!
//! Cache timestamps and eviction ages are always computed from a [`Clock`], never
//! from the wall clock directly, so tests can move time explicitly and builds
//! honoring `SOURCE_DATE_EPOCH` stay reproducible.

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Environment variable pinning the clock for reproducible runs.
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// A source of "now".
pub trait Clock: Send + Sync + Debug {
    /// Current instant according to this clock.
    fn now(&self) -> DateTime<Utc>;
}

/// Reference-counted clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Clock frozen at `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Manual clock starting at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Manual clock starting at the Unix epoch plus `secs`.
    #[must_use]
    pub fn at_epoch_secs(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Parse a `SOURCE_DATE_EPOCH` value (seconds since the Unix epoch).
///
/// # Errors
///
/// Returns [`Error::InvalidEpoch`] if the value is not a non-negative integer.
pub fn parse_source_date_epoch(value: &str) -> Result<DateTime<Utc>> {
    let invalid = || Error::InvalidEpoch {
        value: value.to_string(),
    };
    let secs: i64 = value.trim().parse().map_err(|_| invalid())?;
    if secs < 0 {
        return Err(invalid());
    }
    Utc.timestamp_opt(secs, 0).single().ok_or_else(invalid)
}

/// Clock selected from the environment: frozen at `SOURCE_DATE_EPOCH` when set,
/// the system clock otherwise.
///
/// # Errors
///
/// Returns [`Error::InvalidEpoch`] if `SOURCE_DATE_EPOCH` is set but malformed.
pub fn clock_from_env() -> Result<SharedClock> {
    match std::env::var(SOURCE_DATE_EPOCH) {
        Ok(value) if !value.trim().is_empty() => {
            let at = parse_source_date_epoch(&value)?;
            tracing::debug!(epoch = %at, "Using SOURCE_DATE_EPOCH clock");
            Ok(Arc::new(FixedClock::new(at)))
        }
        _ => Ok(Arc::new(SystemClock)),
    }
}

/// Non-negative elapsed time between two instants; zero if `later` is earlier.
#[must_use]
pub fn elapsed(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_epoch_secs(1_000);
        let start = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(elapsed(start, clock.now()), Duration::from_millis(1500));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at_epoch_secs(0);
        let target = Utc.timestamp_opt(42, 0).unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_elapsed_saturates() {
        let a = Utc.timestamp_opt(100, 0).unwrap();
        let b = Utc.timestamp_opt(50, 0).unwrap();
        assert_eq!(elapsed(a, b), Duration::ZERO);
    }

    #[test]
    fn test_parse_source_date_epoch() {
        let at = parse_source_date_epoch("1700000000").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert!(parse_source_date_epoch("-5").is_err());
        assert!(parse_source_date_epoch("yesterday").is_err());
    }

    #[test]
    fn test_clock_from_env_uses_epoch() {
        temp_env::with_var(SOURCE_DATE_EPOCH, Some("1234"), || {
            let clock = clock_from_env().unwrap();
            assert_eq!(clock.now().timestamp(), 1234);
        });
    }

    #[test]
    fn test_clock_from_env_rejects_bad_epoch() {
        temp_env::with_var(SOURCE_DATE_EPOCH, Some("soon"), || {
            assert!(clock_from_env().is_err());
        });
    }

    #[test]
    fn test_clock_from_env_defaults_to_system() {
        temp_env::with_var_unset(SOURCE_DATE_EPOCH, || {
            let clock = clock_from_env().unwrap();
            let delta = elapsed(clock.now(), Utc::now());
            assert!(delta < Duration::from_secs(5));
        });
    }
}
