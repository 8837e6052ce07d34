//! Shared primitives for stencil
//!
//! - [`clock`]: injectable time source, including `SOURCE_DATE_EPOCH` pinning
//! - [`units`]: `1MB` / `30d` style size and duration strings
//! - [`lock`]: process-wide critical sections keyed by path
//! - [`fs`]: atomic temp-file-then-rename writes

pub mod clock;
mod error;
pub mod fs;
pub mod lock;
pub mod units;

pub use clock::{Clock, FixedClock, ManualClock, SharedClock, SystemClock, clock_from_env};
pub use error::{Error, Result};
pub use lock::{PathLockGuard, lock_path};
pub use units::{Age, ByteSize, format_duration, format_size, parse_duration, parse_size};
