//! Structured lifecycle events for stencil.
//!
//! The artifact cache, the garbage collector and the operation engine report
//! what they do through an [`EventObserver`]. Observers are injected, so a
//! caller can route events into `tracing` ([`TracingObserver`], the default),
//! drop them ([`NoopObserver`]) or keep them for assertions
//! ([`RecordingObserver`]).
//!
//! # Usage
//!
//! ```rust
//! use stencil_events::{CacheEvent, EventCategory, RecordingObserver, emit};
//!
//! let recorder = RecordingObserver::new();
//! emit(&recorder, EventCategory::Cache(CacheEvent::Miss { key: "a".into() }));
//! assert_eq!(recorder.event_types(), vec!["cache.miss"]);
//! ```

pub mod event;
pub mod observer;

pub use event::{CacheEvent, EventCategory, GcEvent, OperationEvent, StencilEvent};
pub use observer::{
    EventObserver, NoopObserver, RecordingObserver, SharedObserver, TracingObserver, emit,
};
