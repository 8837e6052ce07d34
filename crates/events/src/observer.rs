//! Observers receive [`StencilEvent`]s from the cache, collector and engine.
//!
//! Components hold a [`SharedObserver`] and never depend on what it does with
//! events. The default is [`TracingObserver`], which turns each event into a
//! structured `tracing` record.

use crate::event::{CacheEvent, EventCategory, GcEvent, OperationEvent, StencilEvent};
use std::sync::{Arc, Mutex};

/// Receiver of lifecycle events.
pub trait EventObserver: Send + Sync {
    /// Handle one event. Must not panic and must not block for long.
    fn on_event(&self, event: &StencilEvent);
}

/// Reference-counted observer handle shared between components.
pub type SharedObserver = Arc<dyn EventObserver>;

/// Build an event for `category` and hand it to `observer`.
pub fn emit(observer: &dyn EventObserver, category: EventCategory) {
    observer.on_event(&StencilEvent::new(category));
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn on_event(&self, _event: &StencilEvent) {}
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    /// Shared handle to a tracing observer.
    #[must_use]
    pub fn shared() -> SharedObserver {
        Arc::new(Self)
    }
}

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &StencilEvent) {
        let event_type = event.event_type();
        match &event.category {
            EventCategory::Cache(CacheEvent::Corruption { key, hash, detail }) => {
                tracing::warn!(
                    target: "stencil::cache",
                    event_type,
                    key = key.as_deref().unwrap_or("-"),
                    hash = %hash,
                    detail = %detail,
                    "Cache corruption detected"
                );
            }
            EventCategory::Cache(CacheEvent::Stored {
                key,
                hash,
                size,
                deduplicated,
            }) => {
                tracing::debug!(
                    target: "stencil::cache",
                    event_type,
                    key = %key,
                    hash = %hash,
                    size,
                    deduplicated,
                );
            }
            EventCategory::Cache(CacheEvent::Hit { key, hash }) => {
                tracing::debug!(target: "stencil::cache", event_type, key = %key, hash = %hash);
            }
            EventCategory::Cache(CacheEvent::Miss { key }) => {
                tracing::debug!(target: "stencil::cache", event_type, key = %key);
            }
            EventCategory::Cache(CacheEvent::Deleted {
                key,
                hash,
                blob_removed,
            }) => {
                tracing::debug!(
                    target: "stencil::cache",
                    event_type,
                    key = %key,
                    hash = %hash,
                    blob_removed,
                );
            }
            EventCategory::Gc(GcEvent::Started {
                strategy,
                dry_run,
                units,
            }) => {
                tracing::info!(target: "stencil::gc", event_type, strategy = %strategy, dry_run, units);
            }
            EventCategory::Gc(GcEvent::Evicted {
                hash,
                size,
                reason,
                dry_run,
            }) => {
                tracing::debug!(
                    target: "stencil::gc",
                    event_type,
                    hash = %hash,
                    size,
                    reason = %reason,
                    dry_run,
                );
            }
            EventCategory::Gc(GcEvent::Completed {
                removed,
                kept,
                bytes,
                dry_run,
            }) => {
                tracing::info!(
                    target: "stencil::gc",
                    event_type,
                    removed,
                    kept,
                    bytes,
                    dry_run,
                );
            }
            EventCategory::Operation(OperationEvent::Skipped { path, reason }) => {
                tracing::info!(target: "stencil::operation", event_type, path = %path, reason = %reason);
            }
            EventCategory::Operation(OperationEvent::Unchanged { path, operation }) => {
                tracing::info!(
                    target: "stencil::operation",
                    event_type,
                    path = %path,
                    operation = %operation,
                );
            }
            EventCategory::Operation(OperationEvent::Applied {
                path,
                operation,
                bytes_written,
            }) => {
                tracing::info!(
                    target: "stencil::operation",
                    event_type,
                    path = %path,
                    operation = %operation,
                    bytes_written,
                );
            }
        }
    }
}

/// Observer that keeps every event in memory. Mostly useful in tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StencilEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<StencilEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Dotted names of every event seen so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(StencilEvent::event_type).collect()
    }
}

impl EventObserver for RecordingObserver {
    fn on_event(&self, event: &StencilEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

impl<T: EventObserver + ?Sized> EventObserver for Arc<T> {
    fn on_event(&self, event: &StencilEvent) {
        (**self).on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let recorder = RecordingObserver::new();
        emit(
            &recorder,
            EventCategory::Cache(CacheEvent::Miss {
                key: "a".to_string(),
            }),
        );
        emit(
            &recorder,
            EventCategory::Operation(OperationEvent::Skipped {
                path: "x".to_string(),
                reason: "skipIf".to_string(),
            }),
        );

        assert_eq!(
            recorder.event_types(),
            vec!["cache.miss", "operation.skipped"]
        );
    }

    #[test]
    fn test_shared_observer_forwards() {
        let recorder = Arc::new(RecordingObserver::new());
        let shared: SharedObserver = recorder.clone();
        emit(
            shared.as_ref(),
            EventCategory::Gc(GcEvent::Completed {
                removed: 1,
                kept: 2,
                bytes: 3,
                dry_run: false,
            }),
        );
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn test_tracing_observer_does_not_panic_without_subscriber() {
        let observer = TracingObserver;
        emit(
            &observer,
            EventCategory::Cache(CacheEvent::Corruption {
                key: None,
                hash: "00".to_string(),
                detail: "blob missing".to_string(),
            }),
        );
    }

    #[test]
    fn test_tracing_observer_with_subscriber() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            emit(
                &TracingObserver,
                EventCategory::Gc(GcEvent::Started {
                    strategy: "hybrid".to_string(),
                    dry_run: false,
                    units: 0,
                }),
            );
        });
    }
}
