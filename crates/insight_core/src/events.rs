//! Notification surface consumed by the host UI layer.
//!
//! Delivery is synchronous and in-process: `emit` walks the subscriber list
//! on the calling thread, in subscription order. Nothing is persisted or
//! replayed.

use std::sync::{Arc, RwLock};

/// A named store change with the affected entity as payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The relation set for `source` changed.
    RelationsChanged {
        /// Source file whose adjacency changed.
        source: String,
    },
    /// A background fix started for the inspection.
    InspectionLoading {
        /// Inspection id.
        id: String,
    },
    /// The inspection or its file set changed.
    InspectionChanged {
        /// Inspection id.
        id: String,
    },
    /// The inspection was removed.
    InspectionRemoved {
        /// Inspection id.
        id: String,
    },
    /// One file was detached from the inspection.
    FileRemovedFromInspection {
        /// Inspection id.
        id: String,
        /// Path of the detached file.
        path: String,
    },
    /// The inspection's background operation was cancelled.
    ///
    /// This is the dedicated cancellation signal; it never doubles as an
    /// error report.
    InspectionCancelled {
        /// Inspection id.
        id: String,
    },
}

/// Receives store events; implemented by the host UI layer.
pub trait EventSink: Send + Sync {
    /// Called synchronously for every emitted event.
    fn on_event(&self, event: &StoreEvent);
}

impl<F> EventSink for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

/// Fan-out of store events to registered sinks.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink; it receives every event emitted afterwards.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Delivers `event` to every sink, in subscription order.
    pub fn emit(&self, event: StoreEvent) {
        let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner());
        for sink in sinks.iter() {
            sink.on_event(&event);
        }
    }
}
