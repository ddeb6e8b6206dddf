//! Failure reporting and engine metrics.
//!
//! Most load and parse failures abort only the affected tile or subtree;
//! they must still be observable. Every failure path reports exactly one
//! [`DiagnosticEvent`] through the sink threaded through the tileset, in
//! addition to `tracing` output.
//!
//! ```text
//! Load pipeline / builder ----> DiagnosticsSink ----> host application
//!                          \--> TilesetMetrics  ----> MetricsSnapshot
//! ```

mod metrics;

pub use metrics::{MetricsSnapshot, TilesetMetrics};

use std::sync::Arc;

use parking_lot::Mutex;

/// A reportable failure or notable condition inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// No response was received for a request.
    TransportFailure { url: String, message: String },
    /// A response was received with a status outside 2xx.
    HttpStatus { url: String, status: u16 },
    /// A manifest body could not be parsed as JSON.
    ManifestParseFailure { url: String, message: String },
    /// A manifest node is missing a required property or carries an invalid
    /// value; the affected subtree was skipped.
    ManifestSchemaViolation { url: String, detail: String },
    /// Content bytes were not recognized by the decoder.
    UndecodableContent { url: String },
    /// Content bytes turned out to be a nested tileset manifest, which is
    /// detected but not expanded.
    ExternalTileset { url: String },
}

/// Observer for diagnostic events.
///
/// Implementations must tolerate being called from any thread: the load
/// pipeline reports from worker tasks.
pub trait DiagnosticsSink: Send + Sync {
    /// Reports one event.
    fn report(&self, event: &DiagnosticEvent);
}

/// Sink that discards all events.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn report(&self, _event: &DiagnosticEvent) {}
}

/// Sink that stores every event, for tests and debugging overlays.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events reported so far, in order.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Number of events reported so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when no events were reported.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_stores_events() {
        let sink = CollectingSink::new();
        sink.report(&DiagnosticEvent::HttpStatus {
            url: "http://example.com/tile.bin".to_string(),
            status: 404,
        });
        sink.report(&DiagnosticEvent::UndecodableContent {
            url: "http://example.com/other.bin".to_string(),
        });

        assert_eq!(sink.len(), 2);
        assert!(matches!(
            sink.events()[0],
            DiagnosticEvent::HttpStatus { status: 404, .. }
        ));
    }

    #[test]
    fn test_null_sink_discards() {
        // Just exercises the call path.
        NullSink.report(&DiagnosticEvent::TransportFailure {
            url: "http://example.com".to_string(),
            message: "connection reset".to_string(),
        });
    }
}
