//! Request observability events
//!
//! Pure side channel: sinks are notified of request lifecycle transitions
//! and are never consulted for control flow. Sinks are synchronous because
//! the pipeline must not suspend for observability.

use std::sync::Arc;

use tracing::{debug, info};

use crate::types::{Epoch, ObjectId, RequestId};

/// Events emitted by an internal client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    Started,
    Completed,
    /// The target object was unfound after the recovery probe; the request
    /// was dropped without error.
    Dropped { oid: ObjectId },
    /// The epoch guard fired mid-flight.
    Cancelled { observed: Epoch },
}

/// Trait for observing request events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, request: RequestId, event: &RequestEvent);
}

/// Default sink logging events through `tracing`.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_event(&self, request: RequestId, event: &RequestEvent) {
        match event {
            RequestEvent::Started => {
                info!(request = %request, "internal request started");
            }
            RequestEvent::Completed => {
                info!(request = %request, "internal request completed");
            }
            RequestEvent::Dropped { oid } => {
                debug!(request = %request, oid = %oid, "internal request dropped (unfound)");
            }
            RequestEvent::Cancelled { observed } => {
                debug!(request = %request, observed = %observed, "internal request cancelled");
            }
        }
    }
}

/// Sink discarding all events.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_event(&self, _request: RequestId, _event: &RequestEvent) {}
}

pub type SharedEventSink = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    struct RecordingSink(Mutex<Vec<RequestEvent>>);

    impl EventSink for RecordingSink {
        fn on_event(&self, _request: RequestId, event: &RequestEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_sink_receives_events_in_order() {
        let sink = RecordingSink(Mutex::new(Vec::new()));
        let id = RequestId::new();
        sink.on_event(id, &RequestEvent::Started);
        sink.on_event(id, &RequestEvent::Completed);
        assert_eq!(
            *sink.0.lock(),
            vec![RequestEvent::Started, RequestEvent::Completed]
        );
    }
}
