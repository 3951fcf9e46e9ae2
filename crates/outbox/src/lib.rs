//! Event delivery boundary.
//!
//! Engines publish [`FieldEvent`]s here after the state change that
//! produced them has been persisted. Delivery is best-effort: a failing
//! sink is logged and never aborts the operation that emitted the event.

#![warn(missing_docs)]

pub mod builtin;
pub mod trait_;

pub use builtin::{MemorySink, NullSink, WebhookSink};
pub use trait_::EventSink;

use std::sync::Arc;

use fieldops_core::FieldEvent;
use tracing::{debug, warn};

/// Shared handle engines use to publish events.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<dyn EventSink>,
}

impl Outbox {
    /// Wrap a sink.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// An outbox that drops everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Publish one event. Failures are logged, not returned.
    pub async fn publish(&self, event: FieldEvent) {
        let audience = event.audience();
        match self.sink.deliver(&event).await {
            Ok(()) => debug!(?audience, ?event, "event delivered"),
            Err(e) => warn!(error = %e, ?audience, ?event, "event delivery failed"),
        }
    }
}
