//! Sink abstraction.

use async_trait::async_trait;
use fieldops_core::FieldEvent;

/// A destination events can be delivered to.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn deliver(&self, event: &FieldEvent) -> Result<(), anyhow::Error>;
}
