//! Built-in sinks.

use anyhow::Context;
use async_trait::async_trait;
use fieldops_core::FieldEvent;
use tokio::sync::Mutex;
use tracing::debug;

use crate::trait_::EventSink;

/// Sink that drops every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn deliver(&self, _event: &FieldEvent) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Sink that collects events in memory, for tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<FieldEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in delivery order.
    pub async fn events(&self) -> Vec<FieldEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn deliver(&self, event: &FieldEvent) -> Result<(), anyhow::Error> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Sink that POSTs each event as JSON to a webhook.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    /// Point the sink at a webhook URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn deliver(&self, event: &FieldEvent) -> Result<(), anyhow::Error> {
        debug!(url = %self.url, at = %event.at(), "posting event");
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("webhook request failed")?
            .error_for_status()
            .context("webhook returned an error status")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Outbox;
    use fieldops_core::{TaskId, UserId};
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_sink_keeps_delivery_order() {
        let sink = Arc::new(MemorySink::new());
        let outbox = Outbox::new(sink.clone());

        let user_id = UserId::new();
        let at = chrono::Utc::now();
        outbox
            .publish(FieldEvent::TaskStarted {
                task_id: TaskId::new(),
                user_id,
                at,
            })
            .await;
        outbox
            .publish(FieldEvent::TaskPaused {
                task_id: TaskId::new(),
                user_id,
                at,
            })
            .await;

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FieldEvent::TaskStarted { .. }));
        assert!(matches!(events[1], FieldEvent::TaskPaused { .. }));
    }

    #[tokio::test]
    async fn failing_sink_does_not_surface() {
        struct FailingSink;

        #[async_trait]
        impl EventSink for FailingSink {
            async fn deliver(&self, _event: &FieldEvent) -> Result<(), anyhow::Error> {
                anyhow::bail!("down for maintenance")
            }
        }

        let outbox = Outbox::new(Arc::new(FailingSink));
        outbox
            .publish(FieldEvent::TaskStarted {
                task_id: TaskId::new(),
                user_id: UserId::new(),
                at: chrono::Utc::now(),
            })
            .await;
    }
}
