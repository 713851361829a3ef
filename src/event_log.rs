use crate::types::{EventKind, EventRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use std::sync::Arc;

/// Sink for session event records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventLogger: Send + Sync {
    async fn log_event(&self, record: EventRecord) -> Result<()>;
}

/// Posts each record as JSON to a webhook.
pub struct WebhookEventLogger {
    client: Client,
    url: String,
}

impl WebhookEventLogger {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl EventLogger for WebhookEventLogger {
    async fn log_event(&self, record: EventRecord) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&record)
            .send()
            .await
            .context("Failed to reach event webhook")?
            .error_for_status()
            .context("Event webhook rejected the record")?;
        Ok(())
    }
}

/// Writes records through `tracing`. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

#[async_trait]
impl EventLogger for TracingEventLogger {
    async fn log_event(&self, record: EventRecord) -> Result<()> {
        tracing::info!(
            session_id = record.session_id(),
            kind = ?record.kind(),
            timestamp = %record.timestamp(),
            data = ?record.data(),
            "session event"
        );
        Ok(())
    }
}

/// Fire-and-forget front for an [`EventLogger`].
///
/// Every record is delivered from its own task; failures are logged and
/// swallowed so the caller never waits on or sees them.
#[derive(Clone)]
pub struct EventSink {
    logger: Arc<dyn EventLogger>,
}

impl EventSink {
    pub fn new(logger: Arc<dyn EventLogger>) -> Self {
        Self { logger }
    }

    pub fn emit(&self, kind: EventKind, session_id: &str, data: Option<serde_json::Value>) {
        let mut record = EventRecord::new(kind, session_id);
        if let Some(data) = data {
            record = record.with_data(data);
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime to deliver {:?} event", kind);
            return;
        };
        let logger = self.logger.clone();
        runtime.spawn(async move {
            if let Err(e) = logger.log_event(record).await {
                tracing::warn!("failed to log {:?} event: {:#}", kind, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emit_delivers_record_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut logger = MockEventLogger::new();
        logger.expect_log_event().times(1).returning(move |record| {
            tx.send(record).unwrap();
            Ok(())
        });

        let sink = EventSink::new(Arc::new(logger));
        sink.emit(
            EventKind::SessionStarted,
            "s-1",
            Some(serde_json::json!({ "agentId": "a" })),
        );

        let record = rx.recv().await.unwrap();
        assert_eq!(record.kind(), EventKind::SessionStarted);
        assert_eq!(record.session_id(), "s-1");
        assert_eq!(record.data().unwrap()["agentId"], "a");
    }

    #[tokio::test]
    async fn emit_swallows_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut logger = MockEventLogger::new();
        logger.expect_log_event().returning(move |_| {
            tx.send(()).unwrap();
            Err(anyhow::anyhow!("webhook down"))
        });

        let sink = EventSink::new(Arc::new(logger));
        sink.emit(EventKind::Error, "s-1", None);
        rx.recv().await.unwrap();
    }
}
