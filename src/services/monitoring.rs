use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// An error worth surfacing to whoever operates the service.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringEvent {
    pub source: String, // "http" or "worker"
    pub message: String,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

impl MonitoringEvent {
    pub fn new(source: &str, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            message: message.into(),
            request_id: None,
            user_id: None,
            method: None,
            path: None,
            status: None,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, event: MonitoringEvent);
}

/// Writes events to the `monitoring` tracing target.
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    async fn report(&self, event: MonitoringEvent) {
        error!(
            target: "monitoring",
            source = %event.source,
            request_id = ?event.request_id,
            user_id = ?event.user_id,
            method = ?event.method,
            path = ?event.path,
            status = ?event.status,
            "{}",
            event.message
        );
    }
}

/// Logs locally and forwards each event as JSON to a webhook.
pub struct WebhookReporter {
    client: reqwest::Client,
    url: String,
}

impl WebhookReporter {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ErrorReporter for WebhookReporter {
    async fn report(&self, event: MonitoringEvent) {
        TracingReporter.report(event.clone()).await;

        let result = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!(target: "monitoring", "Failed to deliver error report: {}", e);
        }
    }
}

pub fn setup_reporter(webhook_url: Option<&str>) -> Arc<dyn ErrorReporter> {
    match webhook_url {
        Some(url) => match WebhookReporter::new(url.to_string()) {
            Ok(reporter) => {
                tracing::info!("📡 Error reports forwarded to {}", url);
                Arc::new(reporter)
            }
            Err(e) => {
                warn!("Webhook reporter unavailable ({}), using tracing only", e);
                Arc::new(TracingReporter)
            }
        },
        None => Arc::new(TracingReporter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_context() {
        let mut event = MonitoringEvent::new("http", "boom");
        event.status = Some(500);
        event.path = Some("/files".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "http");
        assert_eq!(json["status"], 500);
        assert_eq!(json["path"], "/files");
        assert!(json["user_id"].is_null());
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        let reporter = WebhookReporter::new("http://127.0.0.1:9/unreachable".into()).unwrap();
        reporter.report(MonitoringEvent::new("worker", "boom")).await;
    }
}
