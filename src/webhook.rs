use crate::error::AppError;
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;

/// Best-effort destination for claim notifications
pub trait NotificationSink: Send + Sync {
    /// Deliver `message` in the background. Never blocks and never fails.
    fn notify(&self, message: String);
}

/// How a webhook delivery went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Missing { body: String },
    BadRequest { body: String },
    Other { status: u16, body: String },
}

/// Posts notifications to a chat webhook. With no URL configured it does nothing.
///
/// Deliveries run in the background; [`WebhookNotifier::flush`] waits for the
/// ones still in flight before the process exits.
#[derive(Clone)]
pub struct WebhookNotifier {
    inner: Option<Arc<WebhookTarget>>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

struct WebhookTarget {
    url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let inner = url.filter(|u| !u.trim().is_empty()).map(|url| {
            let http = Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| Client::new());
            Arc::new(WebhookTarget { url, http })
        });
        Self {
            inner,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    fn pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for every notification still in flight.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending());
        if !pending.is_empty() {
            tracing::debug!("Waiting for {} webhook deliveries", pending.len());
        }
        while pending.join_next().await.is_some() {}
    }

    /// Post `content` and report the outcome.
    pub async fn deliver(&self, content: &str) -> Result<Option<Delivery>, AppError> {
        let Some(target) = &self.inner else {
            return Ok(None);
        };
        target.deliver(content).await.map(Some)
    }
}

impl WebhookTarget {
    async fn deliver(&self, content: &str) -> Result<Delivery, AppError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        Ok(match status {
            200..=299 => Delivery::Delivered,
            401 | 404 => Delivery::Missing { body },
            400 => Delivery::BadRequest { body },
            _ => Delivery::Other { status, body },
        })
    }
}

impl NotificationSink for WebhookNotifier {
    fn notify(&self, message: String) {
        let Some(target) = self.inner.clone() else {
            return;
        };

        let mut pending = self.pending();
        while pending.try_join_next().is_some() {}

        pending.spawn(async move {
            tracing::info!("Notifying webhook...");
            match target.deliver(&message).await {
                Ok(Delivery::Delivered) => tracing::info!("Successfully notified webhook."),
                Ok(Delivery::Missing { body }) => {
                    tracing::warn!("Failed to notify webhook. Does it exist? Body: {body}")
                }
                Ok(Delivery::BadRequest { body }) => {
                    tracing::warn!("Failed to notify webhook. Got bad request. Body: {body}")
                }
                Ok(Delivery::Other { status, body }) => {
                    tracing::warn!("Webhook returned {status}: {body}")
                }
                Err(e) => tracing::error!("Failed to notify webhook: {e}"),
            }
        });
    }
}
