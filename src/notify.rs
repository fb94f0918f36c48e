//! Post-run notification handoff.
//!
//! Once a batch finishes, the [`BatchReport`] is handed to every configured
//! [`Notifier`] on a separate task. The run waits for that task for at most
//! [`delivery_deadline`], so a host that exits right after a run still gets
//! its notifications out. Notification failures are logged and never affect
//! the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::WebhookConfig;
use crate::error::{Error, Result};
use crate::types::BatchReport;

/// Receives the report of a finished batch
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Deliver the report
    async fn notify(&self, report: &BatchReport) -> Result<()>;
}

/// Writes the rendered summary to the tracing output
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify(&self, report: &BatchReport) -> Result<()> {
        tracing::info!(
            log = %report.log_path.display(),
            total = report.summary.total,
            valid = report.summary.valid,
            invalid = report.summary.invalid,
            error = report.summary.error,
            "{}",
            report.summary.render()
        );
        Ok(())
    }
}

/// JSON body posted to webhooks
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    /// Always `"batch_complete"`
    pub event: &'static str,
    /// Plain-text summary
    pub summary: String,
    /// Full report including every outcome and the log path
    pub report: &'a BatchReport,
    /// Unix timestamp (seconds) of the notification
    pub timestamp: i64,
}

/// Posts the report to HTTP endpoints
pub struct WebhookNotifier {
    client: reqwest::Client,
    hooks: Vec<WebhookConfig>,
}

impl WebhookNotifier {
    /// Notifier posting to every hook in `hooks`
    pub fn new(hooks: Vec<WebhookConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            hooks,
        }
    }

    async fn send(&self, hook: &WebhookConfig, payload: &WebhookPayload<'_>) -> Result<()> {
        let mut request = self
            .client
            .post(&hook.url)
            .json(payload)
            .timeout(hook.timeout);

        if let Some(auth) = &hook.auth_header {
            request = request.header("Authorization", auth);
        }

        match tokio::time::timeout(hook.timeout, request.send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(url = %hook.url, "webhook sent successfully");
                Ok(())
            }
            Ok(Ok(response)) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Err(Error::Notification(format!(
                    "webhook {} returned status {}: {}",
                    hook.url, status, body
                )))
            }
            Ok(Err(e)) => Err(Error::Notification(format!(
                "failed to send webhook {}: {}",
                hook.url, e
            ))),
            Err(_) => Err(Error::Notification(format!(
                "webhook {} timed out after {:?}",
                hook.url, hook.timeout
            ))),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, report: &BatchReport) -> Result<()> {
        let payload = WebhookPayload {
            event: "batch_complete",
            summary: report.summary.render(),
            report,
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut failed = 0usize;
        for hook in &self.hooks {
            if let Err(e) = self.send(hook, &payload).await {
                tracing::warn!(url = %hook.url, error = %e, "webhook failed");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(Error::Notification(format!(
                "{} of {} webhooks failed",
                failed,
                self.hooks.len()
            )));
        }
        Ok(())
    }
}

/// Notifiers for a configuration: always tracing, plus webhooks when configured
pub fn from_config(webhooks: &[WebhookConfig]) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(TracingNotifier)];
    if !webhooks.is_empty() {
        notifiers.push(Arc::new(WebhookNotifier::new(webhooks.to_vec())));
    }
    notifiers
}

/// Extra time allowed on top of webhook timeouts for the other notifiers
const DELIVERY_GRACE: Duration = Duration::from_secs(5);

/// Longest a run waits for its notifications
///
/// Webhooks are sent one after another, so the bound is the sum of their
/// timeouts plus a fixed grace period.
pub fn delivery_deadline(webhooks: &[WebhookConfig]) -> Duration {
    webhooks
        .iter()
        .fold(DELIVERY_GRACE, |total, hook| total.saturating_add(hook.timeout))
}

/// Hand `report` to every notifier on its own task
///
/// Awaiting the handle waits for delivery; dropping it detaches the task.
pub fn dispatch(notifiers: Vec<Arc<dyn Notifier>>, report: BatchReport) -> JoinHandle<()> {
    tokio::spawn(async move {
        for notifier in notifiers {
            if let Err(e) = notifier.notify(&report).await {
                tracing::warn!(notifier = notifier.name(), error = %e, "notification failed");
            }
        }
    })
}

/// Wait up to `limit` for a [`dispatch`] task to finish
///
/// Past the limit the task is left running detached and the caller moves on.
pub async fn wait_for_delivery(handle: JoinHandle<()>, limit: Duration) {
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(())) => tracing::debug!("notifications delivered"),
        Ok(Err(e)) => tracing::warn!(error = %e, "notification task failed"),
        Err(_) => tracing::warn!(
            limit_secs = limit.as_secs(),
            "notifications still pending, not waiting any longer"
        ),
    }
}
