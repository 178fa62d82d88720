//! Best-effort alerts about new and overdue tickets. Delivery failures are
//! logged and never propagate to the caller.

pub mod overdue;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NotificationsConfig;
use crate::tickets::types::Ticket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(rename = "ticketId")]
    pub ticket_id: Option<String>,
}

impl Notification {
    pub fn new_ticket(ticket: &Ticket) -> Self {
        Self {
            title: "New Support Ticket".into(),
            body: format!(
                "{} submitted a {} issue",
                ticket.student_name, ticket.issue_category
            ),
            ticket_id: Some(ticket.id.clone()),
        }
    }

    pub fn overdue(ticket: &Ticket, threshold_minutes: i64) -> Self {
        Self {
            title: "Ticket Overdue".into(),
            body: format!(
                "{} from {} has been {} for over {} minutes",
                ticket.id, ticket.student_name, ticket.status, threshold_minutes
            ),
            ticket_id: Some(ticket.id.clone()),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Sends and swallows any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        warn!("Notification '{}' not delivered: {e:#}", notification.title);
    }
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!("[notify] {}: {}", notification.title, notification.body);
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook endpoint.
#[cfg(feature = "webhook")]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "webhook")]
impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(feature = "webhook")]
fn webhook_notifier(config: &NotificationsConfig) -> Option<Arc<dyn Notifier>> {
    let url = config.webhook_url.as_deref().filter(|u| !u.is_empty())?;
    match WebhookNotifier::new(url) {
        Ok(notifier) => {
            info!("Sending notifications to webhook {url}");
            Some(Arc::new(notifier))
        }
        Err(e) => {
            warn!("Webhook notifier unavailable, falling back to log: {e}");
            None
        }
    }
}

#[cfg(not(feature = "webhook"))]
fn webhook_notifier(config: &NotificationsConfig) -> Option<Arc<dyn Notifier>> {
    if config.webhook_url.is_some() {
        warn!("webhook_url is set but the webhook feature is disabled");
    }
    None
}

/// Picks the webhook notifier when a URL is configured, else the log.
pub fn build_notifier(config: &NotificationsConfig) -> Arc<dyn Notifier> {
    webhook_notifier(config).unwrap_or_else(|| Arc::new(LogNotifier))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every alert; optionally fails after recording.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().await.push(notification.clone());
            if self.fail {
                anyhow::bail!("desktop unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        notify_best_effort(
            &notifier,
            Notification {
                title: "t".into(),
                body: "b".into(),
                ticket_id: None,
            },
        )
        .await;
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[test]
    fn test_new_ticket_message() {
        let ticket = crate::tickets::lifecycle::tests::sample_ticket(
            "TKT-007",
            crate::tickets::types::IssueCategory::Hardware,
            crate::tickets::types::TicketStatus::Open,
        );
        let n = Notification::new_ticket(&ticket);
        assert_eq!(n.title, "New Support Ticket");
        assert_eq!(n.body, "Alex Johnson submitted a hardware issue");
        assert_eq!(n.ticket_id.as_deref(), Some("TKT-007"));
    }
}
