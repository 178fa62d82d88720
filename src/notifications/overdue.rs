use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{notify_best_effort, Notification, Notifier};
use crate::tickets::lifecycle::OverduePolicy;
use crate::tickets::store::TicketRepository;

/// Polls the store and alerts once for each ticket that crosses the overdue
/// threshold. A ticket that stops being overdue (resolved, closed) is
/// forgotten, so reopening it can alert again.
pub struct OverdueWatcher {
    tickets: Arc<dyn TicketRepository>,
    notifier: Arc<dyn Notifier>,
    policy: OverduePolicy,
    alerted: HashSet<String>,
}

impl OverdueWatcher {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        notifier: Arc<dyn Notifier>,
        policy: OverduePolicy,
    ) -> Self {
        Self {
            tickets,
            notifier,
            policy,
            alerted: HashSet::new(),
        }
    }

    /// One polling pass. Returns how many alerts went out.
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let tickets = self.tickets.list().await?;
        let overdue: Vec<_> = tickets
            .iter()
            .filter(|t| self.policy.ticket_overdue(t, now))
            .collect();

        self.alerted
            .retain(|id| overdue.iter().any(|t| &t.id == id));

        let mut sent = 0;
        for ticket in overdue {
            if self.alerted.insert(ticket.id.clone()) {
                let minutes = self.policy.threshold().num_minutes();
                notify_best_effort(self.notifier.as_ref(), Notification::overdue(ticket, minutes))
                    .await;
                sent += 1;
            }
        }
        if sent > 0 {
            debug!("Sent {sent} overdue alerts");
        }
        Ok(sent)
    }

    pub fn spawn(mut self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Overdue watcher polling every {}s", interval.as_secs());
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Overdue watcher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once(Utc::now()).await {
                            warn!("Overdue poll failed: {e:#}");
                        }
                    }
                }
            }
        })
    }
}
