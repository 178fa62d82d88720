use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{Authenticator, SessionManager};
use crate::common_issues::CommonIssue;
use crate::config::AppConfig;
use crate::notifications::Notifier;
use crate::tickets::lifecycle::OverduePolicy;
use crate::tickets::store::TicketRepository;

pub struct AppState {
    pub config: AppConfig,
    pub tickets: Arc<dyn TicketRepository>,
    pub authenticator: Authenticator,
    pub sessions: SessionManager,
    pub notifier: Arc<dyn Notifier>,
    pub common_issues: RwLock<Vec<CommonIssue>>,
    pub overdue: OverduePolicy,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tickets: Arc<dyn TicketRepository>,
        authenticator: Authenticator,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let sessions = SessionManager::from_config(&config.auth)?;
        let overdue = OverduePolicy::from_minutes(config.tickets.overdue_threshold_minutes);
        Ok(Self {
            config,
            tickets,
            authenticator,
            sessions,
            notifier,
            common_issues: RwLock::new(crate::common_issues::default_issues()),
            overdue,
        })
    }
}
