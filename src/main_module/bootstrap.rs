//! Wires the stores and services described by the configuration.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    AccountDirectory, Argon2Config, Authenticator, CredentialHasher, DirectoryData,
    InMemoryDirectory,
};
use crate::config::AppConfig;
use crate::notifications::build_notifier;
use crate::shared::state::AppState;
use crate::tickets::store::{TicketRepository, TicketStore};

pub async fn build_app_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let tickets: Arc<dyn TicketRepository> = match &config.store.snapshot_path {
        Some(path) => Arc::new(TicketStore::open(path).await?),
        None => {
            info!("No snapshot path configured, tickets are kept in memory only");
            Arc::new(TicketStore::in_memory())
        }
    };

    let directory: Arc<dyn AccountDirectory> = match &config.auth.directory_path {
        Some(path) => Arc::new(InMemoryDirectory::load(path).await?),
        None => {
            warn!("No account directory configured, every login will be rejected");
            Arc::new(InMemoryDirectory::new(DirectoryData::default()))
        }
    };

    let hasher = CredentialHasher::new(Argon2Config::from_auth(&config.auth))
        .context("Failed to initialise password hasher")?;
    let authenticator = Authenticator::new(
        directory,
        Arc::new(hasher),
        config.auth.business_entity.clone(),
    )
    .with_hash_upgrades(config.auth.upgrade_legacy_hashes);

    let notifier = build_notifier(&config.notifications);

    let state = AppState::new(config, tickets, authenticator, notifier)
        .context("Invalid session configuration")?;
    Ok(Arc::new(state))
}
