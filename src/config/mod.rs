//! Layered configuration: built-in defaults, then `tictrack.toml`, then
//! `TICTRACK_*` environment variables (`__` separates nested keys, e.g.
//! `TICTRACK_SERVER__PORT=9000`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "tictrack.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub tickets: TicketsConfig,
    pub notifications: NotificationsConfig,
    pub attachments: AttachmentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            cors_allowed_origins: vec!["http://localhost:3000".into()],
        }
    }
}

/// Where tickets live. Without a snapshot path the store is memory only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Roles only count when scoped to this business entity.
    pub business_entity: String,
    /// JSON file holding accounts, logins, roles and memberships.
    pub directory_path: Option<PathBuf>,
    /// HMAC key for session tokens, at least 32 bytes. Unset means a random
    /// key per process, so sessions do not survive a restart.
    pub jwt_secret: Option<String>,
    pub session_expiry_minutes: i64,
    pub issuer: String,
    /// Replace legacy SHA-256 digests with Argon2id after a successful login.
    pub upgrade_legacy_hashes: bool,
    pub argon2_memory_kib: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            business_entity: "TicTrack".into(),
            directory_path: None,
            jwt_secret: None,
            session_expiry_minutes: 8 * 60,
            issuer: "tictrack".into(),
            upgrade_legacy_hashes: true,
            argon2_memory_kib: 19456,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    pub overdue_threshold_minutes: i64,
    /// Engineers tickets may be assigned to. Empty means any name is accepted.
    pub engineers: Vec<String>,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            overdue_threshold_minutes: 15,
            engineers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub webhook_url: Option<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    pub max_report_bytes: usize,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_report_bytes: 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn figment(config_file: impl Into<PathBuf>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file.into()))
            .merge(Env::prefixed("TICTRACK_").split("__"))
    }

    /// Loads from `TICTRACK_CONFIG` (or `tictrack.toml`) plus the environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("TICTRACK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let config: AppConfig = Self::figment(path).extract()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tickets.overdue_threshold_minutes, 15);
        assert_eq!(config.auth.business_entity, "TicTrack");
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert!(config.store.snapshot_path.is_none());
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [server]
                port = 8088

                [tickets]
                overdue_threshold_minutes = 30
                engineers = ["eng-khalid", "eng-essam"]
                "#,
            )?;
            jail.set_env("TICTRACK_AUTH__BUSINESS_ENTITY", "HelpDesk");

            let config: AppConfig = AppConfig::figment("custom.toml").extract()?;
            assert_eq!(config.server.port, 8088);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.tickets.overdue_threshold_minutes, 30);
            assert_eq!(config.tickets.engineers.len(), 2);
            assert_eq!(config.auth.business_entity, "HelpDesk");
            Ok(())
        });
    }
}
