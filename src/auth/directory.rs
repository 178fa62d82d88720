use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use crate::shared::fs::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub national_id: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Direct role reference, consulted only when no membership resolves.
    #[serde(default)]
    pub role_id: Option<i64>,
    #[serde(rename = "fullNameEN")]
    pub full_name_en: String,
    #[serde(rename = "fullNameAR", default)]
    pub full_name_ar: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    pub id: i64,
    pub account_id: i64,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    pub role_name: String,
    #[serde(default)]
    pub order_no: Option<i32>,
    pub business_entity: String,
}

/// Membership row linking an account to a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRole {
    pub id: i64,
    pub role_id: i64,
    pub account_id: i64,
    #[serde(default)]
    pub business_entity_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryData {
    pub accounts: Vec<Account>,
    pub logins: Vec<Login>,
    pub roles: Vec<Role>,
    pub account_roles: Vec<AccountRole>,
}

/// Read access to accounts and their roles, plus the single write needed to
/// upgrade a stored password hash.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_login_by_email(&self, email: &str) -> Result<Option<Login>>;
    async fn find_account(&self, account_id: i64) -> Result<Option<Account>>;
    async fn find_role(&self, role_id: i64) -> Result<Option<Role>>;
    /// Roles reached through memberships, in membership order.
    async fn member_roles(&self, account_id: i64) -> Result<Vec<Role>>;
    async fn set_password_hash(&self, login_id: i64, password_hash: String) -> Result<()>;
}

#[derive(Debug)]
pub struct InMemoryDirectory {
    data: RwLock<DirectoryData>,
    source: Option<PathBuf>,
}

impl InMemoryDirectory {
    pub fn new(data: DirectoryData) -> Self {
        Self {
            data: RwLock::new(data),
            source: None,
        }
    }

    /// Loads a JSON directory file. Hash upgrades are written back to it.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read account directory {}", path.display()))?;
        let data: DirectoryData = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse account directory {}", path.display()))?;
        info!(
            "Loaded {} accounts, {} roles from {}",
            data.accounts.len(),
            data.roles.len(),
            path.display()
        );
        Ok(Self {
            data: RwLock::new(data),
            source: Some(path),
        })
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn find_login_by_email(&self, email: &str) -> Result<Option<Login>> {
        let email = email.trim();
        let data = self.data.read().await;
        Ok(data
            .logins
            .iter()
            .find(|l| l.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<Account>> {
        let data = self.data.read().await;
        Ok(data.accounts.iter().find(|a| a.id == account_id).cloned())
    }

    async fn find_role(&self, role_id: i64) -> Result<Option<Role>> {
        let data = self.data.read().await;
        Ok(data.roles.iter().find(|r| r.id == role_id).cloned())
    }

    async fn member_roles(&self, account_id: i64) -> Result<Vec<Role>> {
        let data = self.data.read().await;
        Ok(data
            .account_roles
            .iter()
            .filter(|m| m.account_id == account_id)
            .filter_map(|m| data.roles.iter().find(|r| r.id == m.role_id))
            .cloned()
            .collect())
    }

    async fn set_password_hash(&self, login_id: i64, password_hash: String) -> Result<()> {
        let mut data = self.data.write().await;
        let Some(pos) = data.logins.iter().position(|l| l.id == login_id) else {
            anyhow::bail!("Login {login_id} not found");
        };

        if let Some(path) = &self.source {
            let mut candidate = data.clone();
            candidate.logins[pos].password_hash = password_hash;
            let json = serde_json::to_vec_pretty(&candidate)?;
            write_atomic(path, &json).await?;
            *data = candidate;
            debug!("Saved upgraded password hash for login {login_id}");
        } else {
            data.logins[pos].password_hash = password_hash;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY_JSON: &str = r#"{
        "accounts": [
            {"id": 1, "email": "it@school.edu", "fullNameEN": "Khalid Omar", "roleId": 3}
        ],
        "logins": [
            {"id": 10, "accountId": 1, "email": "IT@school.edu", "passwordHash": "x"}
        ],
        "roles": [
            {"id": 2, "roleName": "IT", "businessEntity": "TicTrack"},
            {"id": 3, "roleName": "Student", "businessEntity": "TicTrack"},
            {"id": 4, "roleName": "Cashier", "businessEntity": "Canteen"}
        ],
        "accountRoles": [
            {"id": 100, "roleId": 4, "accountId": 1},
            {"id": 101, "roleId": 2, "accountId": 1}
        ]
    }"#;

    #[tokio::test]
    async fn test_lookup_and_membership_order() {
        let data: DirectoryData = serde_json::from_str(DIRECTORY_JSON).unwrap();
        let directory = InMemoryDirectory::new(data);

        let login = directory
            .find_login_by_email(" it@SCHOOL.edu ")
            .await
            .unwrap()
            .expect("login");
        assert_eq!(login.account_id, 1);

        let account = directory.find_account(1).await.unwrap().unwrap();
        assert!(account.is_active);
        assert_eq!(account.role_id, Some(3));

        let names: Vec<String> = directory
            .member_roles(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.role_name)
            .collect();
        assert_eq!(names, vec!["Cashier", "IT"]);
        assert!(directory.find_account(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hash_upgrade_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        tokio::fs::write(&path, DIRECTORY_JSON).await.unwrap();

        let directory = InMemoryDirectory::load(&path).await.unwrap();
        directory
            .set_password_hash(10, "$argon2id$new".into())
            .await
            .unwrap();
        assert!(directory.set_password_hash(11, "x".into()).await.is_err());

        let reloaded = InMemoryDirectory::load(&path).await.unwrap();
        let login = reloaded.find_login_by_email("it@school.edu").await.unwrap().unwrap();
        assert_eq!(login.password_hash, "$argon2id$new");
        assert!(!dir.path().join("directory.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_write_back_keeps_previous_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        tokio::fs::write(&path, DIRECTORY_JSON).await.unwrap();
        let directory = InMemoryDirectory::load(&path).await.unwrap();

        // A directory squatting on the temp name makes the write fail.
        tokio::fs::create_dir(dir.path().join("directory.json.tmp")).await.unwrap();
        assert!(directory
            .set_password_hash(10, "$argon2id$new".into())
            .await
            .is_err());

        let login = directory.find_login_by_email("it@school.edu").await.unwrap().unwrap();
        assert_eq!(login.password_hash, "x");
        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(on_disk.contains(r#""passwordHash": "x""#));
    }
}
