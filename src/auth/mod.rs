pub mod directory;
pub mod handlers;
pub mod password;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub use directory::{Account, AccountDirectory, AccountRole, DirectoryData, InMemoryDirectory, Login, Role};
pub use handlers::configure_auth_routes;
pub use password::{Argon2Config, CredentialHasher, Verification};
pub use session::{ItSession, Session, SessionManager};

const STUDENT_ROLES: &[&str] = &["Student"];
const IT_PORTAL_ROLES: &[&str] = &["IT", "Teacher", "TechStaff", "Reviewer", "Board"];

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingFields,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account not found")]
    AccountNotFound,
    #[error("No {0} role found for this account")]
    NoRole(String),
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid or expired session")]
    InvalidToken,
    #[error("This action requires the {required} portal (session is {actual})")]
    WrongPortal { required: Portal, actual: Portal },
    #[error("Account directory error: {0}")]
    Directory(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Student,
    It,
    Unknown,
}

impl Portal {
    pub fn for_role(role_name: &str) -> Self {
        if STUDENT_ROLES.contains(&role_name) {
            Self::Student
        } else if IT_PORTAL_ROLES.contains(&role_name) {
            Self::It
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::It => "it",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub account_id: i64,
    pub email: String,
    #[serde(rename = "fullNameEN")]
    pub full_name_en: String,
    #[serde(rename = "fullNameAR")]
    pub full_name_ar: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub portal_type: Portal,
}

/// Resolves credentials to an account, its primary role and its portal.
pub struct Authenticator {
    directory: Arc<dyn AccountDirectory>,
    hasher: Arc<CredentialHasher>,
    business_entity: String,
    upgrade_legacy_hashes: bool,
}

impl Authenticator {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        hasher: Arc<CredentialHasher>,
        business_entity: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            hasher,
            business_entity: business_entity.into(),
            upgrade_legacy_hashes: true,
        }
    }

    pub fn with_hash_upgrades(mut self, enabled: bool) -> Self {
        self.upgrade_legacy_hashes = enabled;
        self
    }

    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let login = self.directory.find_login_by_email(email).await?;

        let hasher = Arc::clone(&self.hasher);
        let stored = login.as_ref().map(|l| l.password_hash.clone());
        let candidate = password.to_string();
        let verification = tokio::task::spawn_blocking(move || match stored {
            Some(stored) => hasher.verify(&candidate, &stored),
            None => hasher.verify_absent(&candidate),
        })
        .await
        .map_err(|e| AuthError::Directory(e.into()))?;
        let login = match login {
            Some(login) if verification.valid => login,
            _ => return Err(AuthError::InvalidCredentials),
        };

        let account = self
            .directory
            .find_account(login.account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let role = self.primary_role(&account).await?;

        if verification.needs_rehash && self.upgrade_legacy_hashes {
            self.upgrade_hash(&login, password).await;
        }

        let portal_type = Portal::for_role(&role.role_name);
        info!(
            "Login succeeded for account {} as {} ({} portal)",
            account.id, role.role_name, portal_type
        );
        Ok(AuthenticatedUser {
            account_id: account.id,
            email: account.email,
            full_name_en: account.full_name_en,
            full_name_ar: account.full_name_ar,
            phone: account.phone,
            role: role.role_name,
            portal_type,
        })
    }

    /// First scoped membership role, else the scoped direct role.
    async fn primary_role(&self, account: &Account) -> Result<Role, AuthError> {
        let scoped = self
            .directory
            .member_roles(account.id)
            .await?
            .into_iter()
            .find(|r| r.business_entity == self.business_entity);
        if let Some(role) = scoped {
            return Ok(role);
        }

        if let Some(role_id) = account.role_id {
            if let Some(role) = self.directory.find_role(role_id).await? {
                if role.business_entity == self.business_entity {
                    return Ok(role);
                }
            }
        }
        Err(AuthError::NoRole(self.business_entity.clone()))
    }

    async fn upgrade_hash(&self, login: &Login, password: &str) {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password)).await;
        let result = match hashed {
            Ok(Ok(hash)) => self.directory.set_password_hash(login.id, hash).await,
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => info!("Upgraded stored password hash for login {}", login.id),
            Err(e) => warn!("Could not upgrade password hash for login {}: {e}", login.id),
        }
    }
}
