//! Signed session tokens handed out at login and checked on protected routes.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AuthError, AuthenticatedUser, Portal};
use crate::config::AuthConfig;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub email: String,
    pub role: String,
    pub portal: Portal,
}

/// Shortest accepted HMAC key.
pub const MIN_SECRET_LEN: usize = 32;

fn random_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    expiry: Duration,
}

impl SessionManager {
    pub fn new(secret: &str, issuer: &str, expiry_minutes: i64) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT secret must be at least {MIN_SECRET_LEN} bytes");
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.leeway = 30;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            expiry: Duration::minutes(expiry_minutes),
        })
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let secret = match config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.to_string(),
            None => {
                warn!("auth.jwt_secret not set, using a random key; sessions end on restart");
                random_secret()
            }
        };
        Self::new(&secret, &config.issuer, config.session_expiry_minutes)
    }

    pub fn issue(&self, user: &AuthenticatedUser) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.account_id.to_string(),
            iss: self.issuer.clone(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            portal: user.portal_type,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn validate(&self, token: &str) -> Result<Session, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("Rejected session token: {e}");
            AuthError::InvalidToken
        })?;
        let account_id = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(Session {
            account_id,
            email: data.claims.email,
            role: data.claims.role,
            portal: data.claims.portal,
        })
    }
}

/// Identity recovered from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_id: i64,
    pub email: String,
    pub role: String,
    pub portal: Portal,
}

impl Session {
    pub fn require_portal(&self, portal: Portal) -> Result<(), AuthError> {
        if self.portal == portal {
            Ok(())
        } else {
            Err(AuthError::WrongPortal {
                required: portal,
                actual: self.portal,
            })
        }
    }

    pub fn is_it(&self) -> bool {
        self.portal == Portal::It
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = crate::shared::error::ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        Ok(state.sessions.validate(token)?)
    }
}

/// A session from the IT portal.
#[derive(Debug, Clone)]
pub struct ItSession(pub Session);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ItSession {
    type Rejection = crate::shared::error::ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        session.require_portal(Portal::It)?;
        Ok(Self(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(portal: Portal) -> AuthenticatedUser {
        AuthenticatedUser {
            account_id: 7,
            email: "sarah.chen@school.edu".into(),
            full_name_en: "Sarah Chen".into(),
            full_name_ar: None,
            phone: None,
            role: "Student".into(),
            portal_type: portal,
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let manager = SessionManager::new("test-secret-with-enough-length-000", "tictrack", 60).unwrap();
        let token = manager.issue(&user(Portal::Student)).unwrap();
        let session = manager.validate(&token).unwrap();
        assert_eq!(session.account_id, 7);
        assert_eq!(session.portal, Portal::Student);
        assert!(session.require_portal(Portal::It).is_err());
        assert!(session.require_portal(Portal::Student).is_ok());
    }

    #[test]
    fn test_rejects_foreign_and_expired_tokens() {
        let manager = SessionManager::new("secret-one-secret-one-secret-one", "tictrack", 60).unwrap();
        let other = SessionManager::new("secret-two-secret-two-secret-two", "tictrack", 60).unwrap();
        let token = other.issue(&user(Portal::It)).unwrap();
        assert!(matches!(manager.validate(&token), Err(AuthError::InvalidToken)));

        let expired = SessionManager::new("secret-one-secret-one-secret-one", "tictrack", -10).unwrap();
        let token = expired.issue(&user(Portal::It)).unwrap();
        assert!(matches!(manager.validate(&token), Err(AuthError::InvalidToken)));

        assert!(matches!(manager.validate("garbage"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_short_secret_is_refused() {
        assert!(SessionManager::new("too-short", "tictrack", 60).is_err());
        let config = AuthConfig {
            jwt_secret: Some("still-short".into()),
            ..Default::default()
        };
        assert!(SessionManager::from_config(&config).is_err());
    }

    #[test]
    fn test_unset_secret_does_not_accept_a_well_known_key() {
        let well_known = SessionManager::new(
            "dev-secret-key-change-in-production-minimum-32-chars",
            "tictrack",
            60,
        )
        .unwrap();
        let forged = well_known.issue(&user(Portal::It)).unwrap();

        let manager = SessionManager::from_config(&AuthConfig::default()).unwrap();
        assert!(matches!(manager.validate(&forged), Err(AuthError::InvalidToken)));

        let own = manager.issue(&user(Portal::It)).unwrap();
        assert_eq!(manager.validate(&own).unwrap().portal, Portal::It);
    }
}
