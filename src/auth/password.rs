use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Config {
    pub fn from_auth(config: &AuthConfig) -> Self {
        Self {
            memory_cost_kib: config.argon2_memory_kib,
            time_cost: config.argon2_time_cost,
            parallelism: config.argon2_parallelism,
        }
    }

    /// Minimal cost, for tests only.
    pub fn fast() -> Self {
        Self {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    /// The stored hash is a legacy digest or uses weaker parameters.
    pub needs_rehash: bool,
}

impl Verification {
    const REJECTED: Self = Self {
        valid: false,
        needs_rehash: false,
    };
}

pub struct CredentialHasher {
    argon2: Argon2<'static>,
    params: Params,
    /// Hash checked when no login matches, so unknown emails cost the same
    /// Argon2 work as wrong passwords.
    decoy: String,
}

impl CredentialHasher {
    pub fn new(config: Argon2Config) -> Result<Self> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());
        let salt = SaltString::generate(&mut OsRng);
        let decoy = argon2
            .hash_password(b"tictrack-decoy-credential", &salt)
            .map_err(|e| anyhow!("Failed to prepare decoy hash: {e}"))?
            .to_string();
        Ok(Self {
            argon2,
            params,
            decoy,
        })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    /// Checks `password` against either an Argon2 PHC string or a legacy
    /// unsalted SHA-256 hex digest.
    pub fn verify(&self, password: &str, stored: &str) -> Verification {
        if is_legacy_digest(stored) {
            let valid: bool = legacy_digest(password)
                .as_bytes()
                .ct_eq(stored.to_ascii_lowercase().as_bytes())
                .into();
            if valid {
                debug!("Password matched a legacy SHA-256 digest");
            }
            return Verification {
                valid,
                needs_rehash: valid,
            };
        }

        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash is unreadable: {e}");
                return Verification::REJECTED;
            }
        };
        let valid = self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        Verification {
            valid,
            needs_rehash: valid && self.is_weaker(&parsed),
        }
    }

    /// Spends one Argon2 verification on a login that does not exist. Always
    /// rejects.
    pub fn verify_absent(&self, password: &str) -> Verification {
        let _ = self.verify(password, &self.decoy);
        Verification::REJECTED
    }

    fn is_weaker(&self, parsed: &PasswordHash<'_>) -> bool {
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        match Params::try_from(parsed) {
            Ok(stored) => {
                stored.m_cost() < self.params.m_cost() || stored.t_cost() < self.params.t_cost()
            }
            Err(_) => true,
        }
    }
}

/// Hex SHA-256 of the UTF-8 password, as older account records store it.
pub fn legacy_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn is_legacy_digest(stored: &str) -> bool {
    stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(Argon2Config::fast()).expect("Failed to create hasher")
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("SecureP@ssw0rd123!").expect("Failed to hash");
        assert!(hash.starts_with("$argon2id$"));

        let ok = hasher.verify("SecureP@ssw0rd123!", &hash);
        assert!(ok.valid);
        assert!(!ok.needs_rehash);
        assert!(!hasher.verify("WrongPassword", &hash).valid);
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let hasher = hasher();
        let a = hasher.hash("repeat").unwrap();
        let b = hasher.hash("repeat").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_digest_verifies_and_asks_for_rehash() {
        let hasher = hasher();
        // sha256("password")
        let stored = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        assert_eq!(legacy_digest("password"), stored);

        let ok = hasher.verify("password", stored);
        assert_eq!(
            ok,
            Verification {
                valid: true,
                needs_rehash: true
            }
        );
        let upper = stored.to_ascii_uppercase();
        assert!(hasher.verify("password", &upper).valid);
        assert_eq!(hasher.verify("Password", stored), Verification::REJECTED);
    }

    #[test]
    fn test_weaker_params_need_rehash() {
        let weak = hasher().hash("pw").unwrap();
        let strong = CredentialHasher::new(Argon2Config {
            memory_cost_kib: 2048,
            time_cost: 2,
            parallelism: 1,
        })
        .unwrap();
        let result = strong.verify("pw", &weak);
        assert!(result.valid);
        assert!(result.needs_rehash);
    }

    #[test]
    fn test_absent_login_runs_argon2_and_rejects() {
        let hasher = hasher();
        assert!(hasher.decoy.starts_with("$argon2id$"));
        assert!(PasswordHash::new(&hasher.decoy).is_ok());
        assert_eq!(hasher.verify_absent("anything"), Verification::REJECTED);
        assert_eq!(
            hasher.verify_absent("tictrack-decoy-credential"),
            Verification::REJECTED
        );
    }

    #[test]
    fn test_garbage_hash_is_rejected() {
        assert_eq!(hasher().verify("pw", "not-a-hash"), Verification::REJECTED);
    }
}
