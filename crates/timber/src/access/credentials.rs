//! Password verification for configured users.
//!
//! Passwords are configured either in plain text or as `sha256:<hex>`. Both
//! forms are reduced to a SHA-256 digest at startup, and verification compares
//! digests without early exit.

use std::collections::HashMap;

use protocol::Credentials;
use sha2::{Digest, Sha256};

use super::identity::Identity;
use crate::config::ConfigError;

/// Prefix marking a pre-hashed password in configuration.
pub const SHA256_PREFIX: &str = "sha256:";

/// SHA-256 digest of a password.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest([u8; 32]);

impl PasswordDigest {
    /// Hash a plain-text password.
    pub fn of(password: &str) -> Self {
        Self(Sha256::digest(password.as_bytes()).into())
    }

    /// Parse a configured password value.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.strip_prefix(SHA256_PREFIX) {
            Some(hex_digest) => {
                let bytes = hex::decode(hex_digest.trim())
                    .map_err(|_| ConfigError::InvalidPasswordHash(value.to_string()))?;
                let digest: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ConfigError::InvalidPasswordHash(value.to_string()))?;
                Ok(Self(digest))
            }
            None => Ok(Self::of(value)),
        }
    }

    /// Check a supplied password against this digest.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = Self::of(password);
        self.0
            .iter()
            .zip(candidate.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Render in the `sha256:<hex>` configuration form.
    pub fn to_config_value(&self) -> String {
        format!("{}{}", SHA256_PREFIX, hex::encode(self.0))
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

#[derive(Debug)]
struct UserRecord {
    identity: Identity,
    password: PasswordDigest,
}

/// Table of users that can authenticate.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Replaces any existing user with the same name.
    pub fn insert(&mut self, identity: Identity, password: PasswordDigest) {
        self.users.insert(
            identity.name().to_string(),
            UserRecord { identity, password },
        );
    }

    /// Verify credentials and return the matching identity.
    pub fn authenticate(&self, credentials: &Credentials) -> Option<&Identity> {
        let record = self.users.get(&credentials.username)?;
        record
            .password
            .verify(&credentials.password)
            .then_some(&record.identity)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
