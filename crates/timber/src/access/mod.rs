//! Identity resolution and path authorization.
//!
//! This module turns an authenticated caller into a list of glob patterns and
//! decides whether a single path may be read:
//! - [`AccessTable::resolve`] flattens an identity's access groups
//! - [`authorize`] checks one candidate path against the flattened list
//! - [`UserDirectory`] verifies credentials (the authentication collaborator)
//!
//! # Security
//!
//! Any candidate path containing a `..` segment is denied before patterns are
//! evaluated. Wildcards never match across a path separator.

pub mod authorizer;
pub mod credentials;
pub mod identity;
pub mod pattern;

pub use authorizer::{authorize, contains_traversal, evaluate, Decision};
pub use credentials::{PasswordDigest, UserDirectory};
pub use identity::{AccessGroup, AccessTable, Identity, ResolvedAccess};

use protocol::Credentials;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};

/// Immutable users and access groups shared by every connection.
#[derive(Debug, Default)]
pub struct AccessControl {
    users: UserDirectory,
    table: AccessTable,
}

impl AccessControl {
    /// Assemble from already-built parts.
    pub fn new(users: UserDirectory, table: AccessTable) -> Self {
        Self { users, table }
    }

    /// Build the tables from configuration.
    ///
    /// Users that reference unknown groups, or resolve to no patterns at all,
    /// are reported but still loaded; they simply cannot read anything.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let table = AccessTable::new(
            config
                .access
                .iter()
                .map(|(name, patterns)| AccessGroup::new(name.clone(), patterns.to_vec())),
        );

        let mut users = UserDirectory::new();
        for user in &config.users {
            let identity = Identity::new(user.name.clone(), user.access.clone());

            let unknown = table.unknown_groups(&identity);
            if !unknown.is_empty() {
                warn!(
                    user = %user.name,
                    groups = ?unknown,
                    "user references unknown access groups"
                );
            }
            if table.resolve(&identity).is_empty() {
                warn!(user = %user.name, "user has no resolvable access patterns");
            }

            users.insert(identity, PasswordDigest::parse(&user.password)?);
        }

        for (group, patterns) in &config.access {
            for raw in patterns.iter() {
                if let Err(e) = pattern::compile(raw) {
                    warn!(group = %group, pattern = %raw, error = %e, "invalid glob pattern");
                }
            }
        }

        info!(
            users = users.len(),
            groups = table.len(),
            "Loaded access control tables"
        );
        Ok(Self { users, table })
    }

    /// Verify credentials and return the caller's identity.
    pub fn authenticate(&self, credentials: &Credentials) -> Option<&Identity> {
        self.users.authenticate(credentials)
    }

    /// Resolve an identity's patterns for one request.
    pub fn resolve(&self, identity: &Identity) -> ResolvedAccess {
        self.table.resolve(identity)
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn table(&self) -> &AccessTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
users = ["alice:secret@logs,missing", "bob:hunter2@"]

[access]
logs = ["/var/log/*.log", "/var/log/[bad"]
app = "/srv/app/*"
"#;

    #[test]
    fn test_from_config() {
        let config = Config::from_toml(CONFIG).unwrap();
        let control = AccessControl::from_config(&config).unwrap();

        assert_eq!(control.users().len(), 2);
        assert_eq!(control.table().len(), 2);

        let alice = control
            .authenticate(&Credentials::new("alice", "secret"))
            .unwrap();
        let access = control.resolve(alice);
        assert_eq!(access.patterns(), &["/var/log/*.log", "/var/log/[bad"]);
        assert!(authorize(&access, "/var/log/syslog.log"));
        assert!(!authorize(&access, "/srv/app/x"));
    }

    #[test]
    fn test_user_without_groups_has_no_access() {
        let config = Config::from_toml(CONFIG).unwrap();
        let control = AccessControl::from_config(&config).unwrap();

        let bob = control
            .authenticate(&Credentials::new("bob", "hunter2"))
            .unwrap();
        let access = control.resolve(bob);
        assert!(access.is_empty());
        assert!(!authorize(&access, "/var/log/syslog.log"));
        assert!(!authorize(&access, "/srv/app/x"));
    }

    #[test]
    fn test_bad_password_hash_is_rejected() {
        let config = Config::from_toml(
            r#"
[[users]]
name = "carol"
password = "sha256:zz"
"#,
        )
        .unwrap();
        assert!(matches!(
            AccessControl::from_config(&config),
            Err(ConfigError::InvalidPasswordHash(_))
        ));
    }
}
