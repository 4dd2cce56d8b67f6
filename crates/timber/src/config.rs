//! Configuration management for the Timber daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/timber/config.toml`.
//!
//! Users may be written as tables or in the compact
//! `<user>:<password>@<group>,<group>` form, and access groups either as a
//! list of patterns or as one comma-separated string:
//!
//! ```toml
//! users = ["alice:secret@logs,app"]
//!
//! [access]
//! logs = ["/var/log/*.log", "/var/log/nginx/*"]
//! app = "/srv/app/*.log,/srv/app/current/*"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::PasswordDigest;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("listen must be a socket address such as 127.0.0.1:8080 or :8080, got {0}")]
    InvalidListenAddress(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("invalid user entry {0:?}: expected <user>:<password>@<group>,<group>")]
    InvalidUserEntry(String),

    #[error("user name must not be empty")]
    EmptyUserName,

    #[error("password for user {0} must not be empty")]
    EmptyPassword(String),

    #[error("user {0} is defined more than once")]
    DuplicateUser(String),

    #[error("password hash must be sha256: followed by 64 hex characters, got {0}")]
    InvalidPasswordHash(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Timber daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener configuration.
    pub server: ServerConfig,

    /// Users allowed to authenticate.
    pub users: Vec<UserConfig>,

    /// Access groups: group name to glob patterns.
    pub access: BTreeMap<String, AccessPatterns>,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional log file. Rotated daily; stderr is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: String,

    /// Deadline for follow streams in seconds (0 = no deadline).
    pub follow_timeout_secs: u64,
}

/// A user with credentials and access-group membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "UserEntry")]
pub struct UserConfig {
    /// Unique user name.
    pub name: String,

    /// Plain-text password or `sha256:<hex>` digest.
    pub password: String,

    /// Access-group names, in evaluation order.
    #[serde(default)]
    pub access: Vec<String>,
}

/// On-disk forms accepted for a user.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserEntry {
    Compact(String),
    Table {
        name: String,
        password: String,
        #[serde(default)]
        access: Vec<String>,
    },
}

impl TryFrom<UserEntry> for UserConfig {
    type Error = ConfigError;

    fn try_from(entry: UserEntry) -> Result<Self, Self::Error> {
        match entry {
            UserEntry::Compact(raw) => raw.parse(),
            UserEntry::Table {
                name,
                password,
                access,
            } => Ok(Self {
                name,
                password,
                access,
            }),
        }
    }
}

impl std::str::FromStr for UserConfig {
    type Err = ConfigError;

    /// Parse `<user>:<password>@<group>,<group>`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (credentials, groups) = raw
            .split_once('@')
            .ok_or_else(|| ConfigError::InvalidUserEntry(raw.to_string()))?;
        let (name, password) = credentials
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidUserEntry(raw.to_string()))?;

        if name.is_empty() || password.is_empty() {
            return Err(ConfigError::InvalidUserEntry(raw.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            password: password.to_string(),
            access: split_list(groups),
        })
    }
}

/// Glob patterns of one access group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(from = "PatternsEntry", into = "Vec<String>")]
pub struct AccessPatterns(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternsEntry {
    List(Vec<String>),
    Csv(String),
}

impl From<PatternsEntry> for AccessPatterns {
    fn from(entry: PatternsEntry) -> Self {
        match entry {
            PatternsEntry::List(patterns) => Self(patterns),
            PatternsEntry::Csv(raw) => Self(split_list(&raw)),
        }
    }
}

impl From<AccessPatterns> for Vec<String> {
    fn from(patterns: AccessPatterns) -> Self {
        patterns.0
    }
}

impl From<Vec<String>> for AccessPatterns {
    fn from(patterns: Vec<String>) -> Self {
        Self(patterns)
    }
}

impl Deref for AccessPatterns {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            follow_timeout_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Parse the listen address. A bare `:port` binds all interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let listen = self.listen.trim();
        let candidate = if listen.starts_with(':') {
            format!("0.0.0.0{}", listen)
        } else {
            listen.to_string()
        };
        candidate
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.listen.clone()))
    }

    /// Deadline applied to follow streams, if any.
    pub fn follow_timeout(&self) -> Option<Duration> {
        (self.follow_timeout_secs > 0).then(|| Duration::from_secs(self.follow_timeout_secs))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timber")
        .join("config.toml")
}

impl Config {
    /// A starter configuration with one user and one access group.
    pub fn example() -> Self {
        let mut access = BTreeMap::new();
        access.insert(
            "logs".to_string(),
            AccessPatterns(vec!["/var/log/*.log".to_string()]),
        );
        Self {
            users: vec![UserConfig {
                name: "admin".to_string(),
                password: PasswordDigest::of("change-me").to_config_value(),
                access: vec!["logs".to_string()],
            }],
            access,
            ..Self::default()
        }
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TIMBER_LISTEN: Override the listen address
    /// - TIMBER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(listen) = std::env::var("TIMBER_LISTEN") {
            if !listen.is_empty() {
                tracing::info!("Overriding listen address from environment: {}", listen);
                self.server.listen = listen;
            }
        }

        if let Ok(level) = std::env::var("TIMBER_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen_addr()?;

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.name.is_empty() {
                return Err(ConfigError::EmptyUserName);
            }
            if user.password.is_empty() {
                return Err(ConfigError::EmptyPassword(user.name.clone()));
            }
            if !seen.insert(user.name.as_str()) {
                return Err(ConfigError::DuplicateUser(user.name.clone()));
            }
            PasswordDigest::parse(&user.password)?;
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
        assert_eq!(config.server.listen, DEFAULT_LISTEN);
        assert_eq!(config.server.follow_timeout(), None);
        assert!(config.users.is_empty());
        assert!(config.access.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"
log_file = "/var/log/timber/timber.log"

[server]
listen = "0.0.0.0:9000"
follow_timeout_secs = 3600

[[users]]
name = "alice"
password = "secret"
access = ["logs", "app"]

[[users]]
name = "bob"
password = "hunter2"

[access]
logs = ["/var/log/*.log", "/var/log/nginx/*"]
app = "/srv/app/*.log, /srv/app/current/*"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(
            config.daemon.log_file,
            Some(PathBuf::from("/var/log/timber/timber.log"))
        );
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(
            config.server.follow_timeout(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].access, vec!["logs", "app"]);
        assert!(config.users[1].access.is_empty());
        assert_eq!(
            &*config.access["app"],
            &["/srv/app/*.log", "/srv/app/current/*"]
        );
        assert_eq!(config.access["logs"].len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compact_users() {
        let toml = r#"
users = ["alice:pa:ss@logs, app", "bob:pw@"]
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.users[0].name, "alice");
        assert_eq!(config.users[0].password, "pa:ss");
        assert_eq!(config.users[0].access, vec!["logs", "app"]);
        assert_eq!(config.users[1].name, "bob");
        assert!(config.users[1].access.is_empty());
    }

    #[test]
    fn test_compact_user_errors() {
        assert_eq!(
            "alice:secret".parse::<UserConfig>(),
            Err(ConfigError::InvalidUserEntry("alice:secret".to_string()))
        );
        assert!("alice@logs".parse::<UserConfig>().is_err());
        assert!(":secret@logs".parse::<UserConfig>().is_err());
        assert!("alice:@logs".parse::<UserConfig>().is_err());

        let result = Config::from_toml(r#"users = ["nobody"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_listen() {
        let mut config = Config::default();
        config.server.listen = ":8081".to_string();
        assert_eq!(
            config.server.listen_addr().unwrap(),
            "0.0.0.0:8081".parse::<SocketAddr>().unwrap()
        );
        assert!(config.validate().is_ok());

        config.server.listen = "not an address".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidListenAddress("not an address".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_validate_users() {
        let user = |name: &str, password: &str| UserConfig {
            name: name.to_string(),
            password: password.to_string(),
            access: Vec::new(),
        };

        let mut config = Config::default();
        config.users = vec![user("alice", "a"), user("alice", "b")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateUser("alice".to_string()))
        );

        config.users = vec![user("", "a")];
        assert_eq!(config.validate(), Err(ConfigError::EmptyUserName));

        config.users = vec![user("bob", "")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyPassword("bob".to_string()))
        );

        config.users = vec![user("bob", "sha256:1234")];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPasswordHash(_))
        ));
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
follow_timeout_secs = "forever"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_example() {
        let original = Config::example();
        let toml = original.to_toml().unwrap();
        assert!(toml.contains("[daemon]"));
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[[users]]"));
        assert!(toml.contains("[access]"));

        let loaded = Config::from_toml(&toml).unwrap();
        assert_eq!(original, loaded);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::example();
        original.daemon.log_level = "debug".to_string();
        original.server.follow_timeout_secs = 30;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("timber"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("TIMBER_LISTEN", "127.0.0.1:9999");
        std::env::set_var("TIMBER_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("TIMBER_LISTEN");
        std::env::remove_var("TIMBER_LOG_LEVEL");

        assert_eq!(config.server.listen, "127.0.0.1:9999");
        assert_eq!(config.daemon.log_level, "trace");
    }

    #[test]
    #[serial]
    fn test_env_overrides_ignore_empty() {
        std::env::set_var("TIMBER_LISTEN", "");
        std::env::remove_var("TIMBER_LOG_LEVEL");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("TIMBER_LISTEN");

        assert_eq!(config, Config::default());
    }
}
