//! TCP transport for the file access core.
//!
//! The server speaks newline-delimited JSON: each request is one
//! [`protocol::Request`] line and is answered with one [`protocol::Response`]
//! line. A [`protocol::Response::Stream`] header is followed by raw file bytes
//! until the server closes the connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use timber::server::Client;
//! use protocol::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:8080", Credentials::new("alice", "secret")).await?;
//!     let mut stream = client.tail("/var/log/syslog", Some(20), true).await?;
//!     stream.copy_to(&mut tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod handler;
mod listener;

pub use client::{ByteStream, Client, ClientError};
pub use handler::{error_response, handle_connection};
pub use listener::Server;

use std::io;
use std::time::Duration;

use protocol::ProtocolError;

use crate::access::AccessControl;
use crate::config::{Config, ConfigError};

/// State shared by every connection task. Never mutated after startup.
#[derive(Debug, Default)]
pub struct ServerState {
    access: AccessControl,
    follow_timeout: Option<Duration>,
}

impl ServerState {
    pub fn new(access: AccessControl) -> Self {
        Self {
            access,
            follow_timeout: None,
        }
    }

    /// Build users, access groups and limits from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(AccessControl::from_config(config)?)
            .with_follow_timeout(config.server.follow_timeout()))
    }

    /// Deadline after which follow streams are ended.
    pub fn with_follow_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.follow_timeout = timeout;
        self
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn follow_timeout(&self) -> Option<Duration> {
        self.follow_timeout
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
