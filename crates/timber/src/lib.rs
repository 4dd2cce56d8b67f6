//! # Timber
//!
//! A permission-scoped remote file browser and log tailer.
//!
//! ## Overview
//!
//! Authenticated callers list, read and live-follow files, but only those
//! matched by the glob patterns of their access groups:
//!
//! - **Access control**: resolve a user's groups into patterns and authorize
//!   single paths, with `..` traversal rejected outright
//! - **Line readers**: bounded-memory head and tail, plus whole-file streaming
//! - **Follow**: push bytes appended to a file until the client goes away
//! - **Listings**: merge every pattern match into one ordered tree
//! - **Server**: newline-delimited JSON over TCP, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! request ─► authenticate ─► resolve access ─┬─► authorize ─► head / tail / cat ─► follow
//!                                            └─► tree builder (ls)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timber::{Config, Server, ServerState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let state = ServerState::from_config(&config)?;
//!     let server = Server::bind(config.server.listen_addr()?, state).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`access`]: identities, access groups and path authorization
//! - [`config`]: configuration loading and defaults
//! - [`files`]: head, tail, follow and listing trees
//! - [`server`]: TCP server and client

pub mod access;
pub mod config;
pub mod files;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export access types for convenience
pub use access::{authorize, AccessControl, AccessTable, Identity, ResolvedAccess, UserDirectory};

// Re-export file types for convenience
pub use files::{FileError, FollowStream, TreeBuilder};

// Re-export server types for convenience
pub use server::{ByteStream, Client, ClientError, Server, ServerError, ServerState};
