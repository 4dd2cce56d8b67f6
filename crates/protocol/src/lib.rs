//! # Timber Protocol Library
//!
//! Wire types shared by the Timber daemon and its clients.
//!
//! ## Overview
//!
//! Every exchange is one newline-terminated JSON [`Request`] answered by one
//! newline-terminated JSON [`Response`]. When the response is
//! [`Response::Stream`], raw file bytes follow until the server closes the
//! connection.
//!
//! ```text
//! client                                server
//!   │  {"credentials":…,"operation":…}\n  │
//!   │ ──────────────────────────────────▶ │
//!   │  {"type":"Stream"}\n                │
//!   │ ◀────────────────────────────────── │
//!   │  raw bytes … (until close)          │
//!   │ ◀────────────────────────────────── │
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{encode_line, Credentials, Operation, Request, TailRequest};
//!
//! let request = Request::new(
//!     Credentials::new("alice", "secret"),
//!     Operation::Tail(TailRequest {
//!         path: "/var/log/syslog".to_string(),
//!         lines: Some(20),
//!         follow: true,
//!     }),
//! );
//! let line = encode_line(&request).unwrap();
//! assert!(line.ends_with(b"\n"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request/response definitions and line codec
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    decode_line, encode_line, CheckResult, Credentials, ErrorCode, ErrorMessage, FileNode,
    HeadRequest, IdentityInfo, Listing, NodeKind, Operation, PathRequest, Request, Response,
    TailRequest, DEFAULT_LINE_COUNT, MAX_REQUEST_LINE,
};
