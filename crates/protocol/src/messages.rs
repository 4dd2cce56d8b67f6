//! Protocol message definitions for Timber.
//!
//! Requests and response headers travel as single JSON objects terminated by
//! a newline. A [`Response::Stream`] header is followed by raw file bytes until
//! the server closes the connection.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Line count used when a head/tail request does not specify one.
pub const DEFAULT_LINE_COUNT: i64 = 10;

/// Maximum accepted length of a single request line in bytes.
pub const MAX_REQUEST_LINE: usize = 64 * 1024;

/// A single client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Caller credentials, verified before the operation runs.
    pub credentials: Credentials,
    /// The operation to perform.
    pub operation: Operation,
}

impl Request {
    /// Create a new request.
    pub fn new(credentials: Credentials, operation: Operation) -> Self {
        Self {
            credentials,
            operation,
        }
    }
}

/// Username and password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Operations a client can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Operation {
    /// Describe the authenticated identity and its resolved access patterns.
    Me,
    /// Ask whether a path is readable without opening it.
    Check(PathRequest),
    /// List every entry matched by the caller's access patterns.
    List,
    /// Stream the first lines of a file.
    Head(HeadRequest),
    /// Stream the last lines of a file, optionally following appends.
    Tail(TailRequest),
    /// Stream a whole file.
    Cat(PathRequest),
}

impl Operation {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Me => "me",
            Operation::Check(_) => "check",
            Operation::List => "ls",
            Operation::Head(_) => "head",
            Operation::Tail(_) => "tail",
            Operation::Cat(_) => "cat",
        }
    }

    /// Target path of single-file operations.
    pub fn path(&self) -> Option<&str> {
        match self {
            Operation::Check(req) | Operation::Cat(req) => Some(&req.path),
            Operation::Head(req) => Some(&req.path),
            Operation::Tail(req) => Some(&req.path),
            Operation::Me | Operation::List => None,
        }
    }
}

/// Request carrying only a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

/// Request for the first lines of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRequest {
    /// File to read.
    pub path: String,
    /// Number of lines; [`DEFAULT_LINE_COUNT`] when absent. Must be positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<i64>,
}

impl HeadRequest {
    /// Requested line count with the default applied.
    pub fn line_count(&self) -> i64 {
        self.lines.unwrap_or(DEFAULT_LINE_COUNT)
    }
}

/// Request for the last lines of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailRequest {
    /// File to read.
    pub path: String,
    /// Number of lines; [`DEFAULT_LINE_COUNT`] when absent. Must be positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<i64>,
    /// Keep streaming appended bytes after the initial lines.
    #[serde(default)]
    pub follow: bool,
}

impl TailRequest {
    /// Requested line count with the default applied.
    pub fn line_count(&self) -> i64 {
        self.lines.unwrap_or(DEFAULT_LINE_COUNT)
    }
}

/// Response header sent for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    /// Answer to [`Operation::Me`].
    Identity(IdentityInfo),
    /// Answer to [`Operation::Check`].
    Check(CheckResult),
    /// Answer to [`Operation::List`].
    Listing(Listing),
    /// Raw file bytes follow this header until the connection closes.
    Stream,
    /// The request failed.
    Error(ErrorMessage),
}

impl Response {
    /// Build an error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error(ErrorMessage {
            code,
            message: message.into(),
        })
    }
}

/// Authenticated identity as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// User name.
    pub name: String,
    /// Resolved glob patterns, in evaluation order.
    pub access: Vec<String>,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub path: String,
    pub allowed: bool,
}

/// Hierarchical listing of the caller's accessible entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Listing {
    /// Top-level nodes, directories first then by name.
    pub nodes: Vec<FileNode>,
}

/// Kind of a listing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Final path segment.
    pub name: String,
    /// Full path; present only on nodes that were matched by a pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Size in bytes; for directories the sum of their children.
    pub size: u64,
    /// Child nodes, directories first then by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follow a `/`-separated chain of child names.
    pub fn descend(&self, relative: &str) -> Option<&FileNode> {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }
}

impl Listing {
    /// Find a node by its segments from the top level, e.g. `"var/log/app.log"`.
    pub fn find(&self, path: &str) -> Option<&FileNode> {
        let path = path.trim_start_matches('/');
        let (first, rest) = path.split_once('/').unwrap_or((path, ""));
        self.nodes
            .iter()
            .find(|n| n.name == first)?
            .descend(rest)
    }
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Missing or invalid credentials.
    Unauthorized,
    /// The path is outside the caller's access, or the OS denied access.
    PermissionDenied,
    /// Resource not found.
    NotFound,
    /// Invalid request or parameters.
    InvalidRequest,
    /// Server-side error.
    Internal,
}

// ============================================================================
// Serialization helpers
// ============================================================================

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a message from a JSON line, tolerating the trailing newline.
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &[u8]) -> Result<T> {
    if line.len() > MAX_REQUEST_LINE {
        return Err(ProtocolError::LineTooLong {
            size: line.len(),
            max: MAX_REQUEST_LINE,
        });
    }
    let trimmed = line.trim_ascii_end();
    if trimmed.is_empty() {
        return Err(ProtocolError::Deserialization("empty line".to_string()));
    }
    Ok(serde_json::from_slice(trimmed)?)
}
