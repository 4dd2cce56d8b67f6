//! File access for authorized callers.
//!
//! This module provides the bounded I/O behind every operation:
//! - Head and tail line readers with bounded memory
//! - Live follow of appended data with truncation handling
//! - Listing trees built from glob expansion
//!
//! Nothing here checks permissions; callers gate every path through
//! [`crate::access::authorize`] first.

pub mod error;
pub mod follow;
pub mod reader;
pub mod tree;

pub use error::{open_file, validate_line_count, FileError, Result};
pub use follow::{FollowStream, FOLLOW_POLL_INTERVAL};
pub use reader::{copy_all, head, tail, HeadLines, TailLines, TAIL_BLOCK_SIZE};
pub use tree::{list, TreeBuilder};
