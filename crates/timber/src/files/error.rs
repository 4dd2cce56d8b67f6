//! Errors shared by the file readers and the tree builder.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;

/// Errors that can occur while serving file content.
#[derive(Debug, Error)]
pub enum FileError {
    /// The caller's patterns do not allow this path.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The operating system refused to open the file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The requested path is a directory, not a file.
    #[error("path is a directory: {0}")]
    IsADirectory(PathBuf),

    /// The line count must be positive.
    #[error("invalid line count {0}: must be a positive integer")]
    InvalidLineCount(i64),

    /// The consumer went away before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FileError>;

impl FileError {
    /// Map an open/stat error for `path` to a specific variant.
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_path_buf()),
            _ => FileError::Io(error),
        }
    }
}

/// Check a requested line count and convert it to `usize`.
pub fn validate_line_count(lines: i64) -> Result<usize> {
    if lines <= 0 {
        return Err(FileError::InvalidLineCount(lines));
    }
    usize::try_from(lines).map_err(|_| FileError::InvalidLineCount(lines))
}

/// Open a regular file for reading.
pub async fn open_file(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| FileError::from_io(path, e))?;
    if metadata.is_dir() {
        return Err(FileError::IsADirectory(path.to_path_buf()));
    }
    File::open(path)
        .await
        .map_err(|e| FileError::from_io(path, e))
}
