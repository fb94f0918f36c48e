//! Remote file server transport
//!
//! [`RemoteSession`] is a thin, failure-transparent transport: it reports
//! errors exactly as they happen and never retries. Retrying is the job of
//! [`RetryExecutor`](crate::retry::RetryExecutor) at the call sites.
//!
//! Implementations:
//! - [`SftpSession`] - SFTP over one authenticated SSH connection
//! - [`MemoryRemote`] - in-memory tree with fault injection, for dry runs and tests

use crate::error::Result;
use crate::types::RemotePath;
use async_trait::async_trait;

mod memory;
mod sftp;

pub use memory::{FaultKind, MemoryRemote};
pub use sftp::SftpSession;

/// One entry returned by a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Absolute path of the entry
    pub path: RemotePath,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl RemoteEntry {
    /// A regular file entry
    pub fn file(path: impl Into<RemotePath>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// A directory entry
    pub fn dir(path: impl Into<RemotePath>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Connection to the remote file server
///
/// Implementations must be safe to share between workers. Whether calls run in
/// parallel or are serialized internally is up to the implementation.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// List the immediate children of `path` (never `.` or `..`)
    async fn list(&self, path: &RemotePath) -> Result<Vec<RemoteEntry>>;

    /// Read the whole content of the file at `path`
    async fn fetch(&self, path: &RemotePath) -> Result<Vec<u8>>;

    /// Delete the file at `path`
    async fn remove(&self, path: &RemotePath) -> Result<()>;

    /// Release the connection; calling it again is a no-op
    async fn close(&self) -> Result<()>;
}
