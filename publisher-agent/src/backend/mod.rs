//! The `Backend` trait: a polymorphic connection-oriented remote file
//! system, implemented by the FTP/FTPS and SFTP backends.
//!
//! Every method takes `&mut self` because a backend owns a single
//! connection and must serialize operations against it; concurrency across
//! destinations is achieved by running independent backend instances, not
//! by sharing one.

pub mod factory;
pub mod ftp;
pub mod legacy;
pub mod list_parser;
pub mod live_hosting;
pub mod retry;
pub mod sftp;

use crate::utils::errors::PublishError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Directory,
}

/// A single entry as returned by a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteKind,
    pub size: u64,
}

/// Connection-oriented operations a remote publish destination must
/// support. Paths are always relative to the destination's configured base
/// directory.
#[async_trait]
pub trait Backend: Send {
    /// (Re)establish the underlying connection.
    async fn connect(&mut self) -> Result<(), PublishError>;

    /// Cleanly close the connection.
    async fn quit(&mut self) -> Result<(), PublishError>;

    async fn exists(&mut self, path: &str) -> Result<bool, PublishError>;

    /// List the immediate children of a remote directory.
    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError>;

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError>;

    async fn size(&mut self, path: &str) -> Result<u64, PublishError>;

    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError>;

    async fn upload(&mut self, local_path: &std::path::Path, remote_path: &str) -> Result<(), PublishError>;

    async fn download(&mut self, remote_path: &str, local_path: &std::path::Path) -> Result<(), PublishError>;

    /// Delete a file. Returns `false` (not an error) when the server
    /// rejects the delete at the protocol level - the caller marks the
    /// entry `old` and retries on the next run rather than aborting.
    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError>;

    /// Delete an empty directory. Callers are responsible for ensuring the
    /// directory has no remaining children. Returns `false` on a
    /// protocol-level rejection, the same way `delete_file` does.
    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError>;

    /// Recursively delete every file and sub-directory under `path` without
    /// removing `path` itself. Used before re-uploading a `c`-class folder
    /// whose permission just changed. Returns `true` iff `path` is empty
    /// afterwards; per-entry failures are absorbed rather than aborting the
    /// whole walk.
    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError>;

    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError>;
}

/// Lets a boxed trait object flow through [`retry::RetryingBackend`] and
/// the engine, which are both generic over `B: Backend` rather than
/// hand-written against a concrete type.
#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn connect(&mut self) -> Result<(), PublishError> {
        (**self).connect().await
    }
    async fn quit(&mut self) -> Result<(), PublishError> {
        (**self).quit().await
    }
    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        (**self).exists(path).await
    }
    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        (**self).dir(path).await
    }
    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        (**self).kind(path).await
    }
    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        (**self).size(path).await
    }
    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        (**self).mkdir(path).await
    }
    async fn upload(&mut self, local_path: &std::path::Path, remote_path: &str) -> Result<(), PublishError> {
        (**self).upload(local_path, remote_path).await
    }
    async fn download(&mut self, remote_path: &str, local_path: &std::path::Path) -> Result<(), PublishError> {
        (**self).download(remote_path, local_path).await
    }
    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        (**self).delete_file(path).await
    }
    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        (**self).delete_directory(path).await
    }
    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        (**self).erase_directory(path).await
    }
    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError> {
        (**self).chmod(path, mode).await
    }
}
