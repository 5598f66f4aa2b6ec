//! SFTP backend (C5), built on `ssh2`'s blocking API the same way
//! `backend::ftp` uses `suppaftp`'s - called directly from async fn
//! bodies, no `spawn_blocking`.
//!
//! [`SftpBackend`] supports password and private-key auth, matching the
//! original's `SFTPUploadBackEnd`/`PKeySFTPUploadBackEnd` split.
//! [`LiveHostingSftpBackend`] adds the symlink operations the live-hosting
//! manager (A1) needs and has no caching layer of its own - the live
//! hosting tree is small enough that an uncached listing is plenty fast.

use super::{Backend, RemoteEntry, RemoteKind};
use crate::utils::errors::PublishError;
use async_trait::async_trait;
use ssh2::{Session, Sftp};
use std::collections::HashMap;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

fn sftp_err(context: &str, err: impl std::fmt::Display) -> PublishError {
    PublishError::Transport(format!("{context}: {err}"))
}

/// True for libssh2's `LIBSSH2_FX_NO_SUCH_FILE` (SFTP status code 2), as
/// opposed to a dropped session or other transport failure. Only this case
/// should ever be folded into a `false`/empty result - everything else must
/// propagate so `RetryingBackend` gets the `Err` it reconnects on.
fn sftp_not_found(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::SFTP(2))
}

pub enum SftpAuth {
    Password(String),
    PrivateKey { key_path: PathBuf, passphrase: Option<String> },
}

/// SFTP connection plus the destination's base directory and permission
/// map. `path()` mirrors the original's `_path`: a path already rooted at
/// `basedir` is passed through untouched.
pub struct SftpBackend {
    host: String,
    port: u16,
    username: String,
    auth: SftpAuth,
    basedir: String,
    permission_map: HashMap<String, String>,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SftpBackend {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: SftpAuth,
        basedir: impl Into<String>,
        permission_map: HashMap<String, String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            basedir: basedir.into(),
            permission_map,
            session: None,
            sftp: None,
        }
    }

    pub(super) fn path(&self, path: &str) -> PathBuf {
        if path.starts_with(&self.basedir) {
            PathBuf::from(path)
        } else {
            Path::new(&self.basedir).join(path)
        }
    }

    fn sftp(&self) -> Result<&Sftp, PublishError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| PublishError::Transport("not connected".into()))
    }
}

#[async_trait]
impl Backend for SftpBackend {
    async fn connect(&mut self) -> Result<(), PublishError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| sftp_err("TCP connect", e))?;
        let mut session = Session::new().map_err(|e| sftp_err("session init", e))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| sftp_err("SSH handshake", e))?;

        match &self.auth {
            SftpAuth::Password(password) => session
                .userauth_password(&self.username, password)
                .map_err(|e| PublishError::Auth(e.to_string()))?,
            SftpAuth::PrivateKey { key_path, passphrase } => session
                .userauth_pubkey_file(&self.username, None, key_path, passphrase.as_deref())
                .map_err(|e| PublishError::Auth(e.to_string()))?,
        }

        let sftp = session.sftp().map_err(|e| sftp_err("sftp subsystem", e))?;
        self.session = Some(session);
        self.sftp = Some(sftp);
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), PublishError> {
        self.sftp = None;
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "done", None);
        }
        Ok(())
    }

    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        match self.kind(path).await {
            Ok(_) => Ok(true),
            Err(PublishError::DoesNotExist(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        let target = self.path(path);
        let entries = match self.sftp()?.readdir(&target) {
            Ok(entries) => entries,
            Err(e) if sftp_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(sftp_err("readdir", e)),
        };
        Ok(entries
            .into_iter()
            .filter_map(|(p, stat)| {
                let name = p.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                let kind = if stat.is_dir() {
                    RemoteKind::Directory
                } else {
                    RemoteKind::File
                };
                Some(RemoteEntry {
                    name,
                    kind,
                    size: stat.size.unwrap_or(0),
                })
            })
            .collect())
    }

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        let target = self.path(path);
        let stat = self.sftp()?.stat(&target).map_err(|e| {
            if sftp_not_found(&e) {
                PublishError::DoesNotExist(path.to_string())
            } else {
                sftp_err("stat", e)
            }
        })?;
        Ok(if stat.is_dir() {
            RemoteKind::Directory
        } else {
            RemoteKind::File
        })
    }

    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        let target = self.path(path);
        self.sftp()?
            .stat(&target)
            .map_err(|e| sftp_err("stat", e))?
            .size
            .ok_or_else(|| PublishError::Other(format!("no size reported for {path}")))
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        let target = self.path(path);
        self.sftp()?.mkdir(&target, 0o755).map_err(|e| sftp_err("mkdir", e))
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
        use std::io::{Read, Write};
        let target = self.path(remote_path);
        let mut local = std::fs::File::open(local_path)?;
        let mut remote = self.sftp()?.create(&target).map_err(|e| sftp_err("create", e))?;
        let mut buf = Vec::new();
        local.read_to_end(&mut buf)?;
        remote.write_all(&buf).map_err(|e| sftp_err("write", e))?;
        Ok(())
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
        use std::io::{Read, Write};
        let target = self.path(remote_path);
        let mut remote = self.sftp()?.open(&target).map_err(|e| sftp_err("open", e))?;
        let mut buf = Vec::new();
        remote.read_to_end(&mut buf).map_err(|e| sftp_err("read", e))?;
        let mut local = std::fs::File::create(local_path)?;
        local.write_all(&buf)?;
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        let target = self.path(path);
        Ok(self.sftp()?.unlink(&target).is_ok())
    }

    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        let target = self.path(path);
        Ok(self.sftp()?.rmdir(&target).is_ok())
    }

    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        let mut result = true;
        let entries = self.dir(path).await?;
        for entry in entries {
            let child = if path.is_empty() {
                entry.name.clone()
            } else {
                format!("{path}/{}", entry.name)
            };
            if entry.kind == RemoteKind::Directory {
                let ok = self.erase_directory(&child).await.unwrap_or(false);
                result = result && ok;
                if !self.delete_directory(&child).await.unwrap_or(false) {
                    result = false;
                }
            } else if !self.delete_file(&child).await.unwrap_or(false) {
                result = false;
            }
        }
        Ok(result)
    }

    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError> {
        let Some(chmod) = self.permission_map.get(mode) else {
            return Ok(());
        };
        let octal = u32::from_str_radix(chmod, 8)
            .map_err(|e| PublishError::Other(format!("invalid chmod mode {chmod}: {e}")))?;
        let target = self.path(path);
        let mut stat = self.sftp()?.stat(&target).map_err(|e| sftp_err("stat", e))?;
        stat.perm = Some(octal);
        self.sftp()?.setstat(&target, stat).map_err(|e| sftp_err("setstat", e))
    }
}

/// Adds the symlink primitives the live-hosting manager uses to point a
/// CNAME at a site's live-hosting folder.
pub struct LiveHostingSftpBackend {
    inner: SftpBackend,
}

impl LiveHostingSftpBackend {
    pub fn new(inner: SftpBackend) -> Self {
        Self { inner }
    }

    /// Create a symlink `dest -> source`, both relative to the base
    /// directory.
    pub async fn symlink(&mut self, source: &str, dest: &str) -> Result<(), PublishError> {
        let source = self.inner.path(source);
        let dest = self.inner.path(dest);
        self.inner
            .sftp()?
            .symlink(&source, &dest)
            .map_err(|e| sftp_err("symlink", e))
    }

    /// Returns the symlink target's base name, or `None` if `path` isn't
    /// a symlink (mirrors the original's swallow-all-errors `readlink`).
    pub async fn readlink(&mut self, path: &str) -> Option<String> {
        let target = self.inner.path(path);
        let resolved = self.inner.sftp().ok()?.readlink(&target).ok()?;
        resolved.file_name().map(|n| n.to_string_lossy().to_string())
    }
}

#[async_trait]
impl Backend for LiveHostingSftpBackend {
    async fn connect(&mut self) -> Result<(), PublishError> {
        self.inner.connect().await
    }
    async fn quit(&mut self) -> Result<(), PublishError> {
        self.inner.quit().await
    }
    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        self.inner.exists(path).await
    }
    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        self.inner.dir(path).await
    }
    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        self.inner.kind(path).await
    }
    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        self.inner.size(path).await
    }
    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        self.inner.mkdir(path).await
    }
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
        self.inner.upload(local_path, remote_path).await
    }
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
        self.inner.download(remote_path, local_path).await
    }
    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        self.inner.delete_file(path).await
    }
    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        self.inner.delete_directory(path).await
    }
    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        self.inner.erase_directory(path).await
    }
    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError> {
        self.inner.chmod(path, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_passes_through_paths_already_rooted_at_basedir() {
        let backend = SftpBackend::new(
            "host",
            22,
            "user",
            SftpAuth::Password("pw".into()),
            "/srv/sites/example",
            HashMap::new(),
        );
        assert_eq!(
            backend.path("/srv/sites/example/index.html"),
            PathBuf::from("/srv/sites/example/index.html")
        );
        assert_eq!(
            backend.path("index.html"),
            PathBuf::from("/srv/sites/example/index.html")
        );
    }
}
