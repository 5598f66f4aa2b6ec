//! FTP/FTPS backend (C4), layered plain -> cached -> boosted exactly the
//! way the original's `FTPUploadBackEnd` -> `CachedFTPUploadBackEnd` ->
//! `BoostedFTPUploadBackEnd` chain does, but via composition instead of
//! inheritance: each layer wraps the one below it rather than overriding
//! its methods.
//!
//! `suppaftp`'s client is a blocking, synchronous API. We call it directly
//! from inside these `async fn` bodies rather than wrapping every call in
//! `spawn_blocking` - acceptable here because a publish job owns its
//! connection exclusively and nothing else on the runtime is waiting on
//! this task to yield.

use super::list_parser::{parse_list_output, ListEntry};
use super::{Backend, RemoteEntry, RemoteKind};
use crate::utils::errors::PublishError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use suppaftp::{FtpStream, RustlsConnector, RustlsFtpStream};
use tracing::debug;

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}

fn ftp_err(context: &str, err: impl std::fmt::Display) -> PublishError {
    PublishError::Transport(format!("{context}: {err}"))
}

/// True for the protocol-level "no such file or directory" response (550),
/// as opposed to a dropped connection or other transport failure. Only this
/// case should ever be folded into a `false`/empty result - everything else
/// must propagate so `RetryingBackend` gets the `Err` it reconnects on.
fn ftp_not_found(err: &suppaftp::FtpError) -> bool {
    matches!(
        err,
        suppaftp::FtpError::UnexpectedResponse(resp) if resp.status == suppaftp::Status::FileUnavailable
    )
}

/// A single FTPS connection plus the destination's base directory and
/// chmod permission-class -> mode mapping.
pub struct FtpBackend {
    host: String,
    port: u16,
    username: String,
    password: String,
    basedir: String,
    permission_map: HashMap<String, String>,
    stream: Option<RustlsFtpStream>,
}

impl FtpBackend {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        basedir: impl Into<String>,
        permission_map: HashMap<String, String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            basedir: basedir.into(),
            permission_map,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut RustlsFtpStream, PublishError> {
        self.stream
            .as_mut()
            .ok_or_else(|| PublishError::Transport("not connected".into()))
    }

    fn cwd_to(&mut self, dir: &str) -> Result<(), PublishError> {
        let base = self.basedir.clone();
        let target = if dir.is_empty() {
            base
        } else {
            format!("{base}/{dir}")
        };
        self.stream()?.cwd(&target).map_err(|e| {
            if ftp_not_found(&e) {
                PublishError::DoesNotExist(target.clone())
            } else {
                ftp_err("cwd", e)
            }
        })
    }

    /// Uncached directory listing: the `_list` method in the original. A
    /// folder that doesn't exist on the remote yields an empty list rather
    /// than an error; any other failure (a dropped connection, a LIST that
    /// fails after a successful `cwd`) propagates so the caller can tell it
    /// apart from "not found".
    pub fn list_folder(&mut self, folder: &str) -> Result<Vec<ListEntry>, PublishError> {
        match self.cwd_to(folder) {
            Ok(()) => {}
            Err(PublishError::DoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        let lines = self.stream()?.list(None).map_err(|e| ftp_err("LIST", e))?;
        Ok(parse_list_output(&lines.join("\n")))
    }
}

#[async_trait]
impl Backend for FtpBackend {
    async fn connect(&mut self) -> Result<(), PublishError> {
        debug!(host = %self.host, port = self.port, "connecting to FTPS backend");
        let plain =
            FtpStream::connect((self.host.as_str(), self.port)).map_err(|e| ftp_err("connect", e))?;
        let mut secure = plain
            .into_secure(RustlsConnector::default(), &self.host)
            .map_err(|e| ftp_err("TLS handshake", e))?;
        secure
            .login(&self.username, &self.password)
            .map_err(|e| ftp_err("login", e))?;
        secure
            .transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| ftp_err("TYPE I", e))?;
        self.stream = Some(secure);
        self.cwd_to("")?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), PublishError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit();
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
        Ok(self
            .list_folder(path)?
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .map(|e| RemoteEntry {
                name: e.name,
                kind: e.kind,
                size: e.size,
            })
            .collect())
    }

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        let (dir, name) = split_path(path);
        self.list_folder(dir)?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| PublishError::DoesNotExist(path.to_string()))
    }

    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        let (dir, name) = split_path(path);
        self.cwd_to(dir)?;
        self.stream()?
            .size(name)
            .map(|s| s as u64)
            .map_err(|e| ftp_err("SIZE", e))
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        let (dir, name) = split_path(path);
        self.cwd_to(dir)?;
        self.stream()?.mkdir(name).map_err(|e| ftp_err("MKD", e))
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
        let (dir, name) = split_path(remote_path);
        self.cwd_to(dir)?;
        let mut file = std::fs::File::open(local_path)?;
        self.stream()?
            .put_file(name, &mut file)
            .map_err(|e| ftp_err("STOR", e))?;
        Ok(())
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
        let (dir, name) = split_path(remote_path);
        self.cwd_to(dir)?;
        let mut out = std::fs::File::create(local_path)?;
        self.stream()?
            .retr(name, |reader| {
                std::io::copy(reader, &mut out).map_err(suppaftp::FtpError::ConnectionError)
            })
            .map_err(|e| ftp_err("RETR", e))?;
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        let (dir, name) = split_path(path);
        self.cwd_to(dir)?;
        Ok(self.stream()?.rm(name).is_ok())
    }

    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        let (dir, name) = split_path(path);
        self.cwd_to(dir)?;
        Ok(self.stream()?.rmdir(name).is_ok())
    }

    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        let mut result = true;
        let entries = self.list_folder(path)?;
        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let child = if path.is_empty() {
                entry.name.clone()
            } else {
                format!("{path}/{}", entry.name)
            };
            if entry.kind == RemoteKind::Directory {
                let ok = self.erase_directory(&child).await.unwrap_or(false);
                result = result && ok;
                if self.delete_directory(&child).await.unwrap_or(false) {
                    // removed
                } else {
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
        let (dir, name) = split_path(path);
        self.cwd_to(dir)?;
        self.stream()?
            .site(&format!("CHMOD {chmod} {name}"))
            .map_err(|e| ftp_err("SITE CHMOD", e))
    }
}

/// Caches [`FtpBackend::list_folder`] results per folder so a task-list
/// build only ever lists a given remote folder once, invalidating the
/// whole cache whenever a mutating operation runs.
pub struct CachedFtpBackend {
    inner: FtpBackend,
    cache: HashMap<String, Vec<ListEntry>>,
}

impl CachedFtpBackend {
    pub fn new(inner: FtpBackend) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    fn invalidate(&mut self) {
        self.cache.clear();
    }

    fn list_folder(&mut self, folder: &str) -> Result<Vec<ListEntry>, PublishError> {
        if let Some(cached) = self.cache.get(folder) {
            return Ok(cached.clone());
        }
        let entries = self.inner.list_folder(folder)?;
        self.cache.insert(folder.to_string(), entries.clone());
        Ok(entries)
    }
}

#[async_trait]
impl Backend for CachedFtpBackend {
    async fn connect(&mut self) -> Result<(), PublishError> {
        self.invalidate();
        self.inner.connect().await
    }

    async fn quit(&mut self) -> Result<(), PublishError> {
        self.inner.quit().await
    }

    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        match self.kind(path).await {
            Ok(_) => Ok(true),
            Err(PublishError::DoesNotExist(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        Ok(self
            .list_folder(path)?
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .map(|e| RemoteEntry {
                name: e.name,
                kind: e.kind,
                size: e.size,
            })
            .collect())
    }

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        let (dir, name) = split_path(path);
        self.list_folder(dir)?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| PublishError::DoesNotExist(path.to_string()))
    }

    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        self.inner.size(path).await
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        self.invalidate();
        self.inner.mkdir(path).await
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
        self.invalidate();
        self.inner.upload(local_path, remote_path).await
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
        self.inner.download(remote_path, local_path).await
    }

    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        self.invalidate();
        self.inner.delete_file(path).await
    }

    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        self.invalidate();
        self.inner.delete_directory(path).await
    }

    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        self.invalidate();
        self.inner.erase_directory(path).await
    }

    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError> {
        self.inner.chmod(path, mode).await
    }
}

/// Lists parent folders top-down before the folder actually being
/// listed, so a miss on a shallow ancestor short-circuits the whole
/// lookup instead of paying for a `LIST` on every level of a path that
/// doesn't exist at all. Worthwhile on servers where each `LIST` is slow.
pub struct BoostedFtpBackend {
    inner: CachedFtpBackend,
}

impl BoostedFtpBackend {
    pub fn new(inner: CachedFtpBackend) -> Self {
        Self { inner }
    }

    fn list_folder(&mut self, folder: &str) -> Result<Vec<ListEntry>, PublishError> {
        let mut current = String::new();
        let mut entries = Vec::new();
        for segment in folder.split('/').filter(|s| !s.is_empty()) {
            current = if current.is_empty() {
                segment.to_string()
            } else {
                format!("{current}/{segment}")
            };
            entries = self.inner.list_folder(&current)?;
            if entries.is_empty() {
                return Ok(Vec::new());
            }
        }
        if folder.is_empty() {
            return self.inner.list_folder("");
        }
        Ok(entries)
    }
}

#[async_trait]
impl Backend for BoostedFtpBackend {
    async fn connect(&mut self) -> Result<(), PublishError> {
        self.inner.connect().await
    }

    async fn quit(&mut self) -> Result<(), PublishError> {
        self.inner.quit().await
    }

    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        match self.kind(path).await {
            Ok(_) => Ok(true),
            Err(PublishError::DoesNotExist(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        Ok(self
            .list_folder(path)?
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .map(|e| RemoteEntry {
                name: e.name,
                kind: e.kind,
                size: e.size,
            })
            .collect())
    }

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        let (dir, name) = split_path(path);
        self.list_folder(dir)?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| PublishError::DoesNotExist(path.to_string()))
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
    fn splits_path_into_dir_and_name() {
        assert_eq!(split_path("a/b/c.html"), ("a/b", "c.html"));
        assert_eq!(split_path("index.html"), ("", "index.html"));
    }
}
