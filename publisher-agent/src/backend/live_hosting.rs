//! Live-hosting manager (A1): a lighter-weight sibling of the manifest
//! upload engine for the live-hosting platform, which wants a plain rsync
//! mirror plus CNAME symlink management rather than per-file task
//! planning. Grounded in the original's `LiveHostingManager` and
//! `LiveHostingRsyncHelper`.

use super::sftp::LiveHostingSftpBackend;
use super::Backend;
use crate::utils::errors::PublishError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Shells out to the system `rsync` over an ssh identity file, matching
/// `LiveHostingRsyncHelper.get_rsync_cmd`. `chmod` runs first so writeable
/// and cache subtrees are group/other-writeable before the mirror lands,
/// since rsync preserves the local permission bits otherwise.
pub struct RsyncHelper {
    hostname: String,
    username: String,
    key_file: PathBuf,
    basedir: PathBuf,
}

impl RsyncHelper {
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        key_file: impl Into<PathBuf>,
        basedir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            key_file: key_file.into(),
            basedir: basedir.into(),
        }
    }

    fn prepare_working_dir(&self, working_dir: &Path, writeable: &[String], cache: &[String]) -> Result<(), PublishError> {
        run_chmod("u+rwX,go+rX,go-w", working_dir, true)?;
        for d in writeable.iter().chain(cache.iter()) {
            run_chmod("go+w", &working_dir.join(d), false)?;
        }
        Ok(())
    }

    fn rsync(&self, working_dir: &Path, live_domain: &str, writeable: &[String]) -> Result<(), PublishError> {
        let dest = self.basedir.join(live_domain);
        let identity = format!("ssh -i {}", self.key_file.display());
        let mut cmd = Command::new("rsync");
        cmd.arg("-rptogc").arg("-e").arg(&identity);
        for w in writeable {
            cmd.arg("--exclude").arg(w);
        }
        cmd.arg(working_dir).arg(format!(
            "{}@{}:{}",
            self.username,
            self.hostname,
            dest.display()
        ));
        debug!(?cmd, "running rsync mirror");
        let status = cmd.status().map_err(|e| PublishError::Transport(format!("rsync spawn failed: {e}")))?;
        if !status.success() {
            return Err(PublishError::Transport(format!("rsync exited with {status}")));
        }
        Ok(())
    }

    pub fn sync(&self, working_dir: &Path, live_domain: &str, writeable: &[String], cache: &[String]) -> Result<(), PublishError> {
        self.prepare_working_dir(working_dir, writeable, cache)?;
        self.rsync(working_dir, live_domain, writeable)
    }
}

fn run_chmod(mode: &str, path: &Path, recursive: bool) -> Result<(), PublishError> {
    let mut cmd = Command::new("chmod");
    if recursive {
        cmd.arg("-R");
    }
    cmd.arg(mode).arg(path);
    let status = cmd.status().map_err(|e| PublishError::Transport(format!("chmod spawn failed: {e}")))?;
    if !status.success() {
        return Err(PublishError::Transport(format!("chmod exited with {status}")));
    }
    Ok(())
}

pub struct LiveHostingManager {
    live_domain: String,
    live_cname: Option<String>,
    sftp: LiveHostingSftpBackend,
    rsync: RsyncHelper,
}

impl LiveHostingManager {
    pub fn new(
        live_domain: impl Into<String>,
        live_cname: Option<String>,
        sftp: LiveHostingSftpBackend,
        rsync: RsyncHelper,
    ) -> Self {
        Self {
            live_domain: live_domain.into(),
            live_cname: live_cname.filter(|c| !c.is_empty()),
            sftp,
            rsync,
        }
    }

    /// Full publish flow: prepare the base folder and CNAME, then mirror
    /// `working_dir` onto it. A CNAME collision is surfaced immediately
    /// (no-retry); anything else is wrapped as a transport-level error so
    /// the engine retries the whole job.
    pub async fn start(
        &mut self,
        working_dir: &Path,
        writeable_list: &[String],
        cache_list: &[String],
    ) -> Result<(), PublishError> {
        self.prepare().await?;
        self.rsync.sync(working_dir, &self.live_domain, writeable_list, cache_list)
    }

    async fn prepare(&mut self) -> Result<(), PublishError> {
        self.sftp.connect().await?;
        let result = async {
            if !self.sftp.exists(&self.live_domain).await? {
                self.sftp.mkdir(&self.live_domain).await?;
            }
            self.update_cname().await
        }
        .await;
        let _ = self.sftp.quit().await;
        result
    }

    async fn update_cname(&mut self) -> Result<(), PublishError> {
        self.delete_stale_links().await?;

        let Some(cname) = self.live_cname.clone() else {
            return Ok(());
        };

        if !self.sftp.exists(&cname).await? {
            self.sftp.symlink(&self.live_domain, &cname).await?;
        } else if self.sftp.readlink(&cname).await.as_deref() != Some(self.live_domain.as_str()) {
            warn!(cname = %cname, "CNAME already points elsewhere");
            return Err(PublishError::CNameInUse(cname));
        }
        Ok(())
    }

    /// Removes every CNAME symlink pointing at this domain except the
    /// configured one, the same sweep `_delete_links` runs on every
    /// publish so a renamed/removed CNAME doesn't leave an orphaned link.
    async fn delete_stale_links(&mut self) -> Result<(), PublishError> {
        let entries = self.sftp.dir(".").await?;
        for entry in entries {
            let Some(target) = self.sftp.readlink(&entry.name).await else {
                continue;
            };
            if target == self.live_domain && Some(entry.name.as_str()) != self.live_cname.as_deref() {
                info!(link = %entry.name, "deleting stale CNAME symlink");
                let _ = self.sftp.delete_file(&entry.name).await;
            }
        }
        Ok(())
    }

    /// Tears down the live site and every CNAME pointing at it.
    pub async fn delete_all(&mut self) -> Result<(), PublishError> {
        let cname = self.live_cname.take();
        self.sftp.connect().await?;
        let result = async {
            self.delete_stale_links().await?;
            if self.sftp.exists(&self.live_domain).await? {
                self.sftp.erase_directory(&self.live_domain).await?;
                self.sftp.delete_directory(&self.live_domain).await?;
            }
            Ok(())
        }
        .await;
        let _ = self.sftp.quit().await;
        self.live_cname = cname;
        result
    }
}
