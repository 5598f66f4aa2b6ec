//! Builds a connection-ready backend from a destination profile. The
//! manifest engine only ever sees `&mut dyn Backend`, so every variant is
//! boxed and wrapped in [`retry::RetryingBackend`] uniformly here rather
//! than at each call site.

use super::ftp::{BoostedFtpBackend, CachedFtpBackend, FtpBackend};
use super::live_hosting::{LiveHostingManager, RsyncHelper};
use super::retry::RetryingBackend;
use super::sftp::{LiveHostingSftpBackend, SftpAuth, SftpBackend};
use super::Backend;
use crate::config::{DestinationConfig, LiveHostingDestinationConfig};
use crate::utils::errors::PublishError;

/// Build the `Backend` a publish job should upload through for every
/// destination kind except `live_hosting`, which has its own entry point
/// in [`build_live_hosting_manager`].
pub fn build_backend(dest: &DestinationConfig) -> Result<RetryingBackend<Box<dyn Backend>>, PublishError> {
    let boxed: Box<dyn Backend> = match dest {
        DestinationConfig::Ftp(cfg) | DestinationConfig::Ftps(cfg) => {
            let plain = FtpBackend::new(
                cfg.host.clone(),
                cfg.port,
                cfg.username.clone(),
                cfg.password.clone(),
                cfg.basedir.clone(),
                cfg.permission_map.clone(),
            );
            Box::new(BoostedFtpBackend::new(CachedFtpBackend::new(plain)))
        }
        DestinationConfig::Sftp(cfg) => {
            let auth = sftp_auth(cfg.password.as_deref(), cfg.private_key_path.as_deref(), cfg.private_key_passphrase.as_deref())?;
            Box::new(SftpBackend::new(
                cfg.host.clone(),
                cfg.port,
                cfg.username.clone(),
                auth,
                cfg.basedir.clone(),
                cfg.permission_map.clone(),
            ))
        }
        DestinationConfig::LiveHosting(_) => {
            return Err(PublishError::Other(
                "live_hosting destinations publish through the live-hosting manager, not the manifest engine".into(),
            ));
        }
    };
    Ok(RetryingBackend::new(boxed))
}

/// Build the live-hosting manager for a `live_hosting` destination. Uses
/// `ssh2` for the CNAME/folder bookkeeping and shells out to `rsync` for
/// the mirror itself.
pub fn build_live_hosting_manager(cfg: &LiveHostingDestinationConfig) -> LiveHostingManager {
    let auth = SftpAuth::PrivateKey {
        key_path: cfg.private_key_path.clone(),
        passphrase: cfg.private_key_passphrase.clone(),
    };
    let sftp = SftpBackend::new(
        cfg.host.clone(),
        cfg.port,
        cfg.username.clone(),
        auth,
        cfg.basedir.clone(),
        Default::default(),
    );
    let rsync = RsyncHelper::new(cfg.host.clone(), cfg.username.clone(), cfg.private_key_path.clone(), cfg.basedir.clone());
    LiveHostingManager::new(cfg.live_domain.clone(), cfg.live_cname.clone(), LiveHostingSftpBackend::new(sftp), rsync)
}

fn sftp_auth(
    password: Option<&str>,
    key_path: Option<&std::path::Path>,
    passphrase: Option<&str>,
) -> Result<SftpAuth, PublishError> {
    if let Some(key_path) = key_path {
        Ok(SftpAuth::PrivateKey {
            key_path: key_path.to_path_buf(),
            passphrase: passphrase.map(str::to_string),
        })
    } else if let Some(password) = password {
        Ok(SftpAuth::Password(password.to_string()))
    } else {
        Err(PublishError::Other("sftp destination needs either a password or a private_key_path".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FtpDestinationConfig;
    use std::collections::HashMap;

    #[test]
    fn builds_an_ftp_backend_without_connecting() {
        let dest = DestinationConfig::Ftps(FtpDestinationConfig {
            host: "ftp.example.com".into(),
            port: 21,
            username: "site".into(),
            password: "hunter2".into(),
            basedir: String::new(),
            permission_map: HashMap::new(),
        });
        assert!(build_backend(&dest).is_ok());
    }

    #[test]
    fn rejects_an_sftp_destination_with_neither_password_nor_key() {
        let dest = DestinationConfig::Sftp(crate::config::SftpDestinationConfig {
            host: "sftp.example.com".into(),
            port: 22,
            username: "site".into(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            basedir: String::new(),
            permission_map: HashMap::new(),
        });
        assert!(build_backend(&dest).is_err());
    }

    #[test]
    fn live_hosting_destinations_are_rejected_by_build_backend() {
        let dest = DestinationConfig::LiveHosting(LiveHostingDestinationConfig {
            host: "live.example.com".into(),
            port: 22,
            username: "site".into(),
            private_key_path: "/etc/publisher/id_ed25519".into(),
            private_key_passphrase: None,
            basedir: String::new(),
            live_domain: "site123".into(),
            live_cname: None,
        });
        assert!(build_backend(&dest).is_err());
    }
}
