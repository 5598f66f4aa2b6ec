//! Legacy-publish detection: before planning a task list, the engine asks
//! whether a destination was last published by a pre-manifest version of
//! this system. If so there is no manifest to diff against and the
//! engine falls back to treating the entire remote tree as unknown,
//! reconstructing a [`FileList`](crate::manifest::FileList) from a plain
//! directory walk instead.

use super::Backend;
use async_trait::async_trait;

/// Pluggable so a destination profile can opt into (or out of) the
/// heuristic, or supply its own rule, without changing the engine.
#[async_trait]
pub trait LegacyDetector: Send + Sync {
    async fn is_legacy(&self, backend: &mut dyn Backend) -> bool;
}

/// The default rule, carried over unchanged from the original's
/// `_old_publish` detection: a site published by the legacy system always
/// has both `server/version.json` and `mdb/mdb.php`.
pub struct DefaultLegacyDetector;

#[async_trait]
impl LegacyDetector for DefaultLegacyDetector {
    async fn is_legacy(&self, backend: &mut dyn Backend) -> bool {
        backend.exists("server/version.json").await.unwrap_or(false)
            && backend.exists("mdb/mdb.php").await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RemoteEntry, RemoteKind};
    use crate::utils::errors::PublishError;
    use std::collections::HashSet;
    use std::path::Path;

    struct FakeBackend {
        present: HashSet<&'static str>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn connect(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn quit(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
            Ok(self.present.contains(path))
        }
        async fn dir(&mut self, _path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
            Ok(vec![])
        }
        async fn kind(&mut self, _path: &str) -> Result<RemoteKind, PublishError> {
            Ok(RemoteKind::File)
        }
        async fn size(&mut self, _path: &str) -> Result<u64, PublishError> {
            Ok(0)
        }
        async fn mkdir(&mut self, _path: &str) -> Result<(), PublishError> {
            Ok(())
        }
        async fn upload(&mut self, _local: &Path, _remote: &str) -> Result<(), PublishError> {
            Ok(())
        }
        async fn download(&mut self, _remote: &str, _local: &Path) -> Result<(), PublishError> {
            Ok(())
        }
        async fn delete_file(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn delete_directory(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn erase_directory(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn chmod(&mut self, _path: &str, _mode: &str) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn requires_both_markers() {
        let mut only_version = FakeBackend {
            present: HashSet::from(["server/version.json"]),
        };
        assert!(!DefaultLegacyDetector.is_legacy(&mut only_version).await);

        let mut both = FakeBackend {
            present: HashSet::from(["server/version.json", "mdb/mdb.php"]),
        };
        assert!(DefaultLegacyDetector.is_legacy(&mut both).await);
    }
}
