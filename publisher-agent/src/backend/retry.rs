//! Reconnect-and-retry wrapper around a [`Backend`].
//!
//! Mirrors the original's `on_exception_reconnect_and_retry` decorator:
//! any operation that fails is retried exactly once, after a fresh
//! `connect()`. A second failure is surfaced to the caller - it is the
//! engine's job to decide whether that failure is retryable at the
//! publish-job level. No-retry errors (a collision, a security violation)
//! skip the reconnect entirely since a retry can't help them.

use super::{Backend, RemoteEntry, RemoteKind};
use crate::utils::errors::PublishError;
use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

pub struct RetryingBackend<B: Backend> {
    inner: B,
}

impl<B: Backend> RetryingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

/// Runs `$self.inner.$method($($arg),*)`, and on a retryable error,
/// reconnects and runs it exactly once more. Expressed as a macro rather
/// than a generic helper because the retried call needs to re-borrow
/// `$self.inner` fresh on each attempt, which a closure captured by
/// reference can't express without unsafe aliasing tricks.
macro_rules! retry_op {
    ($self:ident, $op_name:literal, $method:ident $( , $arg:expr )* ) => {{
        match $self.inner.$method($($arg),*).await {
            Ok(v) => Ok(v),
            Err(e) if e.is_no_retry() => Err(e),
            Err(e) => {
                warn!(operation = $op_name, error = %e, "backend operation failed, reconnecting and retrying once");
                let _ = $self.inner.quit().await;
                $self.inner.connect().await?;
                $self.inner.$method($($arg),*).await
            }
        }
    }};
}

#[async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    async fn connect(&mut self) -> Result<(), PublishError> {
        self.inner.connect().await
    }

    async fn quit(&mut self) -> Result<(), PublishError> {
        self.inner.quit().await
    }

    async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
        retry_op!(self, "exists", exists, path)
    }

    async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
        retry_op!(self, "dir", dir, path)
    }

    async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
        retry_op!(self, "kind", kind, path)
    }

    async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
        retry_op!(self, "size", size, path)
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
        retry_op!(self, "mkdir", mkdir, path)
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
        retry_op!(self, "upload", upload, local_path, remote_path)
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
        retry_op!(self, "download", download, remote_path, local_path)
    }

    async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
        retry_op!(self, "delete_file", delete_file, path)
    }

    async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        retry_op!(self, "delete_directory", delete_directory, path)
    }

    async fn erase_directory(&mut self, path: &str) -> Result<bool, PublishError> {
        retry_op!(self, "erase_directory", erase_directory, path)
    }

    async fn chmod(&mut self, path: &str, mode: &str) -> Result<(), PublishError> {
        retry_op!(self, "chmod", chmod, path, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A fake backend whose `exists` fails once then succeeds, to prove the
    /// wrapper reconnects and retries exactly once.
    struct FlakyBackend {
        attempts: Arc<AtomicUsize>,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn connect(&mut self) -> Result<(), PublishError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn quit(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn exists(&mut self, _path: &str) -> Result<bool, PublishError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(PublishError::Transport("simulated drop".into()))
            } else {
                Ok(true)
            }
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
    async fn retries_exactly_once_after_reconnect() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicUsize::new(0));
        let inner = FlakyBackend {
            attempts: attempts.clone(),
            connects: connects.clone(),
        };
        let mut backend = RetryingBackend::new(inner);

        let result = backend.exists("index.html").await;
        assert_eq!(result.unwrap(), true);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_errors_skip_reconnect() {
        struct AlwaysCollides;
        #[async_trait]
        impl Backend for AlwaysCollides {
            async fn connect(&mut self) -> Result<(), PublishError> {
                panic!("should not reconnect on a no-retry error");
            }
            async fn quit(&mut self) -> Result<(), PublishError> {
                Ok(())
            }
            async fn exists(&mut self, _path: &str) -> Result<bool, PublishError> {
                Err(PublishError::AlreadyExists(vec!["robots.txt".into()]))
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

        let mut backend = RetryingBackend::new(AlwaysCollides);
        let err = backend.exists("robots.txt").await.unwrap_err();
        assert!(err.is_no_retry());
    }
}
