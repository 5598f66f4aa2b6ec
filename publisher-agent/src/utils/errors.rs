//! Error taxonomy for the publisher worker.
//!
//! The upload engine only ever needs to ask one question about a failure:
//! would retrying help? [`PublishError::is_no_retry`] answers it. Anything
//! that isn't a no-retry kind gets wrapped by the engine into a recovery
//! blob and surfaced to the external job scheduler as retryable.
//! [`AgentError`] is the umbrella error for everything around the engine -
//! config, HTTP, serialization - so `main.rs` only has to handle one type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("the following paths already exist on the remote: {0:?}")]
    AlreadyExists(Vec<String>),

    #[error("{0} no longer exists on the remote")]
    DoesNotExist(String),

    #[error("folder is not empty: {0}")]
    NonEmptyFolder(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("CNAME already in use: {0}")]
    CNameInUse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PublishError {
    /// True for failures where retrying the job would not help - the
    /// engine surfaces these immediately instead of wrapping them in a
    /// recovery blob for the scheduler to reschedule.
    pub fn is_no_retry(&self) -> bool {
        matches!(
            self,
            PublishError::AlreadyExists(_)
                | PublishError::DoesNotExist(_)
                | PublishError::NonEmptyFolder(_)
                | PublishError::Security(_)
                | PublishError::Archive(_)
                | PublishError::Auth(_)
                | PublishError::CNameInUse(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("{0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_no_retry_errors() {
        assert!(PublishError::AlreadyExists(vec!["a".into()]).is_no_retry());
        assert!(PublishError::Security("traversal".into()).is_no_retry());
        assert!(!PublishError::Transport("connection reset".into()).is_no_retry());
        assert!(!PublishError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_no_retry());
    }
}
