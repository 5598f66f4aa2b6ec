//! Job tracking for running publish jobs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// A running job's cancellation handles. `cancel_token` is checked by the
/// engine between task-list phases (spec's "cancellation only between
/// tasks"); `abort_handle` is the last-resort fallback if the task never
/// observes the token - e.g. it's stuck in blocking I/O.
struct TrackedJob {
    abort_handle: AbortHandle,
    cancel_token: CancellationToken,
}

/// Tracks running publish jobs and provides cooperative cancellation.
#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, TrackedJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new job with its abort handle and cancellation token.
    pub async fn register(&self, job_id: String, abort_handle: AbortHandle, cancel_token: CancellationToken) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job_id, TrackedJob { abort_handle, cancel_token });
    }

    /// Cancel a running job by its ID. Signals the cancellation token first
    /// so the engine can wind down between tasks; the abort handle is only
    /// a backstop for a task that never gets the chance to observe it.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().await;
        if let Some(job) = jobs.get(job_id) {
            job.cancel_token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove a job from tracking (called when a job completes naturally).
    pub async fn complete(&self, job_id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.remove(job_id);
    }

    /// Get count of running jobs.
    pub async fn running_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.len()
    }

    /// List the IDs of currently tracked jobs, for the `/jobs` introspection
    /// endpoint.
    pub async fn job_ids(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        jobs.keys().cloned().collect()
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}
