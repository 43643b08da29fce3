//! Job bookkeeping for plugins that run operations in the background.
//!
//! Handlers that start long work allocate a job here, return its id to the
//! client and update its status as the work progresses. The tracker answers
//! `job_status` and `job_free` once bound with [`DispatchTableBuilder::jobs`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lsm_protocol::{ErrorCode, ErrorResponse, JobId, JobStatus};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::table::DispatchTableBuilder;

/// Shared table of jobs started by handlers.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, JobStatus>>,
    next: AtomicU64,
}

#[derive(Deserialize)]
struct JobArgs {
    job_id: JobId,
}

impl JobTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new job in progress at 0%.
    pub async fn create(&self) -> JobId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let id = JobId::new(format!("JOB_{}", n));
        self.jobs
            .write()
            .await
            .insert(id.clone(), JobStatus::in_progress(0));
        debug!(job = %id, "job created");
        id
    }

    /// Replaces the status of a job.
    pub async fn update(&self, id: &JobId, status: JobStatus) -> Result<(), ErrorResponse> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        *entry = status;
        Ok(())
    }

    /// Returns the status of a job.
    pub async fn status(&self, id: &JobId) -> Result<JobStatus, ErrorResponse> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Forgets a job.
    pub async fn free(&self, id: &JobId) -> Result<(), ErrorResponse> {
        self.jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| not_found(id))?;
        debug!(job = %id, "job freed");
        Ok(())
    }

    /// Number of jobs not yet freed.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Returns true when every job has been freed.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn not_found(id: &JobId) -> ErrorResponse {
    ErrorResponse::new(ErrorCode::NotFoundJob, format!("job {} not found", id))
}

impl DispatchTableBuilder {
    /// Binds `job_status` and `job_free` to a shared tracker.
    pub fn jobs(self, tracker: Arc<JobTracker>) -> Self {
        let status = Arc::clone(&tracker);
        self.bind("job_status", move |args: JobArgs| {
            let tracker = Arc::clone(&status);
            async move { tracker.status(&args.job_id).await }
        })
        .bind("job_free", move |args: JobArgs| {
            let tracker = Arc::clone(&tracker);
            async move { tracker.free(&args.job_id).await }
        })
    }
}
