//! Job lifecycle management.
//!
//! A job-returning call either finishes immediately or hands back a job id.
//! In the second case the caller can wait here: the job is polled at the
//! configured interval, freed exactly once when it completes, and left alone
//! when it fails.

use lsm_protocol::{JobId, JobOrResult, JobStatus, ProtocolError};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Client, into_params};
use crate::error::{ClientError, ClientResult};

/// Outcome of a job-returning operation.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    /// The operation finished. `None` when it produced no value.
    Done(Option<T>),
    /// A job is still running; the caller owns it and must free it.
    Pending(JobId),
}

impl<T> JobOutcome<T> {
    /// Returns the value, if the operation finished with one.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Done(value) => value,
            Self::Pending(_) => None,
        }
    }

    /// Returns the pending job, if any.
    pub fn job(&self) -> Option<&JobId> {
        match self {
            Self::Done(_) => None,
            Self::Pending(job) => Some(job),
        }
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the current status of a job.
    pub async fn job_status(&mut self, job: &JobId) -> ClientResult<JobStatus> {
        self.call("job_status", json!({"job_id": job})).await
    }

    /// Releases a job on the plugin.
    pub async fn job_free(&mut self, job: &JobId) -> ClientResult<()> {
        self.call("job_free", json!({"job_id": job})).await
    }

    /// Waits for a job to finish and returns its value.
    ///
    /// On completion the carried value is decoded and the job is freed, even
    /// if decoding failed. If freeing fails the operation result is discarded
    /// and [`ClientError::JobCleanup`] is returned. A failed job is
    /// reported with the error it carries and is not freed. When the
    /// configured job timeout elapses first, [`ClientError::JobTimeout`] is
    /// returned and the job stays allocated.
    pub async fn job_wait<T>(&mut self, job: &JobId) -> ClientResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();

        loop {
            match self.job_status(job).await? {
                JobStatus::InProgress { percent } => {
                    debug!(job = %job, percent, "job in progress");

                    let waited = started.elapsed();
                    if let Some(limit) = self.config.job_timeout
                        && waited >= limit
                    {
                        warn!(job = %job, ?waited, "gave up waiting for job");
                        return Err(ClientError::JobTimeout {
                            job_id: job.clone(),
                            waited,
                        });
                    }

                    tokio::time::sleep(self.config.poll_interval).await;
                }
                JobStatus::Complete { result } => {
                    let value = decode_value("job_status", result);

                    if let Err(e) = self.job_free(job).await {
                        let source = match e {
                            ClientError::Protocol(source) => source,
                            other => ProtocolError::peer_bug(other.to_string()),
                        };
                        return Err(ClientError::JobCleanup {
                            job_id: job.clone(),
                            source,
                        });
                    }

                    info!(job = %job, "job complete");
                    return value;
                }
                JobStatus::Error(error) => {
                    debug!(job = %job, code = %error.code, "job failed");
                    return Err(ProtocolError::Remote(error).into());
                }
            }
        }
    }

    /// Calls a method whose result is `[job, value]`.
    ///
    /// With `sync` set a started job is waited for; otherwise its id is
    /// returned.
    pub async fn invoke_job_or_result<T>(
        &mut self,
        method: &str,
        params: Map<String, Value>,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>>
    where
        T: DeserializeOwned,
    {
        match self.invoke::<JobOrResult>(method, params).await? {
            JobOrResult::Job(job) if sync => Ok(JobOutcome::Done(self.job_wait(&job).await?)),
            JobOrResult::Job(job) => Ok(JobOutcome::Pending(job)),
            JobOrResult::Value(value) => Ok(JobOutcome::Done(decode_value(method, Some(value))?)),
        }
    }

    /// Calls a method whose result is a job id or `null`.
    ///
    /// Returns the job id only when a job was started and `sync` is off.
    pub async fn invoke_job_or_none(
        &mut self,
        method: &str,
        params: Map<String, Value>,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        match self.invoke::<Option<JobId>>(method, params).await? {
            Some(job) if sync => {
                self.job_wait::<IgnoredAny>(&job).await?;
                Ok(None)
            }
            job => Ok(job),
        }
    }

    pub(crate) async fn call_job_or_result<T>(
        &mut self,
        method: &str,
        params: Value,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>>
    where
        T: DeserializeOwned,
    {
        self.invoke_job_or_result(method, into_params(params), sync)
            .await
    }

    pub(crate) async fn call_job_or_none(
        &mut self,
        method: &str,
        params: Value,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        self.invoke_job_or_none(method, into_params(params), sync)
            .await
    }
}

fn decode_value<T: DeserializeOwned>(method: &str, value: Option<Value>) -> ClientResult<Option<T>> {
    value
        .map(|value| {
            serde_json::from_value(value).map_err(|e| {
                ClientError::from(ProtocolError::peer_bug(format!(
                    "unexpected result for {}: {}",
                    method, e
                )))
            })
        })
        .transpose()
}
