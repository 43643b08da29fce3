//! Asynchronous job payloads.
//!
//! Long-running operations answer with an opaque job id instead of a value.
//! The initiator then polls `job_status`, which returns a three element array
//! `[state, percent, item]`, and releases the job with `job_free` once it is
//! done.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::ErrorResponse;

/// Opaque token identifying a job on the responder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Wire value of the first element of a job status array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum JobState {
    InProgress = 1,
    Complete = 2,
    Error = 3,
}

impl TryFrom<u32> for JobState {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(JobState::InProgress),
            2 => Ok(JobState::Complete),
            3 => Ok(JobState::Error),
            other => Err(ProtocolError::peer_bug(format!(
                "invalid job state {}",
                other
            ))),
        }
    }
}

/// Decoded answer to a `job_status` request.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Still running.
    InProgress { percent: u8 },
    /// Finished. Operations without a return value complete with `None`.
    Complete { result: Option<Value> },
    /// Failed with the carried error.
    Error(ErrorResponse),
}

impl JobStatus {
    /// Creates an in-progress status, clamping `percent` to 100.
    pub fn in_progress(percent: u8) -> Self {
        Self::InProgress {
            percent: percent.min(100),
        }
    }

    /// Creates a completed status.
    pub fn complete(result: Option<Value>) -> Self {
        Self::Complete { result }
    }

    /// Returns the wire state.
    pub fn state(&self) -> JobState {
        match self {
            Self::InProgress { .. } => JobState::InProgress,
            Self::Complete { .. } => JobState::Complete,
            Self::Error(_) => JobState::Error,
        }
    }

    /// Returns the completion percentage.
    pub fn percent(&self) -> u8 {
        match self {
            Self::InProgress { percent } => *percent,
            Self::Complete { .. } => 100,
            Self::Error(_) => 0,
        }
    }

    /// Returns true once the job will not change state again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress { .. })
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let item = match self {
            Self::InProgress { .. } => Value::Null,
            Self::Complete { result } => result.clone().unwrap_or(Value::Null),
            Self::Error(error) => serde_json::to_value(error).map_err(serde::ser::Error::custom)?,
        };
        (self.state() as u32, self.percent(), item).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (state, percent, item) = <(u32, Option<u32>, Value)>::deserialize(deserializer)?;

        match JobState::try_from(state).map_err(de::Error::custom)? {
            JobState::InProgress => {
                let percent = percent.unwrap_or(0);
                if percent > 100 {
                    return Err(de::Error::custom(format!(
                        "job percent {} out of range",
                        percent
                    )));
                }
                Ok(Self::InProgress {
                    percent: percent as u8,
                })
            }
            JobState::Complete => Ok(Self::Complete {
                result: (!item.is_null()).then_some(item),
            }),
            JobState::Error => serde_json::from_value(item).map(Self::Error).map_err(|e| {
                de::Error::custom(format!("job error status without error information: {}", e))
            }),
        }
    }
}

/// Result of an operation that may either finish immediately or start a job.
///
/// On the wire this is `[job, value]` with exactly one side non-null. When
/// both are set the job wins; when neither is, decoding fails.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOrResult {
    /// A job was started; poll it for the value.
    Job(JobId),
    /// The operation finished synchronously.
    Value(Value),
}

impl JobOrResult {
    /// Returns the job id, if a job was started.
    pub fn job(&self) -> Option<&JobId> {
        match self {
            Self::Job(job) => Some(job),
            Self::Value(_) => None,
        }
    }
}

impl Serialize for JobOrResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Job(job) => (Some(job), Value::Null).serialize(serializer),
            Self::Value(value) => (None::<&JobId>, value).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JobOrResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match <(Option<JobId>, Value)>::deserialize(deserializer)? {
            (Some(job), _) => Ok(Self::Job(job)),
            (None, Value::Null) => Err(de::Error::custom("neither job nor value is set")),
            (None, value) => Ok(Self::Value(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;
    use serde_json::json;

    #[test]
    fn status_wire_shape() {
        assert_eq!(
            serde_json::to_value(JobStatus::in_progress(55)).unwrap(),
            json!([1, 55, null])
        );
        assert_eq!(
            serde_json::to_value(JobStatus::complete(Some(json!({"id": "V1"})))).unwrap(),
            json!([2, 100, {"id": "V1"}])
        );
        assert_eq!(
            serde_json::to_value(JobStatus::complete(None)).unwrap(),
            json!([2, 100, null])
        );

        let failed = JobStatus::Error(ErrorResponse::new(ErrorCode::NotFoundVolume, "gone"));
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            json!([3, 0, {"code": 205, "message": "gone", "data": ""}])
        );
    }

    #[test]
    fn in_progress_clamps_percent() {
        assert_eq!(JobStatus::in_progress(250).percent(), 100);
    }

    #[test]
    fn status_parse() {
        let status: JobStatus = serde_json::from_value(json!([1, null, null])).unwrap();
        assert_eq!(status, JobStatus::InProgress { percent: 0 });
        assert!(!status.is_terminal());

        let status: JobStatus = serde_json::from_value(json!([2, 100, "X"])).unwrap();
        assert_eq!(status, JobStatus::complete(Some(json!("X"))));
        assert_eq!(status.state(), JobState::Complete);
        assert!(status.is_terminal());

        let status: JobStatus = serde_json::from_value(json!([
            3,
            10,
            {"code": 205, "message": "no such volume", "data": null}
        ]))
        .unwrap();
        match status {
            JobStatus::Error(error) => {
                assert_eq!(error.code, ErrorCode::NotFoundVolume);
                assert_eq!(error.message, "no such volume");
            }
            other => panic!("expected error status, got {:?}", other),
        }
    }

    #[test]
    fn status_rejects_malformed_input() {
        for bad in [
            json!([9, 0, null]),
            json!([1, 101, null]),
            json!([3, 0, null]),
            json!([3, 0, "boom"]),
            json!([1, 0]),
            json!({"state": 1}),
        ] {
            let parsed: Result<JobStatus, _> = serde_json::from_value(bad.clone());
            assert!(parsed.is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn job_state_from_wire() {
        assert_eq!(JobState::try_from(1).unwrap(), JobState::InProgress);
        assert_eq!(JobState::try_from(3).unwrap(), JobState::Error);
        assert!(matches!(
            JobState::try_from(0),
            Err(ProtocolError::PeerBug { .. })
        ));
    }

    #[test]
    fn job_or_result_wire_shape() {
        let job = JobOrResult::Job(JobId::new("JOB_7"));
        assert_eq!(serde_json::to_value(&job).unwrap(), json!(["JOB_7", null]));

        let value = JobOrResult::Value(json!({"id": "V1"}));
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!([null, {"id": "V1"}])
        );
    }

    #[test]
    fn job_takes_precedence_over_value() {
        let parsed: JobOrResult = serde_json::from_value(json!(["JOB_7", {"id": "V1"}])).unwrap();
        assert_eq!(parsed.job(), Some(&JobId::from("JOB_7")));

        let parsed: JobOrResult = serde_json::from_value(json!([null, {"id": "V1"}])).unwrap();
        assert_eq!(parsed, JobOrResult::Value(json!({"id": "V1"})));
    }

    #[test]
    fn job_or_result_needs_one_side() {
        let parsed: Result<JobOrResult, _> = serde_json::from_value(json!([null, null]));
        assert!(parsed.is_err());
    }

    #[test]
    fn job_or_result_rejects_non_string_job() {
        let parsed: Result<JobOrResult, _> = serde_json::from_value(json!([7, null]));
        assert!(parsed.is_err());
    }
}
