//! Async job types for long-running operations.

use serde::{Deserialize, Serialize};

use super::{InferResponse, Operation};

/// Lifecycle state of an async job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// Response to job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub status: JobStatus,
}

/// Full job state as returned by `get(job_id)`.
///
/// `result` is set once status is `Complete`, `error` once `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub operation: Operation,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<InferResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn pending(job_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            job_id: job_id.into(),
            operation,
            status: JobStatus::Pending,
            progress_percent: 0,
            result: None,
            error: None,
        }
    }
}
