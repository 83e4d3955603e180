//! Async job variant for long-running operations.
//!
//! `create_job` admits the request (validation + rate check), stores a
//! pending record, and detaches a background task running the same
//! cache/lock pipeline as the synchronous path. Detachment is deliberate:
//! a dropped client connection must not cancel in-flight inference, since
//! the result still populates the cache for subsequent callers and other
//! pollers may be waiting on the job.

use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use crate::fingerprint::FingerprintKey;
use crate::types::{InferRequest, JobRecord, JobStatus, JobTicket};
use crate::{MuninnError, Result};

use super::InferenceGateway;

/// Retention margin beyond the model deadline, so pollers arriving after a
/// slow completion still find the record.
const JOB_TTL_BUFFER: Duration = Duration::from_secs(300);

impl InferenceGateway {
    /// Create an async job for `request` and start executing it.
    ///
    /// Rate limiting and input validation happen here at admission; the
    /// background task itself is already paid for.
    pub async fn create_job(&self, request: InferRequest, identity: &str) -> Result<JobTicket> {
        self.admit_identity(identity).await?;
        request.params.validate_for(request.operation)?;
        // Fail fast on inputs that could never execute.
        FingerprintKey::derive(request.operation, &request.image_url, &request.params)?;

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord::pending(&job_id, request.operation);
        let ttl = self.job_ttl(&request);
        self.job_store().put(&record, ttl).await?;

        info!(job_id, operation = %request.operation, "job created");
        let gateway = self.clone();
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            gateway.run_job(spawned_id, request, ttl).await;
        });

        Ok(JobTicket {
            job_id,
            status: JobStatus::Pending,
        })
    }

    /// Fetch current job state.
    pub async fn job(&self, job_id: &str) -> Result<JobRecord> {
        self.job_store()
            .get(job_id)
            .await?
            .ok_or_else(|| MuninnError::JobNotFound(job_id.to_string()))
    }

    fn job_ttl(&self, request: &InferRequest) -> Duration {
        self.config().model_timeout(request.operation) + JOB_TTL_BUFFER
    }

    async fn run_job(self, job_id: String, request: InferRequest, ttl: Duration) {
        let mut record = JobRecord::pending(&job_id, request.operation);
        record.status = JobStatus::Running;
        record.progress_percent = 10;
        if let Err(e) = self.job_store().put(&record, ttl).await {
            error!(job_id, error = %e, "failed to mark job running");
        }

        match self.execute_cached(&request).await {
            Ok(response) => {
                record.status = JobStatus::Complete;
                record.progress_percent = 100;
                record.result = Some(response);
            }
            Err(e) => {
                record.status = JobStatus::Failed;
                record.error = Some(e.to_string());
            }
        }

        if let Err(e) = self.job_store().put(&record, ttl).await {
            error!(job_id = record.job_id, error = %e, "failed to store job outcome");
        }
    }
}
