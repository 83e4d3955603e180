//! Inference gateway: the server-side request pipeline.
//!
//! Each request walks a fixed state machine:
//!
//! ```text
//! RateCheck ──► IdempotencyCheck ──► ResultCacheCheck ──► LockAcquire ──► Execute
//!     │                │                    │                  │             │
//!  429 terminal   replay / wait         hit: respond      busy: backoff,  success: cache,
//!                 grace / retryable     + complete own    re-check cache, complete ledger,
//!                                       ledger record     retryable at    release lock
//!                                                         budget          ─ or ─ Fail:
//!                                                                         release, mark
//!                                                                         ledger failed
//! ```
//!
//! The stores are the only synchronization points; the gateway itself holds
//! no mutable state and is cheap to clone. Degraded backends (cache, lock,
//! rate limiter) are logged and routed around, never fatal: a broken cache
//! is a miss, a broken lock means no dedup, a broken limiter fails open.

mod builder;
mod jobs;

pub use builder::GatewayBuilder;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::fingerprint::FingerprintKey;
use crate::model::InferenceModel;
use crate::store::{
    Acquire, Begin, CacheEntry, DedupLock, IdempotencyLedger, JobStore, LockToken, RateDecision,
    RateLimiter, ResultCache,
};
use crate::telemetry;
use crate::types::{InferRequest, InferResponse, Inference};
use crate::{MuninnError, Result};

/// Ceiling for contention backoff, both lock polling and in-flight waits.
const BACKOFF_CAP: Duration = Duration::from_secs(1);

/// Outcome of the idempotency admission check.
enum Admission {
    /// This request owns the token and must complete or fail it.
    Owner,
    /// The token already completed; the stored response replays verbatim.
    Replay(InferResponse),
    /// No token supplied, or the ledger backend is degraded.
    Untracked,
}

/// Orchestrates cache, dedup lock, idempotency ledger, rate limiter and the
/// model collaborator so that expensive inference runs at most once per
/// unique (operation, input) pair.
#[derive(Clone)]
pub struct InferenceGateway {
    cache: Arc<dyn ResultCache>,
    lock: Arc<dyn DedupLock>,
    ledger: Arc<dyn IdempotencyLedger>,
    limiter: Arc<dyn RateLimiter>,
    jobs: Arc<dyn JobStore>,
    model: Arc<dyn InferenceModel>,
    config: GatewayConfig,
}

impl InferenceGateway {
    /// Create a new builder for configuring a gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cache: Arc<dyn ResultCache>,
        lock: Arc<dyn DedupLock>,
        ledger: Arc<dyn IdempotencyLedger>,
        limiter: Arc<dyn RateLimiter>,
        jobs: Arc<dyn JobStore>,
        model: Arc<dyn InferenceModel>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            cache,
            lock,
            ledger,
            limiter,
            jobs,
            model,
            config,
        }
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Run one inference request through the full pipeline.
    ///
    /// `identity` is the opaque caller subject used for rate limiting;
    /// `idem_token` is the caller-supplied idempotency token, if any.
    pub async fn infer(
        &self,
        request: InferRequest,
        identity: &str,
        idem_token: Option<&str>,
    ) -> Result<InferResponse> {
        let operation = request.operation;

        // RateCheck: terminal on denial.
        self.admit_identity(identity).await?;

        // IdempotencyCheck: replay, wait out an in-flight twin, or take
        // ownership of the token.
        let admission = match idem_token {
            Some(token) => self.admit_idempotent(token, operation).await?,
            None => Admission::Untracked,
        };
        if let Admission::Replay(response) = admission {
            metrics::counter!(telemetry::IDEMPOTENT_REPLAYS_TOTAL,
                "operation" => operation.as_str())
            .increment(1);
            return Ok(response);
        }

        let result = self.execute_cached(&request).await;

        // The owning token records the outcome exactly once: a success
        // (fresh or cache hit) completes it, a failure clears it so the
        // caller may retry with the same token.
        if let (Some(token), Admission::Owner) = (idem_token, &admission) {
            match &result {
                Ok(response) => {
                    if let Err(e) = self
                        .ledger
                        .complete(token, response, self.config.idempotency_ttl())
                        .await
                    {
                        warn!(token, error = %e, "failed to complete idempotency record");
                    }
                }
                Err(_) => {
                    if let Err(e) = self.ledger.fail(token).await {
                        warn!(token, error = %e, "failed to clear idempotency record");
                    }
                }
            }
        }

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => operation.as_str(), "status" => status)
        .increment(1);
        result
    }

    /// Steps 3–6 of the pipeline: fingerprint, cache check, dedup lock,
    /// bounded model execution. Shared by the sync path and async jobs.
    pub(crate) async fn execute_cached(&self, request: &InferRequest) -> Result<InferResponse> {
        let operation = request.operation;
        request.params.validate_for(operation)?;
        let key = FingerprintKey::derive(operation, &request.image_url, &request.params)?;

        // ResultCacheCheck
        if let Some(entry) = self.cache_lookup(&key).await {
            return Ok(Self::respond_from_cache(&entry));
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation.as_str())
            .increment(1);

        // LockAcquire: poll with bounded backoff inside the request budget.
        // Each busy round re-checks the cache, because the current holder
        // finishing is the happy path out of contention.
        let lock_token = match self.acquire_or_wait(&key).await? {
            LockOutcome::Held(token) => Some(token),
            LockOutcome::Undeduplicated => None,
            LockOutcome::CachePopulated(entry) => {
                return Ok(Self::respond_from_cache(&entry));
            }
        };

        // Execute under a hard deadline, keeping the lease alive throughout.
        let deadline = self.config.model_timeout(operation);
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            deadline,
            self.infer_renewing(request, deadline, lock_token.as_ref()),
        )
        .await;
        metrics::histogram!(telemetry::INFERENCE_DURATION_SECONDS,
            "operation" => operation.as_str())
        .record(started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(Ok(inference)) => self.record_success(&key, &inference).await,
            Ok(Err(MuninnError::InferenceTimeout)) | Err(_) => {
                metrics::counter!(telemetry::INFERENCE_TIMEOUTS_TOTAL,
                    "operation" => operation.as_str())
                .increment(1);
                Err(MuninnError::InferenceTimeout)
            }
            Ok(Err(e)) => Err(e),
        };

        if let Some(token) = lock_token {
            self.release_quietly(&token).await;
        }
        result
    }

    /// Cache write + response assembly after a successful model call.
    async fn record_success(&self, key: &FingerprintKey, inference: &Inference) -> Result<InferResponse> {
        let ttl = self.config.cache_ttl(key.operation());
        if let Err(e) = self.cache.put(key, inference, ttl).await {
            // The result still goes out; we just lose the cache benefit.
            warn!(key = %key.cache_key(), error = %e, "cache write failed");
        }
        Ok(InferResponse {
            payload: inference.payload.clone(),
            confidence: inference.confidence,
            request_id: Uuid::new_v4().to_string(),
            cache_hit: false,
            ttl_seconds: ttl.as_secs(),
        })
    }

    /// Invoke the model, renewing the dedup lease at half-life while the
    /// call is in flight. Without renewal, an inference that outlives one
    /// lease would free the key mid-flight and a competitor could start a
    /// second inference for the same fingerprint.
    async fn infer_renewing(
        &self,
        request: &InferRequest,
        deadline: Duration,
        lock: Option<&LockToken>,
    ) -> Result<Inference> {
        let operation = request.operation;
        let infer = self
            .model
            .infer(operation, &request.image_url, &request.params, deadline);
        let Some(token) = lock else {
            return infer.await;
        };
        tokio::pin!(infer);
        let lease = self.config.lock_lease();
        let mut renew_at = tokio::time::Instant::now() + lease / 2;
        let mut renewing = true;
        loop {
            tokio::select! {
                result = &mut infer => return result,
                _ = tokio::time::sleep_until(renew_at), if renewing => {
                    // The holder id never changes across renewals, so the
                    // original token stays valid for the final release.
                    if let Err(e) = self.lock.renew(token, lease).await {
                        warn!(key = %token.key, error = %e,
                            "lease renewal failed, dedup may lapse for this key");
                        renewing = false;
                    }
                    renew_at = tokio::time::Instant::now() + lease / 2;
                }
            }
        }
    }

    fn respond_from_cache(entry: &CacheEntry) -> InferResponse {
        InferResponse {
            payload: entry.payload.clone(),
            confidence: entry.confidence,
            request_id: Uuid::new_v4().to_string(),
            cache_hit: true,
            ttl_seconds: entry.remaining_ttl(SystemTime::now()).as_secs(),
        }
    }

    /// Cache read that treats backend failure as a miss.
    async fn cache_lookup(&self, key: &FingerprintKey) -> Option<CacheEntry> {
        match self.cache.get(key).await {
            Ok(Some(entry)) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL,
                    "operation" => key.operation().as_str())
                .increment(1);
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key.cache_key(), error = %e, "cache unavailable, treating as miss");
                None
            }
        }
    }

    /// Acquire the dedup lock, polling within the operation's budget.
    async fn acquire_or_wait(&self, key: &FingerprintKey) -> Result<LockOutcome> {
        let operation = key.operation();
        let wait_deadline = Instant::now() + self.config.model_timeout(operation);
        let mut backoff = self.config.lock_backoff_initial();
        loop {
            match self.lock.acquire(key, self.config.lock_lease()).await {
                Ok(Acquire::Acquired(token)) => return Ok(LockOutcome::Held(token)),
                Ok(Acquire::Busy { holder_expires_at }) => {
                    metrics::counter!(telemetry::DEDUP_BUSY_TOTAL,
                        "operation" => operation.as_str())
                    .increment(1);
                    if Instant::now() >= wait_deadline {
                        debug!(key = %key.lock_key(), ?holder_expires_at,
                            "lock wait budget exhausted");
                        return Err(MuninnError::Retryable {
                            retry_after: Some(backoff),
                        });
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                    // The holder may have finished and populated the cache.
                    if let Some(entry) = self.cache_lookup(key).await {
                        return Ok(LockOutcome::CachePopulated(entry));
                    }
                }
                Err(e) => {
                    warn!(key = %key.lock_key(), error = %e,
                        "dedup lock unavailable, proceeding without dedup");
                    return Ok(LockOutcome::Undeduplicated);
                }
            }
        }
    }

    async fn admit_idempotent(&self, token: &str, operation: crate::types::Operation) -> Result<Admission> {
        // Pending records expire with the lock lease: if the owner crashes,
        // the token frees up on the same schedule as its dedup lock.
        let pending_ttl = self.config.lock_lease();
        let grace_deadline = Instant::now() + self.config.in_flight_grace();
        let mut backoff = self.config.lock_backoff_initial();
        loop {
            match self.ledger.begin(token, pending_ttl).await {
                Ok(Begin::Fresh) => return Ok(Admission::Owner),
                Ok(Begin::Complete(response)) => return Ok(Admission::Replay(response)),
                Ok(Begin::InFlight) => {
                    if Instant::now() >= grace_deadline {
                        debug!(token, operation = %operation,
                            "in-flight request outlived the grace period");
                        return Err(MuninnError::Retryable {
                            retry_after: Some(backoff),
                        });
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(e) => {
                    warn!(token, error = %e,
                        "idempotency ledger unavailable, proceeding untracked");
                    return Ok(Admission::Untracked);
                }
            }
        }
    }

    async fn release_quietly(&self, token: &LockToken) {
        if let Err(e) = self.lock.release(token).await {
            warn!(key = %token.key, error = %e, "lock release failed; lease will expire");
        }
    }

    /// Rate-limit admission shared with the async job entry point.
    pub(crate) async fn admit_identity(&self, identity: &str) -> Result<()> {
        match self.limiter.allow(identity).await {
            Ok(RateDecision::Allowed) => Ok(()),
            Ok(RateDecision::Denied { retry_after }) => {
                metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
                Err(MuninnError::RateLimited {
                    retry_after: Some(retry_after),
                })
            }
            Err(e) => {
                warn!(identity, error = %e, "rate limiter unavailable, failing open");
                Ok(())
            }
        }
    }
}

enum LockOutcome {
    Held(LockToken),
    /// Lock backend degraded: run without dedup rather than failing.
    Undeduplicated,
    /// A competing holder finished while we waited.
    CachePopulated(CacheEntry),
}
