//! Builder for configuring gateway instances.

use std::sync::Arc;

use crate::config::{GatewayConfig, RateConfig};
use crate::model::InferenceModel;
use crate::store::{
    DedupLock, IdempotencyLedger, JobStore, MemoryDedupLock, MemoryIdempotencyLedger,
    MemoryJobStore, MemoryRateLimiter, MemoryResultCache, RateLimiter, ResultCache,
};
use crate::{MuninnError, Result};

use super::InferenceGateway;

/// Builder for [`InferenceGateway`].
///
/// Only the model collaborator is mandatory. Stores default to the
/// in-memory implementations (single-instance dedup; see
/// [`store::memory`](crate::store::memory)); inject shared-backend
/// implementations for cross-instance behaviour.
pub struct GatewayBuilder {
    cache: Option<Arc<dyn ResultCache>>,
    lock: Option<Arc<dyn DedupLock>>,
    ledger: Option<Arc<dyn IdempotencyLedger>>,
    limiter: Option<Arc<dyn RateLimiter>>,
    jobs: Option<Arc<dyn JobStore>>,
    model: Option<Arc<dyn InferenceModel>>,
    config: GatewayConfig,
    rate: RateConfig,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            lock: None,
            ledger: None,
            limiter: None,
            jobs: None,
            model: None,
            config: GatewayConfig::default(),
            rate: RateConfig::default(),
        }
    }

    /// Set the model collaborator (required).
    pub fn model(mut self, model: Arc<dyn InferenceModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Override pipeline timings and ttls.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Override rate limiting bounds (used by the default limiter).
    pub fn rate(mut self, rate: RateConfig) -> Self {
        self.rate = rate;
        self
    }

    /// Inject a result cache backend.
    pub fn result_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Inject a dedup lock backend.
    pub fn dedup_lock(mut self, lock: Arc<dyn DedupLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Inject an idempotency ledger backend.
    pub fn idempotency_ledger(mut self, ledger: Arc<dyn IdempotencyLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Inject a rate limiter.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Inject a job store.
    pub fn job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<InferenceGateway> {
        self.config.validate()?;
        let model = self.model.ok_or_else(|| {
            MuninnError::Configuration("gateway requires a model collaborator".into())
        })?;
        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(MemoryRateLimiter::new(self.rate.requests, self.rate.window()))
        });
        Ok(InferenceGateway::new(
            self.cache.unwrap_or_else(|| Arc::new(MemoryResultCache::new())),
            self.lock.unwrap_or_else(|| Arc::new(MemoryDedupLock::new())),
            self.ledger
                .unwrap_or_else(|| Arc::new(MemoryIdempotencyLedger::new())),
            limiter,
            self.jobs.unwrap_or_else(|| Arc::new(MemoryJobStore::new())),
            model,
            self.config,
        ))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
