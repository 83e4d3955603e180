//! Keyed store abstractions behind the gateway.
//!
//! The gateway owns no mutable state of its own; all synchronization goes
//! through these four keyed stores (plus the job store for the async
//! variant). Each is a trait so tests and deployments can substitute
//! backends with the same atomicity contract — the in-memory versions in
//! [`memory`] serve a single instance, a shared backend (e.g. Redis) would
//! extend dedup across instances.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::fingerprint::FingerprintKey;
use crate::types::{Inference, InferResponse, JobRecord};

pub mod memory;

pub use memory::{
    MemoryDedupLock, MemoryIdempotencyLedger, MemoryJobStore, MemoryRateLimiter, MemoryResultCache,
};

/// A cached inference result with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub confidence: f32,
    pub created_at: SystemTime,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(inference: &Inference, ttl: Duration) -> Self {
        Self {
            payload: inference.payload.clone(),
            confidence: inference.confidence,
            created_at: SystemTime::now(),
            ttl,
        }
    }

    pub fn expires_at(&self) -> SystemTime {
        self.created_at + self.ttl
    }

    /// Exactly at the expiry instant counts as expired.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at()
    }

    /// Remaining life of this entry, zero once expired.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        self.expires_at()
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

/// Result cache: fingerprint → previously computed inference.
///
/// `get` returns live entries only. Backend failure surfaces as
/// `CacheUnavailable`, which the gateway treats as a miss — availability
/// wins over strict caching.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &FingerprintKey) -> Result<Option<CacheEntry>>;

    /// Store unconditionally, overwriting any prior entry. A ttl is always
    /// required; unbounded retention of derived data is not a supported
    /// configuration.
    async fn put(&self, key: &FingerprintKey, inference: &Inference, ttl: Duration) -> Result<()>;
}

/// Proof of lock ownership, required for release and renewal.
#[derive(Debug, Clone)]
pub struct LockToken {
    pub key: String,
    pub holder: Uuid,
    pub acquired_at: SystemTime,
    pub lease: Duration,
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug)]
pub enum Acquire {
    Acquired(LockToken),
    /// A live holder exists; `holder_expires_at` is its lease expiry so the
    /// caller can decide how long waiting is worthwhile.
    Busy { holder_expires_at: SystemTime },
}

/// Keyed mutual exclusion with lease expiry.
///
/// At most one valid token exists per key at any instant. Acquisition never
/// blocks: it either succeeds atomically (set-if-absent with the lease as
/// expiry) or reports `Busy` immediately. Leases expire on their own, so a
/// holder that crashes mid-inference cannot deadlock the key.
#[async_trait]
pub trait DedupLock: Send + Sync {
    async fn acquire(&self, key: &FingerprintKey, lease: Duration) -> Result<Acquire>;

    /// Release only succeeds for the recorded holder (compare-and-delete);
    /// a late release after lease expiry must not clobber a newer holder.
    async fn release(&self, token: &LockToken) -> Result<()>;

    /// Extend the lease of a still-held lock. Fails if the lease was lost.
    async fn renew(&self, token: &LockToken, lease: Duration) -> Result<LockToken>;
}

/// Outcome of an idempotency admission check.
#[derive(Debug)]
pub enum Begin {
    /// This caller owns the token and must run the inference.
    Fresh,
    /// Another request with the same token is mid-flight; wait or report
    /// retryable, never start a second inference.
    InFlight,
    /// The token already completed; replay the stored response verbatim.
    Complete(InferResponse),
}

/// Request-token ledger for safe retries.
///
/// `begin` atomically transitions absent→pending for exactly one caller.
/// Pending records carry their own expiry so a crashed owner cannot wedge
/// the token. Once completed, the response replays until ttl expiry.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    async fn begin(&self, token: &str, pending_ttl: Duration) -> Result<Begin>;

    /// Transition pending→complete. The stored response is what every
    /// replay of this token will receive.
    async fn complete(&self, token: &str, response: &InferResponse, ttl: Duration) -> Result<()>;

    /// Clear a pending record after a failed attempt so a retry with the
    /// same token may re-attempt instead of replaying a failure.
    async fn fail(&self, token: &str) -> Result<()>;
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Bounds request throughput per caller identity.
///
/// The counter is incremented only when `Allowed` is returned.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, identity: &str) -> Result<RateDecision>;
}

/// Storage for async job state.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put(&self, record: &JobRecord, ttl: Duration) -> Result<()>;
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;
}
