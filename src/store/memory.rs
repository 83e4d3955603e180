//! In-memory store implementations.
//!
//! These provide the same atomicity contracts as a shared backend, but
//! scoped to one process: dedup and idempotency hold within a single
//! gateway instance only. That is the degraded single-instance mode — a
//! multi-instance deployment needs a shared keyed store with atomic
//! conditional writes behind the same traits.
//!
//! The result cache uses moka (LRU + expiry); the remaining stores are
//! mutex-guarded maps. No lock is held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use uuid::Uuid;

use crate::Result;
use crate::fingerprint::FingerprintKey;
use crate::types::{Inference, InferResponse, JobRecord};

use super::{
    Acquire, Begin, CacheEntry, DedupLock, IdempotencyLedger, JobStore, LockToken, RateDecision,
    RateLimiter, ResultCache,
};

/// Default capacity bound for the in-memory result cache.
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

// ============================================================================
// MemoryResultCache
// ============================================================================

/// Per-entry expiry policy: each entry lives exactly its own ttl.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// moka-backed result cache with per-entry ttl.
///
/// moka evicts actively; the read-time check in `get` additionally
/// guarantees the exactly-at-expiry boundary regardless of sweep timing.
pub struct MemoryResultCache {
    cache: Cache<String, CacheEntry>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &FingerprintKey) -> Result<Option<CacheEntry>> {
        let store_key = key.cache_key();
        match self.cache.get(&store_key).await {
            Some(entry) if !entry.is_expired_at(SystemTime::now()) => Ok(Some(entry)),
            Some(_) => {
                self.cache.invalidate(&store_key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &FingerprintKey, inference: &Inference, ttl: Duration) -> Result<()> {
        self.cache
            .insert(key.cache_key(), CacheEntry::new(inference, ttl))
            .await;
        Ok(())
    }
}

// ============================================================================
// MemoryDedupLock
// ============================================================================

#[derive(Debug, Clone)]
struct Holder {
    holder: Uuid,
    expires_at: SystemTime,
}

/// Mutex-map dedup lock with lease expiry and compare-and-delete release.
pub struct MemoryDedupLock {
    holders: Mutex<HashMap<String, Holder>>,
}

impl MemoryDedupLock {
    pub fn new() -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDedupLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupLock for MemoryDedupLock {
    async fn acquire(&self, key: &FingerprintKey, lease: Duration) -> Result<Acquire> {
        let store_key = key.lock_key();
        let now = SystemTime::now();
        let mut holders = self.holders.lock().expect("lock map poisoned");
        if let Some(existing) = holders.get(&store_key)
            && existing.expires_at > now
        {
            return Ok(Acquire::Busy {
                holder_expires_at: existing.expires_at,
            });
        }
        let holder = Uuid::new_v4();
        holders.insert(
            store_key.clone(),
            Holder {
                holder,
                expires_at: now + lease,
            },
        );
        Ok(Acquire::Acquired(LockToken {
            key: store_key,
            holder,
            acquired_at: now,
            lease,
        }))
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        let mut holders = self.holders.lock().expect("lock map poisoned");
        // Only delete if we are still the recorded holder; a newer holder
        // after lease expiry must not lose its lock to our late release.
        if holders
            .get(&token.key)
            .is_some_and(|h| h.holder == token.holder)
        {
            holders.remove(&token.key);
        }
        Ok(())
    }

    async fn renew(&self, token: &LockToken, lease: Duration) -> Result<LockToken> {
        let now = SystemTime::now();
        let mut holders = self.holders.lock().expect("lock map poisoned");
        match holders.get_mut(&token.key) {
            Some(h) if h.holder == token.holder && h.expires_at > now => {
                h.expires_at = now + lease;
                Ok(LockToken {
                    key: token.key.clone(),
                    holder: token.holder,
                    acquired_at: token.acquired_at,
                    lease,
                })
            }
            _ => Err(crate::MuninnError::LockUnavailable(
                "lease no longer held".into(),
            )),
        }
    }
}

// ============================================================================
// MemoryIdempotencyLedger
// ============================================================================

#[derive(Debug, Clone)]
enum Slot {
    Pending { expires_at: SystemTime },
    Complete {
        response: InferResponse,
        expires_at: SystemTime,
    },
}

impl Slot {
    fn expires_at(&self) -> SystemTime {
        match self {
            Slot::Pending { expires_at } | Slot::Complete { expires_at, .. } => *expires_at,
        }
    }
}

struct LedgerState {
    slots: HashMap<String, Slot>,
    next_sweep: Option<SystemTime>,
}

impl LedgerState {
    /// Drop every expired record once the earliest known expiry has passed.
    /// Correctness never depends on the sweep (expired slots already read
    /// as absent); it bounds how long completed payloads stay in memory.
    fn sweep_if_due(&mut self, now: SystemTime) {
        if self.next_sweep.is_some_and(|due| now >= due) {
            self.slots.retain(|_, slot| slot.expires_at() > now);
            self.next_sweep = self.slots.values().map(Slot::expires_at).min();
        }
    }

    fn insert(&mut self, token: &str, slot: Slot) {
        let expires_at = slot.expires_at();
        self.next_sweep = Some(self.next_sweep.map_or(expires_at, |due| due.min(expires_at)));
        self.slots.insert(token.to_string(), slot);
    }
}

/// Mutex-map idempotency ledger with expiry-scheduled eviction.
pub struct MemoryIdempotencyLedger {
    state: Mutex<LedgerState>,
}

impl MemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                slots: HashMap::new(),
                next_sweep: None,
            }),
        }
    }

    /// Records currently retained, live or awaiting the next sweep.
    pub fn len(&self) -> usize {
        self.state.lock().expect("ledger map poisoned").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIdempotencyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryIdempotencyLedger {
    async fn begin(&self, token: &str, pending_ttl: Duration) -> Result<Begin> {
        let now = SystemTime::now();
        let mut state = self.state.lock().expect("ledger map poisoned");
        state.sweep_if_due(now);
        match state.slots.get(token) {
            Some(Slot::Pending { expires_at }) if *expires_at > now => Ok(Begin::InFlight),
            Some(Slot::Complete {
                response,
                expires_at,
            }) if *expires_at > now => Ok(Begin::Complete(response.clone())),
            // Absent, or an expired record either way: this caller owns it.
            _ => {
                state.insert(
                    token,
                    Slot::Pending {
                        expires_at: now + pending_ttl,
                    },
                );
                Ok(Begin::Fresh)
            }
        }
    }

    async fn complete(&self, token: &str, response: &InferResponse, ttl: Duration) -> Result<()> {
        let now = SystemTime::now();
        let mut state = self.state.lock().expect("ledger map poisoned");
        state.sweep_if_due(now);
        state.insert(
            token,
            Slot::Complete {
                response: response.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn fail(&self, token: &str) -> Result<()> {
        let now = SystemTime::now();
        let mut state = self.state.lock().expect("ledger map poisoned");
        state.sweep_if_due(now);
        // Clear pending only; a completed record stays replayable.
        if matches!(state.slots.get(token), Some(Slot::Pending { .. })) {
            state.slots.remove(token);
        }
        Ok(())
    }
}

// ============================================================================
// MemoryRateLimiter
// ============================================================================

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

struct RateState {
    counters: HashMap<String, Window>,
    next_sweep: Option<Instant>,
}

/// Fixed-window rate limiter: at most `limit` admissions per `window`.
///
/// `retry_after` on denial is the remainder of the current window, so it
/// only shrinks as the window progresses. Idle identities are swept once
/// their window has lapsed, keeping the map bounded by live callers.
pub struct MemoryRateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<RateState>,
}

impl MemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(RateState {
                counters: HashMap::new(),
                next_sweep: None,
            }),
        }
    }

    /// Identities currently tracked, live or awaiting the next sweep.
    pub fn len(&self) -> usize {
        self.state.lock().expect("rate map poisoned").counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow(&self, identity: &str) -> Result<RateDecision> {
        let now = Instant::now();
        let window_len = self.window;
        let mut state = self.state.lock().expect("rate map poisoned");
        if state.next_sweep.is_some_and(|due| now >= due) {
            state
                .counters
                .retain(|_, w| now.duration_since(w.started_at) < window_len);
            state.next_sweep = state
                .counters
                .values()
                .map(|w| w.started_at + window_len)
                .min();
        }
        let (decision, window_expires_at) = {
            let window = state.counters.entry(identity.to_string()).or_insert(Window {
                started_at: now,
                count: 0,
            });
            if now.duration_since(window.started_at) >= window_len {
                window.started_at = now;
                window.count = 0;
            }
            let decision = if window.count >= self.limit {
                RateDecision::Denied {
                    retry_after: window_len - now.duration_since(window.started_at),
                }
            } else {
                window.count += 1;
                RateDecision::Allowed
            };
            (decision, window.started_at + window_len)
        };
        state.next_sweep = Some(
            state
                .next_sweep
                .map_or(window_expires_at, |due| due.min(window_expires_at)),
        );
        Ok(decision)
    }
}

// ============================================================================
// MemoryJobStore
// ============================================================================

/// Mutex-map job store with ttl-bounded records.
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, (JobRecord, SystemTime)>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, record: &JobRecord, ttl: Duration) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        jobs.insert(
            record.job_id.clone(),
            (record.clone(), SystemTime::now() + ttl),
        );
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let now = SystemTime::now();
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        match jobs.get(job_id) {
            Some((_, expires_at)) if *expires_at <= now => {
                jobs.remove(job_id);
                Ok(None)
            }
            Some((record, _)) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }
}
