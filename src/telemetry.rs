//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation` — inference operation (e.g. "ocr", "scene_caption")
//! - `status` — outcome: "ok" or "error"
//! - `source` — which path produced a client result: "remote" or "local"

/// Total gateway requests admitted past the rate check.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Model invocation duration in seconds.
///
/// Labels: `operation`.
pub const INFERENCE_DURATION_SECONDS: &str = "muninn_inference_duration_seconds";

/// Total result-cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total result-cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total idempotent replays served from the ledger.
///
/// Labels: `operation`.
pub const IDEMPOTENT_REPLAYS_TOTAL: &str = "muninn_idempotent_replays_total";

/// Total dedup-lock acquisition attempts that found the lock busy.
///
/// Labels: `operation`.
pub const DEDUP_BUSY_TOTAL: &str = "muninn_dedup_busy_total";

/// Total requests rejected by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "muninn_rate_limited_total";

/// Total model invocations that exceeded their deadline.
///
/// Labels: `operation`.
pub const INFERENCE_TIMEOUTS_TOTAL: &str = "muninn_inference_timeouts_total";

/// Total client-side fallbacks from the remote path to the local model.
///
/// Labels: `reason` ("offline" | "error" | "deadline").
pub const FALLBACKS_TOTAL: &str = "muninn_fallbacks_total";
