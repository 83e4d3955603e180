//! Content fingerprinting for cache and dedup keys.
//!
//! A [`FingerprintKey`] is derived deterministically from the operation,
//! the normalized input reference, and the canonical parameter encoding.
//! Identical visual input and parameters always yield the same key, which
//! is what lets the gateway deduplicate concurrent requests and serve
//! repeats from cache. The digest is SHA-256 so keys stay stable across
//! processes and store backends, and never embed the raw URL (which may
//! carry signed query credentials).

use sha2::{Digest, Sha256};

use crate::types::{Operation, OperationParams};
use crate::{MuninnError, Result};

/// Deterministic key for one (operation, input, params) combination.
///
/// Rendered as `cache:{op}:{digest}` / `lock:{op}:{digest}` for the result
/// cache and dedup lock respectively, so both stores cluster on the same
/// fingerprint while living in distinct key namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintKey {
    operation: Operation,
    digest: String,
}

impl FingerprintKey {
    /// Derive the fingerprint for a request.
    ///
    /// Fails with `InvalidInput` if the input reference cannot be
    /// normalized; that failure is terminal for the request, not retried.
    pub fn derive(
        operation: Operation,
        image_url: &str,
        params: &OperationParams,
    ) -> Result<Self> {
        let normalized = normalize_input_url(image_url)?;
        let mut hasher = Sha256::new();
        hasher.update(operation.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");
        hasher.update(params.canonical().as_bytes());
        let digest = hasher.finalize();
        Ok(Self {
            operation,
            digest: hex(&digest),
        })
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Store key for the result cache.
    pub fn cache_key(&self) -> String {
        format!("cache:{}:{}", self.operation, self.digest)
    }

    /// Store key for the dedup lock.
    pub fn lock_key(&self) -> String {
        format!("lock:{}:{}", self.operation, self.digest)
    }
}

/// Normalize an input reference for fingerprinting.
///
/// The reference must be an absolute URL (scheme + host). Scheme and host
/// are case-insensitive per RFC 3986 and are lowercased; the fragment is
/// client-side state and is dropped. Path and query are preserved verbatim
/// because storage references use them for object identity.
fn normalize_input_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| MuninnError::InvalidInput("image_url must be absolute".into()))?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return Err(MuninnError::InvalidInput("image_url has an invalid scheme".into()));
    }
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if host.is_empty() {
        return Err(MuninnError::InvalidInput("image_url must have a host".into()));
    }
    Ok(format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        host.to_ascii_lowercase(),
        path
    ))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
