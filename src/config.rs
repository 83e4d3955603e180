//! Configuration loading for muninnd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)
//!
//! Every ttl and timeout has a default; a config file only overrides what
//! it mentions. There is deliberately no way to configure "no ttl" — cached
//! derived data always expires.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::Operation;
use crate::{MuninnError, Result};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8410).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8410".to_string()
}

/// Timings governing the inference pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Cache ttl for OCR results in seconds (default: 1800).
    #[serde(default = "default_ttl_short")]
    pub cache_ttl_ocr_seconds: u64,
    /// Cache ttl for object detection results in seconds (default: 1800).
    #[serde(default = "default_ttl_short")]
    pub cache_ttl_object_detection_seconds: u64,
    /// Cache ttl for scene captions in seconds (default: 1800).
    #[serde(default = "default_ttl_short")]
    pub cache_ttl_scene_caption_seconds: u64,
    /// Cache ttl for multimodal query answers in seconds (default: 3600).
    #[serde(default = "default_ttl_long")]
    pub cache_ttl_multimodal_query_seconds: u64,

    /// Model deadline for OCR in seconds (default: 8).
    #[serde(default = "default_timeout_ocr")]
    pub timeout_ocr_seconds: f64,
    /// Model deadline for object detection in seconds (default: 10).
    #[serde(default = "default_timeout_object_detection")]
    pub timeout_object_detection_seconds: f64,
    /// Model deadline for scene captioning in seconds (default: 15).
    #[serde(default = "default_timeout_scene_caption")]
    pub timeout_scene_caption_seconds: f64,
    /// Model deadline for multimodal queries in seconds (default: 30).
    #[serde(default = "default_timeout_multimodal_query")]
    pub timeout_multimodal_query_seconds: f64,

    /// Dedup lock lease in seconds (default: 30). Also bounds how long a
    /// pending idempotency record can sit without an owner.
    #[serde(default = "default_lock_lease")]
    pub lock_lease_seconds: u64,
    /// How long a completed idempotency record replays, in seconds
    /// (default: 1800).
    #[serde(default = "default_ttl_short")]
    pub idempotency_ttl_seconds: u64,
    /// Grace period to wait on an in-flight idempotent request before
    /// reporting retryable, in seconds (default: 2).
    #[serde(default = "default_grace")]
    pub in_flight_grace_seconds: f64,
    /// Initial backoff while polling a busy dedup lock, in milliseconds
    /// (default: 50). Doubles per round, capped at one second.
    #[serde(default = "default_backoff_ms")]
    pub lock_backoff_initial_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        // serde defaults and Default must agree; route through an empty TOML
        // document so there is a single source of truth.
        toml::from_str("").expect("empty gateway config must deserialize")
    }
}

fn default_ttl_short() -> u64 {
    1800
}

fn default_ttl_long() -> u64 {
    3600
}

fn default_timeout_ocr() -> f64 {
    8.0
}

fn default_timeout_object_detection() -> f64 {
    10.0
}

fn default_timeout_scene_caption() -> f64 {
    15.0
}

fn default_timeout_multimodal_query() -> f64 {
    30.0
}

fn default_lock_lease() -> u64 {
    30
}

fn default_grace() -> f64 {
    2.0
}

fn default_backoff_ms() -> u64 {
    50
}

impl GatewayConfig {
    /// Cache ttl for an operation. Never zero, never unbounded.
    pub fn cache_ttl(&self, operation: Operation) -> Duration {
        let secs = match operation {
            Operation::Ocr => self.cache_ttl_ocr_seconds,
            Operation::ObjectDetection => self.cache_ttl_object_detection_seconds,
            Operation::SceneCaption => self.cache_ttl_scene_caption_seconds,
            Operation::MultimodalQuery => self.cache_ttl_multimodal_query_seconds,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Hard model deadline for an operation.
    pub fn model_timeout(&self, operation: Operation) -> Duration {
        let secs = match operation {
            Operation::Ocr => self.timeout_ocr_seconds,
            Operation::ObjectDetection => self.timeout_object_detection_seconds,
            Operation::SceneCaption => self.timeout_scene_caption_seconds,
            Operation::MultimodalQuery => self.timeout_multimodal_query_seconds,
        };
        Duration::from_secs_f64(secs)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_seconds)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }

    pub fn in_flight_grace(&self) -> Duration {
        Duration::from_secs_f64(self.in_flight_grace_seconds)
    }

    pub fn lock_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_initial_ms)
    }

    /// Reject timing fields that cannot form a `Duration`.
    ///
    /// `Duration::from_secs_f64` panics on negative or non-finite input, so
    /// these must be caught at load time, not mid-request.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("timeout_ocr_seconds", self.timeout_ocr_seconds),
            (
                "timeout_object_detection_seconds",
                self.timeout_object_detection_seconds,
            ),
            (
                "timeout_scene_caption_seconds",
                self.timeout_scene_caption_seconds,
            ),
            (
                "timeout_multimodal_query_seconds",
                self.timeout_multimodal_query_seconds,
            ),
            ("in_flight_grace_seconds", self.in_flight_grace_seconds),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(MuninnError::Configuration(format!(
                    "gateway.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateConfig {
    /// Admitted requests per identity per window (default: 30).
    #[serde(default = "default_rate_limit")]
    pub requests: u32,
    /// Window length in seconds (default: 60).
    #[serde(default = "default_rate_window")]
    pub window_seconds: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_limit(),
            window_seconds: default_rate_window(),
        }
    }
}

fn default_rate_limit() -> u32 {
    30
}

fn default_rate_window() -> u64 {
    60
}

impl RateConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Model service endpoints, one per operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub ocr_url: Option<String>,
    #[serde(default)]
    pub object_detection_url: Option<String>,
    #[serde(default)]
    pub scene_caption_url: Option<String>,
    #[serde(default)]
    pub multimodal_query_url: Option<String>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.muninn/config.toml`
    /// 3. `/etc/muninn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.gateway.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/muninn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MuninnError::Configuration(
            "No config file found. Create ~/.muninn/config.toml or /etc/muninn/config.toml"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:8410");
        assert_eq!(config.rate.requests, 30);
        assert_eq!(config.rate.window_seconds, 60);
        assert_eq!(
            config.gateway.cache_ttl(Operation::Ocr),
            Duration::from_secs(1800)
        );
        assert_eq!(
            config.gateway.cache_ttl(Operation::MultimodalQuery),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.gateway.model_timeout(Operation::Ocr),
            Duration::from_secs(8)
        );
        assert_eq!(config.gateway.lock_lease(), Duration::from_secs(30));
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:8410"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8410");
        // Defaults preserved
        assert_eq!(config.rate.requests, 30);
        assert_eq!(config.gateway.lock_lease_seconds, 30);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:8410"

            [gateway]
            cache_ttl_ocr_seconds = 600
            timeout_multimodal_query_seconds = 20.0
            lock_lease_seconds = 10

            [rate]
            requests = 5
            window_seconds = 10

            [models]
            ocr_url = "http://models.internal/ocr"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.gateway.cache_ttl(Operation::Ocr),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.gateway.model_timeout(Operation::MultimodalQuery),
            Duration::from_secs(20)
        );
        assert_eq!(config.gateway.lock_lease(), Duration::from_secs(10));
        assert_eq!(config.rate.requests, 5);
        assert_eq!(
            config.models.ocr_url.as_deref(),
            Some("http://models.internal/ocr")
        );
    }

    #[test]
    fn zero_ttl_is_clamped() {
        let toml = r#"
            [gateway]
            cache_ttl_ocr_seconds = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.gateway.cache_ttl(Operation::Ocr),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_reads_an_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[rate]\nrequests = 7\n\n[models]\nocr_url = \"http://models.internal/ocr\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.rate.requests, 7);
        assert_eq!(
            config.models.ocr_url.as_deref(),
            Some("http://models.internal/ocr")
        );
    }

    #[test]
    fn negative_timeout_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\ntimeout_ocr_seconds = -1.0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err().to_string();
        assert!(err.contains("timeout_ocr_seconds"));
    }

    #[test]
    fn non_finite_timings_fail_validation() {
        for grace in [f64::NAN, f64::INFINITY, -0.5] {
            let gateway = GatewayConfig {
                in_flight_grace_seconds: grace,
                ..Default::default()
            };
            assert!(gateway.validate().is_err(), "grace {grace} must be rejected");
        }
        let gateway = GatewayConfig {
            in_flight_grace_seconds: 0.0,
            ..Default::default()
        };
        assert!(gateway.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "rate = not toml").unwrap();

        let err = Config::load(Some(&path)).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }
}
