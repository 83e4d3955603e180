//! Muninn - adaptive inference gateway for assistive vision
//!
//! A visually-impaired user points a camera at text or a scene and gets a
//! spoken answer from a remote ML model, staying responsive on unreliable
//! networks. This crate is the request pipeline around that: the server
//! gateway deduplicates, caches, rate-limits and idempotently replays
//! inference so the expensive model runs at most once per unique input,
//! and the client orchestrator chooses between the remote gateway and a
//! degraded on-device model under a hard latency budget.
//!
//! # Gateway example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use muninn::{InferenceGateway, InferRequest, Operation};
//! use muninn::model::{HttpModel, HttpModelConfig};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let model = HttpModel::new(
//!         HttpModelConfig::new().endpoint(Operation::Ocr, "http://models.internal/ocr"),
//!     );
//!     let gateway = InferenceGateway::builder().model(Arc::new(model)).build()?;
//!
//!     let request = InferRequest::new(Operation::Ocr, "https://img.example/receipt.jpg");
//!     let response = gateway.infer(request, "user-123", Some("retry-token-1")).await?;
//!     println!("{} (cache_hit: {})", response.payload, response.cache_hit);
//!     Ok(())
//! }
//! ```
//!
//! # Client example
//!
//! ```rust,ignore
//! use muninn::client::{AdaptiveOrchestrator, HttpRemote, OrchestratorConfig};
//!
//! let orchestrator = AdaptiveOrchestrator::new(
//!     Arc::new(HttpRemote::new("https://gateway.example").bearer("user-123")),
//!     local_model,
//!     network_monitor,
//!     OrchestratorConfig::default(),
//! );
//! let outcome = orchestrator.run(request).await?;
//! println!("{:?}: {}", outcome.source, outcome.payload);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod model;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use error::{MuninnError, Result};
pub use fingerprint::FingerprintKey;
pub use gateway::{GatewayBuilder, InferenceGateway};

// Re-export all wire types
pub use types::{
    InferRequest, InferResponse, Inference, JobRecord, JobStatus, JobTicket, Operation,
    OperationParams,
};
