//! Edge-side orchestration: remote-first inference with local fallback.

mod orchestrator;
mod remote;

pub use orchestrator::{
    AdaptiveOrchestrator, CacheMeta, CaptureOutcome, NetworkStatus, OrchestratorConfig,
    RemoteInference, ResultSource,
};
pub use remote::HttpRemote;
