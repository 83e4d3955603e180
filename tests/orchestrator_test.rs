//! Tests for the adaptive orchestrator: remote-first routing, fallback on
//! failure or deadline, never on low confidence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use muninn::client::{
    AdaptiveOrchestrator, NetworkStatus, OrchestratorConfig, RemoteInference, ResultSource,
};
use muninn::model::InferenceModel;
use muninn::types::{InferRequest, InferResponse, Inference, Operation, OperationParams};
use muninn::{MuninnError, Result};

struct FlagNetwork {
    online: AtomicBool,
}

impl FlagNetwork {
    fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }
}

impl NetworkStatus for FlagNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

enum RemoteScript {
    Succeed { confidence: f32 },
    Fail,
    Hang,
}

struct ScriptedRemote {
    script: RemoteScript,
    calls: AtomicU32,
    tokens: std::sync::Mutex<Vec<String>>,
}

impl ScriptedRemote {
    fn new(script: RemoteScript) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
            tokens: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn seen_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteInference for ScriptedRemote {
    async fn infer(&self, _request: &InferRequest, idem_token: &str) -> Result<InferResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.tokens.lock().unwrap().push(idem_token.to_string());
        match self.script {
            RemoteScript::Succeed { confidence } => Ok(InferResponse {
                payload: serde_json::json!("remote answer"),
                confidence,
                request_id: "req-remote".into(),
                cache_hit: false,
                ttl_seconds: 1800,
            }),
            RemoteScript::Fail => Err(MuninnError::InferenceFailed("scripted failure".into())),
            RemoteScript::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("the deadline cancels the attempt first")
            }
        }
    }
}

struct LocalModel {
    payload: serde_json::Value,
    fail: bool,
    delay: Duration,
    calls: AtomicU32,
}

impl LocalModel {
    fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        let mut model = Self::new(serde_json::Value::Null);
        model.fail = true;
        model
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InferenceModel for LocalModel {
    fn name(&self) -> &str {
        "local-degraded"
    }

    async fn infer(
        &self,
        _operation: Operation,
        _image_url: &str,
        _params: &OperationParams,
        _deadline: Duration,
    ) -> Result<Inference> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(MuninnError::InferenceFailed("local model broke".into()));
        }
        Ok(Inference::new(self.payload.clone(), 0.5))
    }
}

fn orchestrator(
    remote: Arc<ScriptedRemote>,
    local: Arc<LocalModel>,
    online: bool,
    config: OrchestratorConfig,
) -> AdaptiveOrchestrator {
    AdaptiveOrchestrator::new(remote, local, Arc::new(FlagNetwork::new(online)), config)
}

fn request() -> InferRequest {
    InferRequest::new(Operation::SceneCaption, "https://img.example/street.jpg")
}

#[tokio::test]
async fn offline_goes_straight_to_the_local_model() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Succeed { confidence: 0.9 }));
    let local = Arc::new(LocalModel::new(serde_json::json!("a quiet street")));
    let orch = orchestrator(remote.clone(), local.clone(), false, Default::default());

    let outcome = orch.run(request()).await.unwrap();
    assert_eq!(outcome.source, ResultSource::Local);
    assert_eq!(outcome.payload, serde_json::json!("a quiet street"));
    assert!(outcome.cache.is_none());
    assert_eq!(remote.call_count(), 0);
    assert_eq!(local.call_count(), 1);
}

#[tokio::test]
async fn online_prefers_remote_and_carries_cache_metadata() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Succeed { confidence: 0.9 }));
    let local = Arc::new(LocalModel::new(serde_json::json!("unused")));
    let orch = orchestrator(remote.clone(), local.clone(), true, Default::default());

    let outcome = orch.run(request()).await.unwrap();
    assert_eq!(outcome.source, ResultSource::Remote);
    assert_eq!(outcome.payload, serde_json::json!("remote answer"));
    let cache = outcome.cache.expect("remote results carry cache metadata");
    assert_eq!(cache.request_id, "req-remote");
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn low_confidence_remote_result_is_kept_not_replaced() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Succeed { confidence: 0.15 }));
    let local = Arc::new(LocalModel::new(serde_json::json!("unused")));
    let orch = orchestrator(remote.clone(), local.clone(), true, Default::default());

    let outcome = orch.run(request()).await.unwrap();
    assert_eq!(outcome.source, ResultSource::Remote);
    assert_eq!(outcome.confidence, 0.15);
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn remote_error_falls_back_to_local() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Fail));
    let local = Arc::new(LocalModel::new(serde_json::json!("backup caption")));
    let orch = orchestrator(remote.clone(), local.clone(), true, Default::default());

    let outcome = orch.run(request()).await.unwrap();
    assert_eq!(outcome.source, ResultSource::Local);
    assert_eq!(outcome.payload, serde_json::json!("backup caption"));
    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn remote_deadline_overrun_falls_back_to_local() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Hang));
    let local = Arc::new(LocalModel::new(serde_json::json!("backup caption")));
    let config = OrchestratorConfig {
        remote_deadline: Duration::from_millis(50),
        ..Default::default()
    };
    let orch = orchestrator(remote.clone(), local.clone(), true, config);

    let outcome = orch.run(request()).await.unwrap();
    assert_eq!(outcome.source, ResultSource::Local);
    assert_eq!(local.call_count(), 1);
}

#[tokio::test]
async fn each_remote_attempt_carries_a_fresh_token() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Succeed { confidence: 0.9 }));
    let local = Arc::new(LocalModel::new(serde_json::json!("unused")));
    let orch = orchestrator(remote.clone(), local, true, Default::default());

    orch.run(request()).await.unwrap();
    orch.run(request()).await.unwrap();

    let tokens = remote.seen_tokens();
    assert_eq!(tokens.len(), 2);
    assert_ne!(tokens[0], tokens[1]);
    assert!(!tokens[0].is_empty());
}

#[tokio::test]
async fn empty_local_result_is_an_error() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Fail));
    let local = Arc::new(LocalModel::new(serde_json::json!("")));
    let orch = orchestrator(remote, local, true, Default::default());

    let result = orch.run(request()).await;
    assert!(matches!(result, Err(MuninnError::EmptyResult)));
}

#[tokio::test]
async fn both_paths_failing_surfaces_the_local_error() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Fail));
    let local = Arc::new(LocalModel::failing());
    let orch = orchestrator(remote, local, true, Default::default());

    let result = orch.run(request()).await;
    assert!(matches!(result, Err(MuninnError::InferenceFailed(_))));
}

#[tokio::test]
async fn slow_local_model_times_out() {
    let remote = Arc::new(ScriptedRemote::new(RemoteScript::Fail));
    let local = Arc::new(
        LocalModel::new(serde_json::json!("too late")).delay(Duration::from_millis(200)),
    );
    let config = OrchestratorConfig {
        local_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let orch = orchestrator(remote, local, true, config);

    let result = orch.run(request()).await;
    assert!(matches!(result, Err(MuninnError::InferenceTimeout)));
}
