//! Backend abstraction layer
//!
//! Trait and implementations for the inference registry/predictor service.
//! The orchestration core never speaks HTTP directly: async actions go
//! through [`Backend`], which has a production implementation over reqwest
//! and a configurable mock for tests and offline runs.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::{AppError, FixSuggestion};
use crate::manifest::{
    AgentInfo, AgentsResponse, FrameworkManifest, InferRequest, InferResponse, ManifestsResponse,
    ModelManifest,
};
use crate::types::ManifestKey;

/// Default timeout for registry and predictor requests (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Connect timeout (10 seconds)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ERRORS
// ============================================================================

/// Failures an async action can resolve with. These never abort the
/// dispatcher; they are routed into the chain's `error` sub-chain.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Structured error payload from the backend (`{name, message, code}`)
    #[error("{name} ({code}): {message}")]
    Api {
        name: String,
        message: String,
        code: u16,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("unknown framework '{0}'")]
    UnknownFramework(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

impl BackendError {
    /// Convert into the user-displayable record stored in `state.error`.
    /// `operation` names the failing call the way the backend does
    /// (e.g. "GetFrameworkManifests").
    pub fn to_app_error(&self, operation: &str) -> AppError {
        match self {
            BackendError::Api {
                name,
                message,
                code,
            } => AppError::new(name.clone(), message.clone()).with_code(*code),
            other => AppError::new(operation, other.to_string()),
        }
    }
}

impl FixSuggestion for BackendError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BackendError::Api { .. } => Some("The backend rejected the request; check its logs"),
            BackendError::Network(_) => Some("Check the backend address and that it is running"),
            BackendError::Decode(_) => Some("The backend answered with an unexpected shape"),
            BackendError::Validation(_) => None,
            BackendError::UnknownFramework(_) => {
                Some("Load the framework catalog first, or check the framework name")
            }
            BackendError::UnknownModel(_) => {
                Some("Load the model catalog first, or check the model name")
            }
        }
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// The registry/predictor service the console talks to.
///
/// All methods are read-only lookups except [`Backend::predict`]. The wire
/// format belongs to the backend; only the field names used here are part of
/// this crate's contract.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Implementation name ("http", "mock")
    fn name(&self) -> &str;

    async fn frameworks(&self) -> Result<Vec<FrameworkManifest>, BackendError>;

    async fn framework_agents(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<AgentInfo>, BackendError>;

    async fn framework_models(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<ModelManifest>, BackendError>;

    async fn models(&self) -> Result<Vec<ModelManifest>, BackendError>;

    async fn model_manifest(&self, model: &ManifestKey) -> Result<ModelManifest, BackendError>;

    async fn model_agents(&self, model: &ManifestKey) -> Result<Vec<AgentInfo>, BackendError>;

    async fn predict(&self, request: InferRequest) -> Result<InferResponse, BackendError>;
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

/// Production backend over HTTP with a shared connection-pooled client
pub struct HttpBackend {
    base: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend rooted at `base` (e.g. `http://localhost:8088/api`)
    pub fn new(base: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("synapse/0.1")
            .build()
            .expect("Failed to build HTTP client");

        Self { base, client }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Validation("backend address cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        operation: &'static str,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(segments)?;
        debug!(%url, operation, "registry GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        decode_response(response, operation).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn frameworks(&self) -> Result<Vec<FrameworkManifest>, BackendError> {
        let response: ManifestsResponse<FrameworkManifest> = self
            .get_json(&["frameworks"], "GetFrameworkManifests")
            .await?;
        Ok(response.manifests)
    }

    async fn framework_agents(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<AgentInfo>, BackendError> {
        let response: AgentsResponse = self
            .get_json(
                &["frameworks", &framework.name, &framework.version, "agents"],
                "GetFrameworkAgents",
            )
            .await?;
        Ok(response.agents)
    }

    async fn framework_models(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<ModelManifest>, BackendError> {
        let response: ManifestsResponse<ModelManifest> = self
            .get_json(
                &["frameworks", &framework.name, &framework.version, "models"],
                "GetFrameworkModels",
            )
            .await?;
        Ok(response.manifests)
    }

    async fn models(&self) -> Result<Vec<ModelManifest>, BackendError> {
        let response: ManifestsResponse<ModelManifest> =
            self.get_json(&["models"], "GetModelManifests").await?;
        Ok(response.manifests)
    }

    async fn model_manifest(&self, model: &ManifestKey) -> Result<ModelManifest, BackendError> {
        self.get_json(
            &["models", &model.name, &model.version, "manifest"],
            "GetModelManifest",
        )
        .await
    }

    async fn model_agents(&self, model: &ManifestKey) -> Result<Vec<AgentInfo>, BackendError> {
        let response: AgentsResponse = self
            .get_json(
                &["models", &model.name, &model.version, "agents"],
                "GetModelAgents",
            )
            .await?;
        Ok(response.agents)
    }

    async fn predict(&self, request: InferRequest) -> Result<InferResponse, BackendError> {
        let url = self.endpoint(&["predict"])?;
        debug!(%url, models = request.models.len(), "predictor POST");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        decode_response(response, "Predict").await
    }
}

/// Error payload shape the backend produces on failures
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    name: String,
    message: String,
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if let Ok(api) = serde_json::from_str::<ApiErrorBody>(&body) {
            return Err(BackendError::Api {
                name: api.name,
                message: api.message,
                code: status.as_u16(),
            });
        }
        return Err(BackendError::Api {
            name: operation.to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            code: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

/// Configurable in-memory backend for tests and offline runs.
///
/// Records every call so tests can assert what the orchestration layer
/// actually requested.
#[derive(Default)]
pub struct MockBackend {
    frameworks: Mutex<Vec<FrameworkManifest>>,
    models: Mutex<Vec<ModelManifest>>,
    /// manifest key ("name:version") → agents
    agents: Mutex<FxHashMap<String, Vec<AgentInfo>>>,
    predictions: Mutex<InferResponse>,
    /// When set, every call fails with a clone of this error
    failure: Mutex<Option<BackendError>>,
    /// Artificial latency per call, so tests can observe in-flight flags
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    last_infer_request: Mutex<Option<InferRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frameworks(self, frameworks: Vec<FrameworkManifest>) -> Self {
        *self.frameworks.lock() = frameworks;
        self
    }

    pub fn with_models(self, models: Vec<ModelManifest>) -> Self {
        *self.models.lock() = models;
        self
    }

    pub fn with_agents(self, key: &ManifestKey, agents: Vec<AgentInfo>) -> Self {
        self.agents.lock().insert(key.to_string(), agents);
        self
    }

    pub fn with_predictions(self, response: InferResponse) -> Self {
        *self.predictions.lock() = response;
        self
    }

    pub fn with_failure(self, error: BackendError) -> Self {
        *self.failure.lock() = Some(error);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Make subsequent calls fail (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<BackendError>) {
        *self.failure.lock() = error;
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// The last prediction request submitted
    pub fn last_infer_request(&self) -> Option<InferRequest> {
        self.last_infer_request.lock().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), BackendError> {
        self.calls.lock().push(call.into());
        match &*self.failure.lock() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn frameworks(&self) -> Result<Vec<FrameworkManifest>, BackendError> {
        self.record("frameworks")?;
        self.simulate_latency().await;
        Ok(self.frameworks.lock().clone())
    }

    async fn framework_agents(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<AgentInfo>, BackendError> {
        self.record(format!("framework_agents {}", framework))?;
        self.simulate_latency().await;
        if let Some(agents) = self.agents.lock().get(&framework.to_string()) {
            return Ok(agents.clone());
        }
        let known = self
            .frameworks
            .lock()
            .iter()
            .any(|manifest| manifest.key() == *framework);
        if known {
            Ok(Vec::new())
        } else {
            Err(BackendError::UnknownFramework(framework.to_string()))
        }
    }

    async fn framework_models(
        &self,
        framework: &ManifestKey,
    ) -> Result<Vec<ModelManifest>, BackendError> {
        self.record(format!("framework_models {}", framework))?;
        self.simulate_latency().await;
        Ok(self
            .models
            .lock()
            .iter()
            .filter(|model| model.framework.as_ref() == Some(framework))
            .cloned()
            .collect())
    }

    async fn models(&self) -> Result<Vec<ModelManifest>, BackendError> {
        self.record("models")?;
        self.simulate_latency().await;
        Ok(self.models.lock().clone())
    }

    async fn model_manifest(&self, model: &ManifestKey) -> Result<ModelManifest, BackendError> {
        self.record(format!("model_manifest {}", model))?;
        self.simulate_latency().await;
        self.models
            .lock()
            .iter()
            .find(|manifest| manifest.key() == *model)
            .cloned()
            .ok_or_else(|| BackendError::UnknownModel(model.to_string()))
    }

    async fn model_agents(&self, model: &ManifestKey) -> Result<Vec<AgentInfo>, BackendError> {
        self.record(format!("model_agents {}", model))?;
        self.simulate_latency().await;
        if let Some(agents) = self.agents.lock().get(&model.to_string()) {
            return Ok(agents.clone());
        }
        let known = self
            .models
            .lock()
            .iter()
            .any(|manifest| manifest.key() == *model);
        if known {
            Ok(Vec::new())
        } else {
            Err(BackendError::UnknownModel(model.to_string()))
        }
    }

    async fn predict(&self, request: InferRequest) -> Result<InferResponse, BackendError> {
        self.record("predict")?;
        self.simulate_latency().await;
        if request.models.is_empty() {
            return Err(BackendError::Validation("no models selected".into()));
        }
        if request.input.is_empty() {
            return Err(BackendError::Validation("nothing to classify".into()));
        }
        *self.last_infer_request.lock() = Some(request);
        Ok(self.predictions.lock().clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{InferInput, Prediction};
    use crate::types::{BatchSize, Device, TraceLevel};

    fn framework(name: &str, version: &str) -> FrameworkManifest {
        FrameworkManifest {
            name: name.to_string(),
            version: version.to_string(),
            container: None,
            agents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn mock_returns_configured_frameworks() {
        let backend = MockBackend::new().with_frameworks(vec![framework("mxnet", "0.11")]);

        let frameworks = backend.frameworks().await.unwrap();
        assert_eq!(frameworks.len(), 1);
        assert_eq!(backend.calls(), vec!["frameworks"]);
    }

    #[tokio::test]
    async fn mock_fails_every_call_when_configured() {
        let backend =
            MockBackend::new().with_failure(BackendError::Network("connection refused".into()));

        assert!(backend.frameworks().await.is_err());
        assert!(backend.models().await.is_err());

        backend.set_failure(None);
        assert!(backend.frameworks().await.is_ok());
    }

    #[tokio::test]
    async fn mock_rejects_unknown_framework_agents() {
        let backend = MockBackend::new().with_frameworks(vec![framework("mxnet", "0.11")]);

        let known: ManifestKey = "mxnet:0.11".parse().unwrap();
        assert!(backend.framework_agents(&known).await.unwrap().is_empty());

        let unknown: ManifestKey = "caffe2:latest".parse().unwrap();
        let result = backend.framework_agents(&unknown).await;
        assert!(matches!(result, Err(BackendError::UnknownFramework(_))));
    }

    #[tokio::test]
    async fn mock_predict_records_request() {
        let backend = MockBackend::new().with_predictions(InferResponse {
            predictions: vec![Prediction {
                label: "tabby cat".into(),
                probability: 0.93,
            }],
        });

        let response = backend
            .predict(InferRequest {
                models: vec!["alexnet".parse().unwrap()],
                input: InferInput::Url("http://x/img.jpg".into()),
                batch_size: BatchSize::default(),
                device: Device::Gpu,
                trace_level: TraceLevel::FullTrace,
            })
            .await
            .unwrap();

        assert_eq!(response.predictions[0].label, "tabby cat");
        let recorded = backend.last_infer_request().unwrap();
        assert_eq!(recorded.models[0].name, "alexnet");
    }

    #[tokio::test]
    async fn mock_predict_validates_input() {
        let backend = MockBackend::new();

        let result = backend
            .predict(InferRequest {
                models: vec![],
                input: InferInput::Url("http://x/img.jpg".into()),
                batch_size: BatchSize::default(),
                device: Device::Gpu,
                trace_level: TraceLevel::FullTrace,
            })
            .await;

        assert!(matches!(result, Err(BackendError::Validation(_))));
    }

    #[test]
    fn http_backend_builds_endpoints_under_base_path() {
        let backend = HttpBackend::new(Url::parse("http://localhost:8088/api/").unwrap());
        let url = backend
            .endpoint(&["frameworks", "mxnet", "0.11", "agents"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8088/api/frameworks/mxnet/0.11/agents"
        );
    }

    #[test]
    fn api_error_converts_to_app_error() {
        let error = BackendError::Api {
            name: "GetFrameworkManifests".into(),
            message: "registry unavailable".into(),
            code: 502,
        };
        let app = error.to_app_error("GetFrameworkManifests");
        assert_eq!(app.code, Some(502));
        assert_eq!(app.message, "registry unavailable");

        let network = BackendError::Network("connection refused".into());
        let app = network.to_app_error("Predict");
        assert_eq!(app.name, "Predict");
        assert!(app.message.contains("connection refused"));
    }
}
