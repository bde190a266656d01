//! Registry and predictor wire types
//!
//! Field names follow the backend's JSON contract: manifests are addressed
//! by `name` + `version` (version defaults to "latest"), agents report a
//! `host`/`port` pair, predictions carry `label` + `probability`.

use serde::{Deserialize, Serialize};

use crate::types::{BatchSize, Device, ManifestKey, TraceLevel};

// ============================================================================
// REGISTRY MANIFESTS
// ============================================================================

/// One framework as listed by the registry, optionally carrying the agents
/// that serve it once they have been fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameworkManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentInfo>,
}

impl FrameworkManifest {
    pub fn key(&self) -> ManifestKey {
        ManifestKey {
            name: self.name.to_lowercase(),
            version: self.version.to_lowercase(),
        }
    }
}

/// One model manifest, optionally carrying its serving agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<ManifestKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentInfo>,
}

impl ModelManifest {
    pub fn key(&self) -> ManifestKey {
        ManifestKey {
            name: self.name.to_lowercase(),
            version: self.version.to_lowercase(),
        }
    }
}

fn default_version() -> String {
    "latest".to_string()
}

/// A serving agent registered for a framework or model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl AgentInfo {
    /// Registry identity of this agent (`host:port`)
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// LIST RESPONSES
// ============================================================================

/// `GET frameworks` / `GET models` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestsResponse<T> {
    #[serde(default)]
    pub manifests: Vec<T>,
}

/// `GET .../agents` envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsResponse {
    #[serde(default)]
    pub agents: Vec<AgentInfo>,
}

// ============================================================================
// PREDICTOR
// ============================================================================

/// What the predictor should classify: a URL the backend fetches itself, or
/// a list of already-uploaded input descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferInput {
    Url(String),
    Inputs(Vec<String>),
}

impl InferInput {
    pub fn is_empty(&self) -> bool {
        match self {
            InferInput::Url(url) => url.is_empty(),
            InferInput::Inputs(inputs) => inputs.is_empty(),
        }
    }
}

/// `POST predict` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    pub models: Vec<ManifestKey>,
    pub input: InferInput,
    pub batch_size: BatchSize,
    pub device: Device,
    pub trace_level: TraceLevel,
}

/// One classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
}

/// `POST predict` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

// ============================================================================
// TESTS
// ============================================================================
