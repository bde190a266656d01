//! Trigger surface - the named signals presentation code emits
//!
//! A signal is a name plus a flat payload, consumed exactly once by the
//! dispatcher. Payload keys follow the wire names the components use
//! (`predictURL`, `batchSize`, ...), so [`Signal::payload`] is the seed of
//! the execution scope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{AgentId, BatchSize, Device, ManifestKey, Page, TraceLevel};

// ============================================================================
// UPLOAD COLLABORATOR
// ============================================================================

/// One uploaded file as reported by the upload widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
}

/// The upload widget returns a mapping of file id → uploaded URL; the
/// orchestration layer takes the first resolved URL as the predict URL.
pub fn first_upload_url(uploads: &BTreeMap<String, UploadedFile>) -> Option<&str> {
    uploads.values().next().map(|file| file.upload_url.as_str())
}

// ============================================================================
// SIGNALS
// ============================================================================

/// Every signal the console can emit
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    // lifecycle
    AppLoaded,

    // route entries
    HomeRouted,
    ModelsRouted,
    FrameworksRouted,
    AgentsRouted {
        framework_id: Option<ManifestKey>,
    },
    AgentRouted {
        agent_id: Option<AgentId>,
        model_id: Option<ManifestKey>,
    },
    AboutRouted,
    AboutPageRouted,

    // navigation and tutorial
    NavbarClicked {
        page: Page,
    },
    OpenTutorial,
    CloseTutorial,

    // prediction setup
    PredictUrlChanged {
        predict_url: String,
    },
    PredictUrlAdded {
        uploads: BTreeMap<String, UploadedFile>,
    },
    PredictInputsSet {
        predict_inputs: Vec<String>,
    },
    BatchSizeChanged {
        batch_size: BatchSize,
    },
    DeviceChanged {
        device: Device,
    },
    TraceLevelChanged {
        level: TraceLevel,
    },
    AgentChanged {
        agent_id: AgentId,
    },

    // catalog and inference
    ModelInformationsRequest {
        model_id: Option<ManifestKey>,
    },
    InferenceButtonClicked {
        selected_models: BTreeMap<String, bool>,
    },
}

impl Signal {
    /// The chain this signal triggers
    pub fn name(&self) -> &'static str {
        match self {
            Signal::AppLoaded => "appLoaded",
            Signal::HomeRouted => "homeRouted",
            Signal::ModelsRouted => "modelsRouted",
            Signal::FrameworksRouted => "frameworksRouted",
            Signal::AgentsRouted { .. } => "agentsRouted",
            Signal::AgentRouted { .. } => "agentRouted",
            Signal::AboutRouted => "aboutRouted",
            Signal::AboutPageRouted => "aboutPageRouted",
            Signal::NavbarClicked { .. } => "navbarClicked",
            Signal::OpenTutorial => "openTutorial",
            Signal::CloseTutorial => "closeTutorial",
            Signal::PredictUrlChanged { .. } => "predictURLChanged",
            Signal::PredictUrlAdded { .. } => "predictURLAdded",
            Signal::PredictInputsSet { .. } => "predictInputsSet",
            Signal::BatchSizeChanged { .. } => "batchSizeChanged",
            Signal::DeviceChanged { .. } => "deviceChanged",
            Signal::TraceLevelChanged { .. } => "traceLevelChanged",
            Signal::AgentChanged { .. } => "agentChanged",
            Signal::ModelInformationsRequest { .. } => "modelInformationsRequest",
            Signal::InferenceButtonClicked { .. } => "inferenceButtonClicked",
        }
    }

    /// The flat payload record seeding the execution scope. Optional fields
    /// are omitted rather than serialized as null, so `when` branches read
    /// them as absent.
    pub fn payload(&self) -> Value {
        match self {
            Signal::AppLoaded
            | Signal::HomeRouted
            | Signal::ModelsRouted
            | Signal::FrameworksRouted
            | Signal::AboutRouted
            | Signal::AboutPageRouted
            | Signal::OpenTutorial
            | Signal::CloseTutorial => Value::Null,

            Signal::AgentsRouted { framework_id } => match framework_id {
                Some(framework) => json!({ "frameworkId": framework.to_string() }),
                None => Value::Null,
            },

            Signal::AgentRouted { agent_id, model_id } => {
                let mut payload = serde_json::Map::new();
                if let Some(agent) = agent_id {
                    payload.insert("agentId".into(), json!(agent));
                }
                if let Some(model) = model_id {
                    payload.insert("modelId".into(), json!(model.to_string()));
                }
                Value::Object(payload)
            }

            Signal::NavbarClicked { page } => json!({ "page": page }),

            Signal::PredictUrlChanged { predict_url } => json!({ "predictURL": predict_url }),

            Signal::PredictUrlAdded { uploads } => {
                json!({ "predictURL": first_upload_url(uploads).unwrap_or_default() })
            }

            Signal::PredictInputsSet { predict_inputs } => {
                json!({ "predictInputs": predict_inputs })
            }

            Signal::BatchSizeChanged { batch_size } => json!({ "batchSize": batch_size }),

            Signal::DeviceChanged { device } => json!({ "device": device }),

            Signal::TraceLevelChanged { level } => json!({ "level": level }),

            Signal::AgentChanged { agent_id } => json!({ "agentId": agent_id }),

            Signal::ModelInformationsRequest { model_id } => match model_id {
                Some(model) => json!({ "modelId": model.to_string() }),
                None => Value::Null,
            },

            Signal::InferenceButtonClicked { selected_models } => {
                json!({ "selectedModels": selected_models })
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
