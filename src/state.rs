//! The application state tree
//!
//! A single versioned, typed document holding everything the console
//! displays. Mutation happens only through [`StateTree::set_field`] /
//! [`StateTree::unset_field`], called by the dispatcher while it applies a
//! committed operator batch; presentation code only ever sees value-copied
//! projections.
//!
//! There are no string paths here: every addressable location is a variant
//! of [`Field`], so a chain cannot reference state that does not exist.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, SynapseError};
use crate::manifest::{AgentInfo, FrameworkManifest, ModelManifest, Prediction};
use crate::types::{AgentId, BatchSize, Device, ManifestKey, Page, TraceLevel};

/// Application name shown in the navbar when no page title overrides it
pub const APP_NAME: &str = "Synapse";

// ============================================================================
// STATUS FLAGS
// ============================================================================

/// Boolean activity flags derived from chain progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusFlag {
    Busy,
    Loaded,
    Predicting,
    LoadingModel,
    LoadingFrameworkAgents,
    LoadingFrameworkManifests,
    LoadingModelAgents,
    LoadingModelManifests,
}

impl StatusFlag {
    /// Flags that belong to the same loading family: at most one of a
    /// family may be true at a time.
    fn family(self) -> &'static [StatusFlag] {
        match self {
            StatusFlag::LoadingFrameworkAgents | StatusFlag::LoadingFrameworkManifests => &[
                StatusFlag::LoadingFrameworkAgents,
                StatusFlag::LoadingFrameworkManifests,
            ],
            StatusFlag::LoadingModel
            | StatusFlag::LoadingModelAgents
            | StatusFlag::LoadingModelManifests => &[
                StatusFlag::LoadingModel,
                StatusFlag::LoadingModelAgents,
                StatusFlag::LoadingModelManifests,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusFlag::Busy => "is_busy",
            StatusFlag::Loaded => "is_loaded",
            StatusFlag::Predicting => "is_predicting",
            StatusFlag::LoadingModel => "is_loading_model",
            StatusFlag::LoadingFrameworkAgents => "is_loading_framework_agents",
            StatusFlag::LoadingFrameworkManifests => "is_loading_framework_manifests",
            StatusFlag::LoadingModelAgents => "is_loading_model_agents",
            StatusFlag::LoadingModelManifests => "is_loading_model_manifests",
        };
        write!(f, "{}", name)
    }
}

/// The status record of the state tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_busy: bool,
    pub is_loaded: bool,
    pub is_predicting: bool,
    pub is_loading_model: bool,
    pub is_loading_framework_agents: bool,
    pub is_loading_framework_manifests: bool,
    pub is_loading_model_agents: bool,
    pub is_loading_model_manifests: bool,
}

impl Status {
    pub fn get(&self, flag: StatusFlag) -> bool {
        match flag {
            StatusFlag::Busy => self.is_busy,
            StatusFlag::Loaded => self.is_loaded,
            StatusFlag::Predicting => self.is_predicting,
            StatusFlag::LoadingModel => self.is_loading_model,
            StatusFlag::LoadingFrameworkAgents => self.is_loading_framework_agents,
            StatusFlag::LoadingFrameworkManifests => self.is_loading_framework_manifests,
            StatusFlag::LoadingModelAgents => self.is_loading_model_agents,
            StatusFlag::LoadingModelManifests => self.is_loading_model_manifests,
        }
    }

    /// Set a flag. Raising a loading flag lowers the other flags of its
    /// family, which keeps the one-active-load-per-family invariant by
    /// construction.
    pub fn set(&mut self, flag: StatusFlag, value: bool) {
        if value {
            for peer in flag.family() {
                if *peer != flag {
                    self.write(*peer, false);
                }
            }
        }
        self.write(flag, value);
    }

    fn write(&mut self, flag: StatusFlag, value: bool) {
        match flag {
            StatusFlag::Busy => self.is_busy = value,
            StatusFlag::Loaded => self.is_loaded = value,
            StatusFlag::Predicting => self.is_predicting = value,
            StatusFlag::LoadingModel => self.is_loading_model = value,
            StatusFlag::LoadingFrameworkAgents => self.is_loading_framework_agents = value,
            StatusFlag::LoadingFrameworkManifests => self.is_loading_framework_manifests = value,
            StatusFlag::LoadingModelAgents => self.is_loading_model_agents = value,
            StatusFlag::LoadingModelManifests => self.is_loading_model_manifests = value,
        }
    }

    /// True while any fetch or prediction is in flight
    pub fn any_loading(&self) -> bool {
        self.is_predicting
            || self.is_loading_model
            || self.is_loading_framework_agents
            || self.is_loading_framework_manifests
            || self.is_loading_model_agents
            || self.is_loading_model_manifests
    }
}

// ============================================================================
// CATALOGS
// ============================================================================

/// Loaded framework catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frameworks {
    pub data: Vec<FrameworkManifest>,
}

/// Loaded model catalog plus the current selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Models {
    /// model key ("name:version") → manifest
    pub data: BTreeMap<String, ModelManifest>,
    /// model keys currently chosen for prediction
    pub selected: BTreeSet<String>,
}

/// Agents fetched for one framework, produced by the agents fetch action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkAgentsUpdate {
    pub framework: ManifestKey,
    pub agents: Vec<AgentInfo>,
}

/// Agents fetched for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAgentsUpdate {
    pub model: ManifestKey,
    pub agents: Vec<AgentInfo>,
}

// ============================================================================
// FIELD ADDRESSES
// ============================================================================

/// Every location an operator may touch. The typed equivalent of a dotted
/// state path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Error,
    CurrentPage,
    PredictUrl,
    PredictInputs,
    BatchSize,
    Device,
    TraceLevel,
    SelectedAgent,
    SelectedModels,
    Predictions,
    TutorialOpen,
    Status(StatusFlag),
    FrameworksData,
    FrameworkAgents,
    ModelsData,
    ModelEntry,
    ModelAgents,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => write!(f, "name"),
            Field::Error => write!(f, "error"),
            Field::CurrentPage => write!(f, "current_page"),
            Field::PredictUrl => write!(f, "predict_url"),
            Field::PredictInputs => write!(f, "predict_inputs"),
            Field::BatchSize => write!(f, "batch_size"),
            Field::Device => write!(f, "device"),
            Field::TraceLevel => write!(f, "trace_level"),
            Field::SelectedAgent => write!(f, "selected_agent"),
            Field::SelectedModels => write!(f, "models.selected"),
            Field::Predictions => write!(f, "predictions"),
            Field::TutorialOpen => write!(f, "tutorial_open"),
            Field::Status(flag) => write!(f, "status.{}", flag),
            Field::FrameworksData => write!(f, "frameworks.data"),
            Field::FrameworkAgents => write!(f, "frameworks.agents"),
            Field::ModelsData => write!(f, "models.data"),
            Field::ModelEntry => write!(f, "models.entry"),
            Field::ModelAgents => write!(f, "models.agents"),
        }
    }
}

// ============================================================================
// STATE TREE
// ============================================================================

/// The single shared application state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTree {
    /// Monotonic version, bumped once per committed operator batch
    pub version: u64,
    pub name: String,
    pub error: Option<AppError>,
    pub current_page: Page,
    pub status: Status,
    pub predict_inputs: Vec<String>,
    #[serde(rename = "predictURL")]
    pub predict_url: String,
    pub batch_size: BatchSize,
    pub device: Device,
    pub trace_level: TraceLevel,
    pub models: Models,
    pub frameworks: Frameworks,
    pub selected_agent: Option<AgentId>,
    pub predictions: Vec<Prediction>,
    pub tutorial_open: bool,
}

impl Default for StateTree {
    fn default() -> Self {
        Self {
            version: 0,
            name: APP_NAME.to_string(),
            error: None,
            current_page: Page::Home,
            status: Status::default(),
            predict_inputs: Vec::new(),
            predict_url: String::new(),
            batch_size: BatchSize::default(),
            device: Device::default(),
            trace_level: TraceLevel::default(),
            models: Models::default(),
            frameworks: Frameworks::default(),
            selected_agent: None,
            predictions: Vec::new(),
            tutorial_open: false,
        }
    }
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Everything the inference chain needs before it may raise the
    /// predicting flag: a non-empty selection and something to classify.
    pub fn ready_to_predict(&self) -> bool {
        !self.models.selected.is_empty()
            && (!self.predict_url.is_empty() || !self.predict_inputs.is_empty())
    }

    /// Replace the value at `field`. Returns whether the tree changed, so
    /// the dispatcher can coalesce no-op batches (idempotence is observable:
    /// re-applying an identical value publishes nothing).
    pub fn set_field(&mut self, field: Field, value: Value) -> Result<bool, SynapseError> {
        match field {
            Field::Name => {
                let name: String = decode(field, value)?;
                Ok(replace(&mut self.name, name))
            }
            Field::Error => {
                let error: Option<AppError> = decode(field, value)?;
                Ok(replace(&mut self.error, error))
            }
            Field::CurrentPage => {
                let page: Page = decode(field, value)?;
                Ok(replace(&mut self.current_page, page))
            }
            Field::PredictUrl => {
                let url: String = decode(field, value)?;
                Ok(replace(&mut self.predict_url, url))
            }
            Field::PredictInputs => {
                let inputs: Vec<String> = decode(field, value)?;
                Ok(replace(&mut self.predict_inputs, inputs))
            }
            Field::BatchSize => {
                let batch: BatchSize = decode(field, value)?;
                Ok(replace(&mut self.batch_size, batch))
            }
            Field::Device => {
                let device: Device = decode(field, value)?;
                Ok(replace(&mut self.device, device))
            }
            Field::TraceLevel => {
                let level: TraceLevel = decode(field, value)?;
                Ok(replace(&mut self.trace_level, level))
            }
            Field::SelectedAgent => {
                let agent: Option<AgentId> = decode(field, value)?;
                Ok(replace(&mut self.selected_agent, agent))
            }
            Field::SelectedModels => {
                let selected = decode_selection(field, value)?;
                Ok(replace(&mut self.models.selected, selected))
            }
            Field::Predictions => {
                let predictions: Vec<Prediction> = decode(field, value)?;
                Ok(replace(&mut self.predictions, predictions))
            }
            Field::TutorialOpen => {
                let open: bool = decode(field, value)?;
                Ok(replace(&mut self.tutorial_open, open))
            }
            Field::Status(flag) => {
                let raised: bool = decode(field, value)?;
                let before = self.status;
                self.status.set(flag, raised);
                Ok(self.status != before)
            }
            Field::FrameworksData => {
                let data: Vec<FrameworkManifest> = decode(field, value)?;
                Ok(replace(&mut self.frameworks.data, data))
            }
            Field::FrameworkAgents => {
                let updates: Vec<FrameworkAgentsUpdate> = decode(field, value)?;
                Ok(self.apply_framework_agents(updates))
            }
            Field::ModelsData => {
                let data: Vec<ModelManifest> = decode(field, value)?;
                let map: BTreeMap<String, ModelManifest> = data
                    .into_iter()
                    .map(|manifest| (manifest.key().to_string(), manifest))
                    .collect();
                Ok(replace(&mut self.models.data, map))
            }
            Field::ModelEntry => {
                let manifest: ModelManifest = decode(field, value)?;
                let key = manifest.key().to_string();
                let previous = self.models.data.insert(key, manifest.clone());
                Ok(previous.as_ref() != Some(&manifest))
            }
            Field::ModelAgents => {
                let updates: Vec<ModelAgentsUpdate> = decode(field, value)?;
                Ok(self.apply_model_agents(updates))
            }
        }
    }

    /// Clear a field back to its default value.
    pub fn unset_field(&mut self, field: Field) -> bool {
        let defaults = StateTree::default();
        match field {
            Field::Name => replace(&mut self.name, defaults.name),
            Field::Error => replace(&mut self.error, None),
            Field::CurrentPage => replace(&mut self.current_page, defaults.current_page),
            Field::PredictUrl => replace(&mut self.predict_url, String::new()),
            Field::PredictInputs => replace(&mut self.predict_inputs, Vec::new()),
            Field::BatchSize => replace(&mut self.batch_size, defaults.batch_size),
            Field::Device => replace(&mut self.device, defaults.device),
            Field::TraceLevel => replace(&mut self.trace_level, defaults.trace_level),
            Field::SelectedAgent => replace(&mut self.selected_agent, None),
            Field::SelectedModels => replace(&mut self.models.selected, BTreeSet::new()),
            Field::Predictions => replace(&mut self.predictions, Vec::new()),
            Field::TutorialOpen => replace(&mut self.tutorial_open, false),
            Field::Status(flag) => {
                let before = self.status;
                self.status.set(flag, false);
                self.status != before
            }
            Field::FrameworksData => replace(&mut self.frameworks.data, Vec::new()),
            Field::FrameworkAgents => {
                let mut changed = false;
                for framework in &mut self.frameworks.data {
                    changed |= !framework.agents.is_empty();
                    framework.agents.clear();
                }
                changed
            }
            Field::ModelsData | Field::ModelEntry => {
                replace(&mut self.models.data, BTreeMap::new())
            }
            Field::ModelAgents => {
                let mut changed = false;
                for model in self.models.data.values_mut() {
                    changed |= !model.agents.is_empty();
                    model.agents.clear();
                }
                changed
            }
        }
    }

    /// Attach fetched agents to their frameworks, creating a stub manifest
    /// when the framework is not in the catalog yet (missing intermediates
    /// are created, never an error).
    fn apply_framework_agents(&mut self, updates: Vec<FrameworkAgentsUpdate>) -> bool {
        let mut changed = false;
        for update in updates {
            let key = update.framework;
            match self
                .frameworks
                .data
                .iter()
                .position(|manifest| manifest.key() == key)
            {
                Some(index) => {
                    changed |= replace(&mut self.frameworks.data[index].agents, update.agents);
                }
                None => {
                    self.frameworks.data.push(FrameworkManifest {
                        name: key.name,
                        version: key.version,
                        container: None,
                        agents: update.agents,
                    });
                    changed = true;
                }
            }
        }
        changed
    }

    fn apply_model_agents(&mut self, updates: Vec<ModelAgentsUpdate>) -> bool {
        use std::collections::btree_map::Entry;

        let mut changed = false;
        for update in updates {
            match self.models.data.entry(update.model.to_string()) {
                Entry::Occupied(mut entry) => {
                    changed |= replace(&mut entry.get_mut().agents, update.agents);
                }
                Entry::Vacant(entry) => {
                    entry.insert(ModelManifest {
                        name: update.model.name,
                        version: update.model.version,
                        framework: None,
                        description: None,
                        agents: update.agents,
                    });
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Assign and report whether the value actually changed
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn decode<T: DeserializeOwned>(field: Field, value: Value) -> Result<T, SynapseError> {
    serde_json::from_value(value).map_err(|e| SynapseError::Apply {
        field: field.to_string(),
        details: e.to_string(),
    })
}

/// The selection arrives either as a list of model keys or as the
/// `{"model": true}` map the model selector widget emits.
fn decode_selection(field: Field, value: Value) -> Result<BTreeSet<String>, SynapseError> {
    match value {
        list @ Value::Array(_) => decode(field, list),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(key, chosen)| (chosen == Value::Bool(true)).then_some(key))
            .collect()),
        other => Err(SynapseError::Apply {
            field: field.to_string(),
            details: format!("expected list or map of model keys, got {}", other),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================
