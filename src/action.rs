//! Async actions - the side-effecting steps of a chain
//!
//! An [`Action`] names what to fetch or submit; the [`ActionExecutor`] turns
//! it into backend calls. Actions read the execution scope and a value-copy
//! of the state tree, and resolve to a JSON object that is merged back into
//! the scope for the steps that follow. They never mutate state - the
//! `&StateTree` signature enforces that at compile time.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::backend::{Backend, BackendError};
use crate::scope::Scope;
use crate::state::{FrameworkAgentsUpdate, ModelAgentsUpdate, StateTree};
use crate::manifest::{InferInput, InferRequest};
use crate::types::ManifestKey;

// ============================================================================
// ACTION CATALOG
// ============================================================================

/// Every async step a chain may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Load the framework catalog
    FetchFrameworks,
    /// Load agents for the scoped framework, or for every loaded framework
    FetchFrameworkAgents,
    /// Load the model catalog (scoped to a framework when one is given)
    FetchModels,
    /// Load one model manifest (requires `modelId` in scope)
    FetchModelManifest,
    /// Load agents for the scoped model, the selection, or every loaded model
    FetchModelAgents,
    /// Submit the prediction request
    SubmitInference,
}

impl Action {
    /// Short name used in events and tracing spans
    pub fn label(&self) -> &'static str {
        match self {
            Action::FetchFrameworks => "fetch_frameworks",
            Action::FetchFrameworkAgents => "fetch_framework_agents",
            Action::FetchModels => "fetch_models",
            Action::FetchModelManifest => "fetch_model_manifest",
            Action::FetchModelAgents => "fetch_model_agents",
            Action::SubmitInference => "submit_inference",
        }
    }

    /// Operation name the backend uses for this call, surfaced in error
    /// banners.
    pub fn operation(&self) -> &'static str {
        match self {
            Action::FetchFrameworks => "GetFrameworkManifests",
            Action::FetchFrameworkAgents => "GetFrameworkAgents",
            Action::FetchModels => "GetModelManifests",
            Action::FetchModelManifest => "GetModelManifest",
            Action::FetchModelAgents => "GetModelAgents",
            Action::SubmitInference => "Predict",
        }
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Executes actions against the configured backend
#[derive(Clone)]
pub struct ActionExecutor {
    backend: Arc<dyn Backend>,
}

impl ActionExecutor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Validate an action before its loading flag is raised. A failed
    /// preflight routes straight to the `error` sub-chain without the flag
    /// ever becoming visible, which keeps the predicting invariant intact
    /// (the flag is only true while a valid request is in flight).
    pub fn preflight(
        &self,
        action: Action,
        scope: &Scope,
        state: &StateTree,
    ) -> Result<(), BackendError> {
        match action {
            Action::SubmitInference => {
                let selection = scoped_selection(scope)
                    .unwrap_or_else(|| state.models.selected.iter().cloned().collect());
                if selection.is_empty() {
                    return Err(BackendError::Validation("no models selected".into()));
                }
                if infer_input(scope, state).is_empty() {
                    return Err(BackendError::Validation(
                        "nothing to classify: set a URL or upload inputs".into(),
                    ));
                }
                Ok(())
            }
            Action::FetchModelManifest => match scope.get("modelId") {
                Some(_) => Ok(()),
                None => Err(BackendError::Validation(
                    "no model named for manifest fetch".into(),
                )),
            },
            _ => Ok(()),
        }
    }

    /// Run the action to completion. The resolved object is merged into the
    /// execution scope by the dispatcher.
    #[instrument(skip(self, scope, state), fields(action = %action.label(), backend = %self.backend.name()))]
    pub async fn execute(
        &self,
        action: Action,
        scope: &Scope,
        state: &StateTree,
    ) -> Result<Value, BackendError> {
        debug!("executing action");
        match action {
            Action::FetchFrameworks => {
                let manifests = self.backend.frameworks().await?;
                Ok(json!({ "manifests": manifests }))
            }

            Action::FetchFrameworkAgents => {
                let targets = match scoped_key(scope, "frameworkId")? {
                    Some(key) => vec![key],
                    None => state
                        .frameworks
                        .data
                        .iter()
                        .map(|manifest| manifest.key())
                        .collect(),
                };

                let mut updates = Vec::with_capacity(targets.len());
                for framework in targets {
                    let agents = self.backend.framework_agents(&framework).await?;
                    updates.push(FrameworkAgentsUpdate { framework, agents });
                }
                Ok(json!({ "agents": updates }))
            }

            Action::FetchModels => {
                let manifests = match scoped_key(scope, "frameworkId")? {
                    Some(framework) => self.backend.framework_models(&framework).await?,
                    None => self.backend.models().await?,
                };
                Ok(json!({ "manifests": manifests }))
            }

            Action::FetchModelManifest => {
                let model = scoped_key(scope, "modelId")?.ok_or_else(|| {
                    BackendError::Validation("no model named for manifest fetch".into())
                })?;
                let manifest = self.backend.model_manifest(&model).await?;
                Ok(json!({ "manifest": manifest }))
            }

            Action::FetchModelAgents => {
                let targets = match scoped_key(scope, "modelId")? {
                    Some(key) => vec![key],
                    None if !state.models.selected.is_empty() => {
                        parse_keys(state.models.selected.iter())?
                    }
                    None => parse_keys(state.models.data.keys())?,
                };

                let mut updates = Vec::with_capacity(targets.len());
                for model in targets {
                    let agents = self.backend.model_agents(&model).await?;
                    updates.push(ModelAgentsUpdate { model, agents });
                }
                Ok(json!({ "agents": updates }))
            }

            Action::SubmitInference => {
                let selection = scoped_selection(scope)
                    .unwrap_or_else(|| state.models.selected.iter().cloned().collect());
                let models = parse_keys(selection.iter())?;
                if models.is_empty() {
                    return Err(BackendError::Validation("no models selected".into()));
                }

                let input = infer_input(scope, state);
                if input.is_empty() {
                    return Err(BackendError::Validation(
                        "nothing to classify: set a URL or upload inputs".into(),
                    ));
                }

                let request = InferRequest {
                    models,
                    input,
                    batch_size: state.batch_size,
                    device: state.device,
                    trace_level: state.trace_level,
                };
                let response = self.backend.predict(request).await?;
                Ok(json!({ "predictions": response.predictions }))
            }
        }
    }
}

// ============================================================================
// SCOPE HELPERS
// ============================================================================

/// Read an optional `name[:version]` key from the scope
fn scoped_key(scope: &Scope, key: &str) -> Result<Option<ManifestKey>, BackendError> {
    match scope.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<ManifestKey>()
            .map(Some)
            .map_err(|e| BackendError::Validation(e.to_string())),
        Some(other) => serde_json::from_value::<ManifestKey>(other.clone())
            .map(Some)
            .map_err(|e| BackendError::Validation(format!("invalid {}: {}", key, e))),
    }
}

/// Read the selection the trigger payload carried, if any. Handles both the
/// `{"model": true}` map the selector widget emits and a plain list.
fn scoped_selection(scope: &Scope) -> Option<Vec<String>> {
    match scope.get("selectedModels")? {
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(key, chosen)| (chosen == &Value::Bool(true)).then(|| key.clone()))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

fn parse_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
) -> Result<Vec<ManifestKey>, BackendError> {
    keys.map(|key| {
        key.parse::<ManifestKey>()
            .map_err(|e| BackendError::Validation(format!("invalid model key '{}': {}", key, e)))
    })
    .collect()
}

/// Prefer the URL (scope override first, then state); fall back to the
/// uploaded input descriptors.
fn infer_input(scope: &Scope, state: &StateTree) -> InferInput {
    if let Some(Value::String(url)) = scope.get("predictURL") {
        if !url.is_empty() {
            return InferInput::Url(url.clone());
        }
    }
    if !state.predict_url.is_empty() {
        return InferInput::Url(state.predict_url.clone());
    }
    InferInput::Inputs(state.predict_inputs.clone())
}

// ============================================================================
// TESTS
// ============================================================================
