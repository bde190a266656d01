//! The chain catalog
//!
//! Every named chain the console dispatches, built once into a registry.
//! Shared sub-chains (`framework_information_chain`, `model_agents_chain`,
//! ...) are defined as constructors and spliced into the route chains, the
//! same steps verbatim - composition is structural, not dynamic.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::action::Action;
use crate::chain::Chain;
use crate::error::AppError;
use crate::state::{Field, StatusFlag, APP_NAME};
use crate::types::Page;

/// chain name → chain
pub type ChainRegistry = FxHashMap<&'static str, Chain>;

static REGISTRY: Lazy<ChainRegistry> = Lazy::new(build_registry);

/// The registry of every dispatchable chain, built on first use
pub fn registry() -> &'static ChainRegistry {
    &REGISTRY
}

/// Look up a chain by signal name
pub fn lookup(name: &str) -> Option<&'static Chain> {
    REGISTRY.get(name)
}

/// Registered chain names, sorted for display
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

fn build_registry() -> ChainRegistry {
    let mut chains = ChainRegistry::default();

    chains.insert("appLoaded", app_loaded());
    chains.insert("homeRouted", home_routed());
    chains.insert("navbarClicked", navbar_clicked());
    chains.insert("modelsRouted", models_routed());
    chains.insert("frameworksRouted", frameworks_routed());
    chains.insert("agentsRouted", agents_routed());
    chains.insert("agentRouted", agent_routed());
    chains.insert("aboutRouted", about_routed());
    chains.insert("aboutPageRouted", about_routed());
    chains.insert("openTutorial", open_tutorial());
    chains.insert("closeTutorial", close_tutorial());
    chains.insert("predictURLChanged", predict_url_changed());
    chains.insert("predictURLAdded", predict_url_added());
    chains.insert("predictInputsSet", predict_inputs_set());
    chains.insert("batchSizeChanged", batch_size_changed());
    chains.insert("deviceChanged", device_changed());
    chains.insert("traceLevelChanged", trace_level_changed());
    chains.insert("agentChanged", agent_changed());
    chains.insert("modelInformationsRequest", model_informations_request());
    chains.insert("inferenceButtonClicked", inference_button_clicked());

    chains
}

// ============================================================================
// SHARED SUB-CHAINS
// ============================================================================

/// Fetch the framework catalog, flag-guarded
pub fn framework_information_chain() -> Chain {
    Chain::builder()
        .action(
            Action::FetchFrameworks,
            StatusFlag::LoadingFrameworkManifests,
            Chain::builder()
                .set_from(Field::FrameworksData, "manifests")
                .build(),
            Chain::builder().set_from(Field::Error, "error").build(),
        )
        .build()
}

/// Fetch agents for the scoped framework or every loaded one, flag-guarded.
/// Runs after `framework_information_chain`: agent fetches are parameterized
/// by framework identity, so the catalog must be loaded first.
pub fn framework_agents_chain() -> Chain {
    Chain::builder()
        .action(
            Action::FetchFrameworkAgents,
            StatusFlag::LoadingFrameworkAgents,
            Chain::builder()
                .set_from(Field::FrameworkAgents, "agents")
                .build(),
            Chain::builder().set_from(Field::Error, "error").build(),
        )
        .build()
}

/// Fetch one model manifest named by `modelId` in scope
pub fn model_manifest_chain() -> Chain {
    Chain::builder()
        .action(
            Action::FetchModelManifest,
            StatusFlag::LoadingModel,
            Chain::builder().set_from(Field::ModelEntry, "manifest").build(),
            Chain::builder().set_from(Field::Error, "error").build(),
        )
        .build()
}

/// Fetch the model catalog: one manifest when the trigger names a model,
/// the full listing otherwise
pub fn model_information_chain() -> Chain {
    Chain::builder()
        .when(
            "modelId",
            model_manifest_chain(),
            Chain::builder()
                .action(
                    Action::FetchModels,
                    StatusFlag::LoadingModelManifests,
                    Chain::builder()
                        .set_from(Field::ModelsData, "manifests")
                        .build(),
                    Chain::builder().set_from(Field::Error, "error").build(),
                )
                .build(),
        )
        .build()
}

/// Fetch agents for the scoped model, the selection, or the whole catalog
pub fn model_agents_chain() -> Chain {
    Chain::builder()
        .action(
            Action::FetchModelAgents,
            StatusFlag::LoadingModelAgents,
            Chain::builder().set_from(Field::ModelAgents, "agents").build(),
            Chain::builder().set_from(Field::Error, "error").build(),
        )
        .build()
}

// ============================================================================
// LIFECYCLE AND NAVIGATION
// ============================================================================

fn app_loaded() -> Chain {
    Chain::builder()
        .set(Field::Status(StatusFlag::Loaded), true)
        .set(Field::Status(StatusFlag::Busy), false)
        .build()
}

fn home_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::Home)
        .set(Field::Name, APP_NAME)
        .unset(Field::Error)
        .build()
}

fn navbar_clicked() -> Chain {
    Chain::builder().set_from(Field::CurrentPage, "page").build()
}

fn frameworks_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::Frameworks)
        .set(Field::Name, "Synapse Frameworks")
        .chain(&framework_information_chain())
        .chain(&framework_agents_chain())
        .build()
}

fn models_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::Models)
        .set(Field::Name, "Synapse Models")
        .chain(&model_information_chain())
        .chain(&model_agents_chain())
        .build()
}

fn agents_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::Agents)
        .set(Field::Name, "Synapse Agents")
        .chain(&framework_information_chain())
        .chain(&framework_agents_chain())
        .build()
}

fn agent_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::Agent)
        .set(Field::Name, "Synapse Agent")
        .when(
            "agentId",
            Chain::builder().set_from(Field::SelectedAgent, "agentId").build(),
            Chain::default(),
        )
        .when("modelId", model_manifest_chain(), Chain::default())
        .build()
}

fn about_routed() -> Chain {
    Chain::builder()
        .set(Field::CurrentPage, Page::About)
        .set(Field::Name, "Synapse About")
        .build()
}

fn open_tutorial() -> Chain {
    Chain::builder().set(Field::TutorialOpen, true).build()
}

fn close_tutorial() -> Chain {
    Chain::builder().set(Field::TutorialOpen, false).build()
}

// ============================================================================
// PREDICTION SETUP (pure set chains)
// ============================================================================

fn predict_url_changed() -> Chain {
    Chain::builder().set_from(Field::PredictUrl, "predictURL").build()
}

/// Upload completion: the widget's first resolved URL becomes the predict
/// URL (the payload already extracted it)
fn predict_url_added() -> Chain {
    Chain::builder().set_from(Field::PredictUrl, "predictURL").build()
}

fn predict_inputs_set() -> Chain {
    Chain::builder()
        .set_from(Field::PredictInputs, "predictInputs")
        .build()
}

fn batch_size_changed() -> Chain {
    Chain::builder().set_from(Field::BatchSize, "batchSize").build()
}

fn device_changed() -> Chain {
    Chain::builder().set_from(Field::Device, "device").build()
}

fn trace_level_changed() -> Chain {
    Chain::builder().set_from(Field::TraceLevel, "level").build()
}

fn agent_changed() -> Chain {
    Chain::builder().set_from(Field::SelectedAgent, "agentId").build()
}

// ============================================================================
// CATALOG AND INFERENCE
// ============================================================================

fn model_informations_request() -> Chain {
    model_information_chain().concat(&model_agents_chain())
}

fn inference_button_clicked() -> Chain {
    Chain::builder()
        .when(
            "selectedModels",
            Chain::builder()
                .set_from(Field::SelectedModels, "selectedModels")
                .unset(Field::Error)
                .action(
                    Action::SubmitInference,
                    StatusFlag::Predicting,
                    Chain::builder()
                        .set_from(Field::Predictions, "predictions")
                        .build(),
                    Chain::builder().set_from(Field::Error, "error").build(),
                )
                .build(),
            // the trigger is disabled with an empty selection; if it fires
            // anyway, surface the validation error instead of predicting
            Chain::builder()
                .set(Field::Error, AppError::new("Predict", "no models selected"))
                .build(),
        )
        .build()
}

// ============================================================================
// TESTS
// ============================================================================
