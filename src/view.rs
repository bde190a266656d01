//! Derived view model - the read-only projection presentation code sees
//!
//! A value-copy of the state tree's displayable fields, recomputed once per
//! committed operator batch and delivered over a watch channel. Holders can
//! never write back; there is no route from here to the tree.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::AppError;
use crate::manifest::{FrameworkManifest, ModelManifest, Prediction};
use crate::state::{StateTree, Status};
use crate::types::{AgentId, BatchSize, Device, Page, TraceLevel};

/// Snapshot of everything the pages render
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    /// State version this snapshot was projected from
    pub version: u64,
    pub name: String,
    pub error: Option<AppError>,
    pub current_page: Page,
    pub status: Status,
    #[serde(rename = "predictURL")]
    pub predict_url: String,
    pub predict_inputs: Vec<String>,
    pub batch_size: BatchSize,
    pub device: Device,
    pub trace_level: TraceLevel,
    pub frameworks: Vec<FrameworkManifest>,
    pub models: Vec<ModelManifest>,
    pub selected_models: BTreeSet<String>,
    pub selected_agent: Option<AgentId>,
    pub predictions: Vec<Prediction>,
    pub tutorial_open: bool,
}

impl ViewModel {
    /// Project a state tree into a display snapshot
    pub fn project(state: &StateTree) -> Self {
        Self {
            version: state.version,
            name: state.name.clone(),
            error: state.error.clone(),
            current_page: state.current_page,
            status: state.status,
            predict_url: state.predict_url.clone(),
            predict_inputs: state.predict_inputs.clone(),
            batch_size: state.batch_size,
            device: state.device,
            trace_level: state.trace_level,
            frameworks: state.frameworks.data.clone(),
            models: state.models.data.values().cloned().collect(),
            selected_models: state.models.selected.clone(),
            selected_agent: state.selected_agent.clone(),
            predictions: state.predictions.clone(),
            tutorial_open: state.tutorial_open,
        }
    }

    /// Anything in flight: drives the global spinner
    pub fn is_busy(&self) -> bool {
        self.status.is_busy || self.status.any_loading()
    }

    /// Whether the predict trigger should be enabled
    pub fn can_predict(&self) -> bool {
        !self.selected_models.is_empty() && !self.status.is_predicting
    }
}
