//! Error types with fix suggestions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Errors surfaced by the orchestration core.
///
/// Backend failures are NOT represented here: they are routed into a chain's
/// `error` sub-chain and end up in `state.error`. This enum covers the
/// failures that abort a single chain execution (programmer errors) plus the
/// edges of the CLI harness.
#[derive(Error, Debug)]
pub enum SynapseError {
    #[error("no chain registered for signal '{name}'")]
    UnknownSignal { name: String },

    #[error("scope key '{key}' missing while running '{signal}'")]
    ScopeMissing { key: String, signal: String },

    #[error("cannot apply value to {field}: {details}")]
    Apply { field: String, details: String },

    #[error("invalid backend address: {0}")]
    Address(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for SynapseError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            SynapseError::UnknownSignal { .. } => {
                Some("Check the signal name against the registered chain catalog")
            }
            SynapseError::ScopeMissing { .. } => {
                Some("The chain reads a scope key the trigger payload or a prior action never produced")
            }
            SynapseError::Apply { .. } => {
                Some("The resolved value does not match the field's type; check the action's output shape")
            }
            SynapseError::Address(_) => Some("Pass a full base URL, e.g. http://localhost:8088"),
            SynapseError::Io(_) => Some("Check file path and permissions"),
        }
    }
}

/// User-displayable error record stored in `state.error` and rendered as a
/// banner by presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AppError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({}): {}", self.name, code, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_suggestion() {
        let errors = [
            SynapseError::UnknownSignal {
                name: "bogus".into(),
            },
            SynapseError::ScopeMissing {
                key: "predictURL".into(),
                signal: "predictURLChanged".into(),
            },
            SynapseError::Apply {
                field: "batchSize".into(),
                details: "expected positive integer".into(),
            },
        ];
        for error in errors {
            assert!(error.fix_suggestion().is_some(), "{error}");
        }
    }

    #[test]
    fn app_error_display_includes_code() {
        let error = AppError::new("GetFrameworkManifests", "connection refused").with_code(502);
        assert_eq!(
            error.to_string(),
            "GetFrameworkManifests (502): connection refused"
        );
    }

    #[test]
    fn app_error_serializes_without_null_code() {
        let error = AppError::new("Predict", "no models selected");
        let value = serde_json::to_value(&error).unwrap();
        assert!(value.get("code").is_none());
    }
}
