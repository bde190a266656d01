//! Operators - pure, composable state-mutation primitives
//!
//! An [`Op`] names a typed field and how to obtain its new value: a literal
//! fixed at chain definition time, or a key resolved from the execution
//! scope. Resolution happens first ([`Op::resolve`] → [`Patch`]), then the
//! dispatcher applies whole patches inside one critical section, so a chain
//! with a bad scope reference fails before any of its batch is visible.

use serde::Serialize;
use serde_json::Value;

use crate::error::SynapseError;
use crate::scope::Scope;
use crate::state::{Field, StateTree};

// ============================================================================
// VALUE SOURCES
// ============================================================================

/// Where an operator's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Fixed at definition time
    Literal(Value),
    /// Resolved from the execution scope at run time
    Scope(&'static str),
}

impl Source {
    /// A literal value, serialized once at definition time
    pub fn lit(value: impl Serialize) -> Self {
        Source::Literal(serde_json::to_value(value).unwrap_or(Value::Null))
    }

    /// A scope lookup by key
    pub fn scope(key: &'static str) -> Self {
        Source::Scope(key)
    }

    /// Resolve to a concrete value. A missing scope key is a programmer
    /// error that aborts the running chain.
    pub fn resolve(&self, scope: &Scope, signal: &str) -> Result<Value, SynapseError> {
        match self {
            Source::Literal(value) => Ok(value.clone()),
            Source::Scope(key) => {
                scope
                    .get(key)
                    .cloned()
                    .ok_or_else(|| SynapseError::ScopeMissing {
                        key: (*key).to_string(),
                        signal: signal.to_string(),
                    })
            }
        }
    }

    /// Resolve leniently: a missing scope key reads as JSON null. Used for
    /// branch conditions, where absence just picks the else branch.
    pub fn resolve_or_null(&self, scope: &Scope) -> Value {
        match self {
            Source::Literal(value) => value.clone(),
            Source::Scope(key) => scope.get_or_null(key),
        }
    }
}

/// JavaScript-flavored truthiness, matching what the trigger payloads carry:
/// null, false, empty strings/containers and zero are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ============================================================================
// OPERATORS
// ============================================================================

/// One state mutation: `set` a field from a source, or `unset` it back to
/// its default.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub field: Field,
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Set(Source),
    Unset,
}

impl Op {
    pub fn set(field: Field, value: impl Serialize) -> Self {
        Op {
            field,
            kind: OpKind::Set(Source::lit(value)),
        }
    }

    pub fn set_from(field: Field, key: &'static str) -> Self {
        Op {
            field,
            kind: OpKind::Set(Source::scope(key)),
        }
    }

    pub fn unset(field: Field) -> Self {
        Op {
            field,
            kind: OpKind::Unset,
        }
    }

    /// Resolve against the scope into an applicable patch
    pub fn resolve(&self, scope: &Scope, signal: &str) -> Result<Patch, SynapseError> {
        let value = match &self.kind {
            OpKind::Set(source) => Some(source.resolve(scope, signal)?),
            OpKind::Unset => None,
        };
        Ok(Patch {
            field: self.field,
            value,
        })
    }
}

/// A fully resolved operator, ready to apply to the state tree
#[derive(Debug, Clone)]
pub struct Patch {
    pub field: Field,
    /// `Some` for set, `None` for unset
    pub value: Option<Value>,
}

impl Patch {
    /// Apply to the tree; reports whether anything changed.
    pub fn apply(self, state: &mut StateTree) -> Result<bool, SynapseError> {
        match self.value {
            Some(value) => state.set_field(self.field, value),
            None => Ok(state.unset_field(self.field)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
