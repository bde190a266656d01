//! Event trail for chain execution
//!
//! Append-only record of everything the dispatcher does: which signals
//! arrived, which batches committed, how each async action went. Tests lean
//! on it to assert flag transitions; the CLI prints it under `-v`.
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: chain-level and action-level variants
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the dispatch log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All dispatch event types.
///
/// Uses Arc<str> for signal names to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // CHAIN LEVEL
    // ═══════════════════════════════════════════
    SignalDispatched {
        signal: Arc<str>,
    },
    ChainCompleted {
        signal: Arc<str>,
        duration_ms: u64,
    },
    /// A programmer error aborted this execution (unrelated chains continue)
    ChainFailed {
        signal: Arc<str>,
        error: String,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    /// A synchronous operator batch was applied atomically
    BatchCommitted {
        signal: Arc<str>,
        ops: usize,
        /// State version after the commit; unchanged batches keep the
        /// previous version
        version: u64,
        changed: bool,
    },
    ActionStarted {
        signal: Arc<str>,
        action: String,
    },
    ActionCompleted {
        signal: Arc<str>,
        action: String,
        duration_ms: u64,
    },
    ActionFailed {
        signal: Arc<str>,
        action: String,
        error: String,
    },
}

impl EventKind {
    /// The signal whose execution produced this event
    pub fn signal(&self) -> &str {
        match self {
            Self::SignalDispatched { signal }
            | Self::ChainCompleted { signal, .. }
            | Self::ChainFailed { signal, .. }
            | Self::BatchCommitted { signal, .. }
            | Self::ActionStarted { signal, .. }
            | Self::ActionCompleted { signal, .. }
            | Self::ActionFailed { signal, .. } => signal,
        }
    }

    /// Check if this is an action-level event
    pub fn is_action_event(&self) -> bool {
        matches!(
            self,
            Self::ActionStarted { .. } | Self::ActionCompleted { .. } | Self::ActionFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Filter events by signal name
    pub fn filter_signal(&self, signal: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.signal() == signal)
            .collect()
    }

    /// Action-level events only
    pub fn action_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_action_event())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}
