//! Synapse - signal-chain state orchestration for an ML inference console

pub mod action;
pub mod backend;
pub mod chain;
pub mod chains;
pub mod dispatcher;
pub mod error;
pub mod event_log;
pub mod manifest;
pub mod op;
pub mod scope;
pub mod signal;
pub mod state;
pub mod types;
pub mod view;

pub use action::Action;
pub use backend::{Backend, BackendError, HttpBackend, MockBackend};
pub use chain::{Chain, ChainBuilder, Step};
pub use dispatcher::Dispatcher;
pub use error::{AppError, FixSuggestion, SynapseError};
pub use event_log::{Event, EventKind, EventLog};
pub use signal::Signal;
pub use state::{StateTree, StatusFlag};
pub use view::ViewModel;
