//! Signal dispatcher - the single entry point that runs chains
//!
//! `dispatch(signal)` looks up the named chain, seeds a fresh execution
//! scope from the payload, and walks the steps strictly in order: operator
//! steps accumulate into a batch, action steps first commit the pending
//! batch (flag raised) and then suspend. Mutation happens only inside
//! [`Dispatcher::commit`], an explicit critical section around the state
//! mutex that is never held across an await - the single-writer discipline
//! is structural, not conventional.
//!
//! Executions of different signals interleave freely at suspension points;
//! within one execution step order is total. A failed action never aborts
//! the dispatcher: it selects the step's `error` sub-chain. Only programmer
//! errors (missing scope keys, type mismatches) abort, and they abort that
//! execution alone.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::action::ActionExecutor;
use crate::backend::Backend;
use crate::chain::{ActionStep, Step};
use crate::chains;
use crate::error::SynapseError;
use crate::event_log::{EventKind, EventLog};
use crate::op::{truthy, Patch};
use crate::scope::Scope;
use crate::signal::Signal;
use crate::state::{Field, StateTree};
use crate::view::ViewModel;

/// Owns the state tree and runs chains against it. Cheap to clone; clones
/// share the same tree, event log, and view channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<StateTree>,
    executor: ActionExecutor,
    events: EventLog,
    view_tx: watch::Sender<ViewModel>,
}

impl Dispatcher {
    /// Create a dispatcher over the given backend with a fresh state tree
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let state = StateTree::new();
        let (view_tx, _) = watch::channel(ViewModel::project(&state));

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                executor: ActionExecutor::new(backend),
                events: EventLog::new(),
                view_tx,
            }),
        }
    }

    /// Subscribe to view-model updates; one message per changed batch
    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.inner.view_tx.subscribe()
    }

    /// The current view-model snapshot
    pub fn view(&self) -> ViewModel {
        self.inner.view_tx.borrow().clone()
    }

    /// Value-copy of the state tree (tests and the CLI harness)
    pub fn state_snapshot(&self) -> StateTree {
        self.inner.state.lock().clone()
    }

    /// Handle to the shared execution trail
    pub fn events(&self) -> EventLog {
        self.inner.events.clone()
    }

    /// Run the chain for `signal` to completion on this task.
    #[instrument(skip(self, signal), fields(signal = %signal.name()))]
    pub async fn dispatch(&self, signal: Signal) -> Result<(), SynapseError> {
        let name = signal.name();
        let chain = chains::lookup(name).ok_or_else(|| SynapseError::UnknownSignal {
            name: name.to_string(),
        })?;

        let mut scope = Scope::seed(signal.payload());
        let mut batch: Vec<Patch> = Vec::new();
        let started = Instant::now();

        self.inner.events.emit(EventKind::SignalDispatched {
            signal: name.into(),
        });
        debug!(steps = chain.len(), "running chain");

        let outcome = self
            .run_steps(name, chain.steps(), &mut scope, &mut batch)
            .await
            .and_then(|()| self.commit(name, &mut batch));

        match outcome {
            Ok(()) => {
                self.inner.events.emit(EventKind::ChainCompleted {
                    signal: name.into(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(())
            }
            Err(e) => {
                // isolation: this execution dies, the dispatcher lives on
                error!(signal = name, error = %e, "chain execution failed");
                self.inner.events.emit(EventKind::ChainFailed {
                    signal: name.into(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Dispatch on a task of its own: one cooperative task per trigger.
    /// Failures are logged and recorded in the event trail, matching the
    /// fire-and-forget way presentation code emits signals.
    pub fn spawn(&self, signal: Signal) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            // dispatch already logged and recorded the failure
            let _ = dispatcher.dispatch(signal).await;
        })
    }

    fn run_steps<'a>(
        &'a self,
        signal: &'a str,
        steps: &'a [Step],
        scope: &'a mut Scope,
        batch: &'a mut Vec<Patch>,
    ) -> BoxFuture<'a, Result<(), SynapseError>> {
        async move {
            for step in steps {
                match step {
                    Step::Op(op) => batch.push(op.resolve(scope, signal)?),

                    Step::When {
                        source,
                        then,
                        otherwise,
                    } => {
                        let condition = source.resolve_or_null(scope);
                        let branch = if truthy(&condition) { then } else { otherwise };
                        self.run_steps(signal, branch.steps(), scope, batch).await?;
                    }

                    Step::Action(action) => {
                        self.run_action(signal, action, scope, batch).await?;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn run_action(
        &self,
        signal: &str,
        step: &ActionStep,
        scope: &mut Scope,
        batch: &mut Vec<Patch>,
    ) -> Result<(), SynapseError> {
        let action = step.action;

        // validate before the flag becomes visible, so a rejected request
        // never shows up as an in-flight load
        let preflight = {
            let state = self.inner.state.lock();
            self.inner.executor.preflight(action, scope, &state)
        };
        if let Err(e) = preflight {
            warn!(signal, action = action.label(), error = %e, "action rejected in preflight");
            self.inner.events.emit(EventKind::ActionFailed {
                signal: signal.into(),
                action: action.label().to_string(),
                error: e.to_string(),
            });
            scope.set_error(&e.to_app_error(action.operation()));
            return self
                .run_steps(signal, step.on_error.steps(), scope, batch)
                .await;
        }

        // raise the flag atomically with the segment's pending ops, then
        // suspend; the view sees the load begin in one update
        batch.push(Patch {
            field: Field::Status(step.flag),
            value: Some(Value::Bool(true)),
        });
        self.commit(signal, batch)?;

        self.inner.events.emit(EventKind::ActionStarted {
            signal: signal.into(),
            action: action.label().to_string(),
        });
        let started = Instant::now();
        let snapshot = self.state_snapshot();

        match self.inner.executor.execute(action, scope, &snapshot).await {
            Ok(value) => {
                self.inner.events.emit(EventKind::ActionCompleted {
                    signal: signal.into(),
                    action: action.label().to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                scope.merge(value);
                self.run_steps(signal, step.on_success.steps(), scope, batch)
                    .await
            }
            Err(e) => {
                warn!(signal, action = action.label(), error = %e, "action failed");
                self.inner.events.emit(EventKind::ActionFailed {
                    signal: signal.into(),
                    action: action.label().to_string(),
                    error: e.to_string(),
                });
                scope.set_error(&e.to_app_error(action.operation()));
                self.run_steps(signal, step.on_error.steps(), scope, batch)
                    .await
            }
        }
    }

    /// Apply a batch of resolved operators atomically and publish the new
    /// projection. The mutex is held only across the synchronous applies -
    /// never across an await - and an unchanged batch publishes nothing, so
    /// re-applying identical values is observably a no-op.
    fn commit(&self, signal: &str, batch: &mut Vec<Patch>) -> Result<(), SynapseError> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        let (changed, version, projection) = {
            let mut state = self.inner.state.lock();
            let mut changed = false;
            for patch in batch.drain(..) {
                changed |= patch.apply(&mut state)?;
            }
            if changed {
                state.bump_version();
            }
            let projection = changed.then(|| ViewModel::project(&state));
            (changed, state.version, projection)
        };

        if let Some(view) = projection {
            self.inner.view_tx.send_replace(view);
        }
        self.inner.events.emit(EventKind::BatchCommitted {
            signal: signal.into(),
            ops,
            version,
            changed,
        });
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
