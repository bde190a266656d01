//! Chains - named, statically composed step sequences
//!
//! A chain is the unit of "a thing that can happen": an ordered list of
//! operator applications, branch points, and async-action invocations.
//! Chains are values, composed once at definition time by splicing
//! ([`Chain::concat`]) or through the [`ChainBuilder`]; the dispatcher only
//! ever walks a finished chain.
//!
//! The builder is where the flag discipline lives: an action step always
//! names the status flag it raises, and the builder prepends the
//! corresponding clear to BOTH outcome sub-chains, so no chain author can
//! leave a loading flag stuck on a failure path.

use serde::Serialize;

use crate::action::Action;
use crate::op::{Op, Source};
use crate::state::{Field, StatusFlag};

// ============================================================================
// STEPS
// ============================================================================

/// One step of a chain
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Apply an operator
    Op(Op),
    /// Branch on the truthiness of a resolved value; exactly one sub-chain
    /// runs, inside the same execution
    When {
        source: Source,
        then: Chain,
        otherwise: Chain,
    },
    /// Invoke an async action, then run the outcome's sub-chain
    Action(ActionStep),
}

/// An async-action invocation site. The flag is raised before the action
/// suspends and cleared as the first operation of whichever sub-chain runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionStep {
    pub action: Action,
    pub flag: StatusFlag,
    pub on_success: Chain,
    pub on_error: Chain,
}

// ============================================================================
// CHAIN
// ============================================================================

/// An ordered sequence of steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Splice another chain's steps onto the end of this one, verbatim.
    /// Pure structural composition: no wrapper step is introduced, so
    /// concatenation is associative.
    pub fn concat(mut self, other: &Chain) -> Chain {
        self.steps.extend(other.steps.iter().cloned());
        self
    }

    /// Totals across nested sub-chains, for display
    pub fn summary(&self) -> ChainSummary {
        let mut summary = ChainSummary::default();
        summarize(&self.steps, &mut summary);
        summary
    }
}

/// Step totals for one chain, including nested sub-chains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainSummary {
    pub ops: usize,
    pub actions: usize,
    pub branches: usize,
}

fn summarize(steps: &[Step], summary: &mut ChainSummary) {
    for step in steps {
        match step {
            Step::Op(_) => summary.ops += 1,
            Step::When {
                then, otherwise, ..
            } => {
                summary.branches += 1;
                summarize(then.steps(), summary);
                summarize(otherwise.steps(), summary);
            }
            Step::Action(action) => {
                summary.actions += 1;
                summarize(action.on_success.steps(), summary);
                summarize(action.on_error.steps(), summary);
            }
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Fluent constructor for chains
#[derive(Debug, Default)]
pub struct ChainBuilder {
    steps: Vec<Step>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `set(field, literal)`
    pub fn set(mut self, field: Field, value: impl Serialize) -> Self {
        self.steps.push(Step::Op(Op::set(field, value)));
        self
    }

    /// `set(field, value-from-scope)`
    pub fn set_from(mut self, field: Field, key: &'static str) -> Self {
        self.steps.push(Step::Op(Op::set_from(field, key)));
        self
    }

    /// `unset(field)`
    pub fn unset(mut self, field: Field) -> Self {
        self.steps.push(Step::Op(Op::unset(field)));
        self
    }

    /// Branch on a scope key's truthiness
    pub fn when(mut self, key: &'static str, then: Chain, otherwise: Chain) -> Self {
        self.steps.push(Step::When {
            source: Source::scope(key),
            then,
            otherwise,
        });
        self
    }

    /// Invoke an async action guarded by `flag`. The clear of `flag` is
    /// prepended to both sub-chains here, making the always-cleared
    /// invariant structural rather than a convention.
    pub fn action(
        mut self,
        action: Action,
        flag: StatusFlag,
        on_success: Chain,
        on_error: Chain,
    ) -> Self {
        let clear = Chain {
            steps: vec![Step::Op(Op::set(Field::Status(flag), false))],
        };
        self.steps.push(Step::Action(ActionStep {
            action,
            flag,
            on_success: clear.clone().concat(&on_success),
            on_error: clear.concat(&on_error),
        }));
        self
    }

    /// Splice a previously defined chain's steps in place
    pub fn chain(mut self, other: &Chain) -> Self {
        self.steps.extend(other.steps().iter().cloned());
        self
    }

    pub fn build(self) -> Chain {
        Chain { steps: self.steps }
    }
}

// ============================================================================
// TESTS
// ============================================================================
