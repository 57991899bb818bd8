mod iteration;
mod task;

pub use iteration::IterationStatus;
pub use task::TaskStatus;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProoflineError, Result};
use crate::model::EntityKind;

/// A status enumeration with a fixed graph of legal, non-forced edges.
pub trait Lifecycle: Copy + Eq + fmt::Display + 'static {
    /// The entity whose status this is, used in error reporting.
    const ENTITY: EntityKind;

    /// Statuses reachable from `self` without `force`.
    fn successors(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }
}

/// A validated status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    /// The edge was not in the lifecycle graph and was allowed only
    /// because the caller forced it.
    pub forced: bool,
}

/// Checks status changes against a [`Lifecycle`] graph.
pub struct StateMachine;

impl StateMachine {
    /// Validate `from -> to`.
    ///
    /// - A legal edge always succeeds, forced or not.
    /// - Any other edge succeeds only with `force`, and the returned
    ///   transition is marked `forced`.
    pub fn transition<S: Lifecycle>(from: S, to: S, force: bool) -> Result<Transition<S>> {
        if from.can_transition_to(to) {
            return Ok(Transition {
                from,
                to,
                forced: false,
            });
        }
        if force {
            return Ok(Transition {
                from,
                to,
                forced: true,
            });
        }
        Err(ProoflineError::InvalidTransition {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
