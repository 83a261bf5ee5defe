// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stage machines
//!
//! A machine here is a value that answers `(stage, input) → (stage, output)`
//! without side effects. The repository does the I/O, turns each outcome
//! into an input and lets the machine decide where the write stands.
//!
//! ```rust
//! use cim_resource_store::state_machine::{StageTracker, WriteStage, WriteStep};
//!
//! let mut tracker = StageTracker::new(WriteStage::Received);
//! tracker.step(WriteStep::BodyAccepted).unwrap();
//! assert_eq!(*tracker.current(), WriteStage::Validated);
//! ```

use chrono::{DateTime, Utc};

pub mod write_path;

pub use write_path::{WriteOutput, WriteStage, WriteStep};

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Input refused by a machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The machine has stopped and takes no more input
    #[error("State {0} is terminal")]
    Terminal(String),
}

/// Pure stage machine
pub trait StateMachine: Sized + Clone {
    type Input;

    /// Side information handed back with each accepted input
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

/// One accepted stage change
#[derive(Debug, Clone, PartialEq)]
pub struct StageChange<S> {
    pub from: S,
    pub to: S,
    pub at: DateTime<Utc>,
}

/// Drives a machine and keeps the trail of stages it passed through
///
/// A rejected input leaves both the current stage and the trail as they
/// were, so the trail only ever shows a path the machine allows.
#[derive(Debug, Clone)]
pub struct StageTracker<M: StateMachine> {
    current: M,
    trail: Vec<StageChange<M>>,
}

impl<M: StateMachine> StageTracker<M> {
    pub fn new(initial: M) -> Self {
        Self {
            current: initial,
            trail: Vec::new(),
        }
    }

    /// Feed one input, stamping the change with `at`
    pub fn step_at(&mut self, input: &M::Input, at: DateTime<Utc>) -> TransitionResult<M::Output> {
        let (next, output) = self.current.transition(input)?;
        let from = std::mem::replace(&mut self.current, next.clone());
        self.trail.push(StageChange { from, to: next, at });
        Ok(output)
    }

    /// Feed one input, stamped with the current time
    pub fn step(&mut self, input: M::Input) -> TransitionResult<M::Output> {
        self.step_at(&input, Utc::now())
    }

    pub fn current(&self) -> &M {
        &self.current
    }

    pub fn trail(&self) -> &[StageChange<M>] {
        &self.trail
    }

    /// Every stage visited, starting with the initial one
    pub fn path(&self) -> Vec<M> {
        match self.trail.first() {
            None => vec![self.current.clone()],
            Some(first) => std::iter::once(first.from.clone())
                .chain(self.trail.iter().map(|change| change.to.clone()))
                .collect(),
        }
    }
}
