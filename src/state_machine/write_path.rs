// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write Path State Machine
//!
//! Every resource change walks this machine once. The repository performs
//! each step's I/O and feeds the result back in as a [`WriteStep`].
//!
//! # States
//!
//! ```text
//! Received ──BodyAccepted──> Validated ──SequenceMatched──> SequenceChecked
//!    │                          │                               │    │
//!    BodyRejected               SequenceMismatch   StorageFailed│    │Stored
//!    ▼                          ▼                               ▼    ▼
//! Rejected(Client)     Rejected(ConcurrencyConflict)  Rejected(Storage) Persisted
//!                                                                     │
//!                                          ProjectionApplied / ProjectionFailed
//!                                                                     ▼
//!                                                                 Projected
//! ```
//!
//! A projection failure still reaches `Projected`: the event is durable, so
//! the failure is carried as a warning instead of unwinding the write.

use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};
use crate::errors::ErrorKind;

/// Stage of a single resource write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStage {
    Received,
    Validated,
    SequenceChecked,
    Persisted,
    Projected,
    /// Aborted before anything became durable
    Rejected(ErrorKind),
}

/// Result of one step of the write path (FSM input)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStep {
    /// Body parsed against the expected shape
    BodyAccepted,
    BodyRejected,

    /// Supplied concurrency token matches, or none was supplied
    SequenceMatched,
    /// Token did not match, or the store saw a newer sequence at append time
    SequenceMismatch,

    /// Event store accepted the events
    Stored,
    StorageFailed,

    ProjectionApplied,
    /// Projection handlers failed; messages become warnings
    ProjectionFailed(Vec<String>),
}

/// Transition output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutput {
    pub warnings: Vec<String>,

    /// Whether the caller may retry the write unchanged
    pub retryable: bool,
}

impl WriteOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            retryable: false,
        }
    }

    pub fn retryable() -> Self {
        Self {
            warnings: Vec::new(),
            retryable: true,
        }
    }
}

impl WriteStage {
    /// Whether the write reached durable storage
    pub fn is_durable(&self) -> bool {
        matches!(self, WriteStage::Persisted | WriteStage::Projected)
    }
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStage::Rejected(kind) => write!(f, "Rejected({:?})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

impl StateMachine for WriteStage {
    type Input = WriteStep;
    type Output = WriteOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use WriteStage::*;
        use WriteStep::*;

        match (self, input) {
            (Received, BodyAccepted) => Ok((Validated, WriteOutput::ok())),
            (Received, BodyRejected) => Ok((Rejected(ErrorKind::Client), WriteOutput::ok())),

            (Validated, SequenceMatched) => Ok((SequenceChecked, WriteOutput::ok())),
            (Validated, SequenceMismatch) | (SequenceChecked, SequenceMismatch) => Ok((
                Rejected(ErrorKind::ConcurrencyConflict),
                WriteOutput::ok(),
            )),

            (SequenceChecked, Stored) => Ok((Persisted, WriteOutput::ok())),
            (SequenceChecked, StorageFailed) => {
                Ok((Rejected(ErrorKind::Storage), WriteOutput::retryable()))
            }

            (Persisted, ProjectionApplied) => Ok((Projected, WriteOutput::ok())),
            (Persisted, ProjectionFailed(messages)) => {
                Ok((Projected, WriteOutput::with_warnings(messages.clone())))
            }

            (Projected, _) | (Rejected(_), _) => Err(TransitionError::Terminal(self.to_string())),

            (from, step) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: format!("{:?}", step),
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, WriteStage::Projected | WriteStage::Rejected(_))
    }
}
