// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! This module defines the interface the projection engine consumes to make
//! events durable, and an in-memory implementation of it.
//!
//! # Architecture
//!
//! ```text
//! Resource → pending Events → EventStore::append → durable log
//!                                                     ↓
//!                                              ProjectionEngine::dispatch
//! ```
//!
//! # Event Store Requirements
//!
//! 1. **Append-Only**: Events are never updated or deleted
//! 2. **Gapless**: Per resource id, sequence numbers run 1, 2, 3, ...
//! 3. **Unique**: `(resource_id, sequence_no)` is unique; this is the single
//!    serialization point between concurrent writers of one resource
//! 4. **Atomic per resource**: one append call is stored entirely or not at all
//! 5. **Replay**: Every event can be read back in insertion order

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Event;

pub mod memory;

pub use memory::InMemoryEventStore;

/// Errors raised by an event store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another writer already used the next sequence number
    #[error("Sequence conflict on {resource_id}: expected sequence {expected}, found {actual}")]
    SequenceConflict {
        resource_id: String,
        expected: u64,
        actual: u64,
    },

    /// Events handed to the store do not continue the stream
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// Stored stream violates its invariants
    #[error("Corrupt event stream: {0}")]
    Corrupt(String),

    /// Backend could not be reached or rejected the operation
    #[error("Event store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for event store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Event together with its position in the global log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Insertion position across all resources, starting at 1
    pub position: u64,
    pub event: Event,
}

/// Durable, append-only event persistence
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a resource's stream
    ///
    /// `expected_sequence` is the durable sequence number the caller built
    /// on. The events must carry `expected_sequence + 1, + 2, ...`.
    ///
    /// # Errors
    ///
    /// - `SequenceConflict` if the stream has moved past `expected_sequence`
    /// - `InvalidAppend` if the events do not continue the stream
    /// - `Unavailable` if the backend fails
    ///
    /// # Returns
    ///
    /// The new durable sequence number
    async fn append(
        &self,
        resource_id: &str,
        expected_sequence: u64,
        events: &[Event],
    ) -> StoreResult<u64>;

    /// All events of a resource in sequence order
    async fn read_events(&self, resource_id: &str) -> StoreResult<Vec<Event>>;

    /// Events of a resource with `sequence_no >= from_sequence`
    async fn read_events_from(&self, resource_id: &str, from_sequence: u64) -> StoreResult<Vec<Event>>;

    /// Durable sequence number of a resource, 0 when it has no events
    async fn current_sequence(&self, resource_id: &str) -> StoreResult<u64>;

    /// Every event with `position >= from_position`, in insertion order
    async fn read_all(&self, from_position: u64) -> StoreResult<Vec<StoredEvent>>;

    /// Events of every resource under a root aggregate, in insertion order
    async fn read_by_root(&self, root_id: &str) -> StoreResult<Vec<Event>>;
}

/// Validate that `events` continue a stream currently at `current`
pub(crate) fn check_continuation(
    resource_id: &str,
    expected_sequence: u64,
    current: u64,
    events: &[Event],
) -> StoreResult<()> {
    if current != expected_sequence {
        return Err(StoreError::SequenceConflict {
            resource_id: resource_id.to_string(),
            expected: expected_sequence,
            actual: current,
        });
    }

    for (offset, event) in events.iter().enumerate() {
        if event.resource_id() != resource_id {
            return Err(StoreError::InvalidAppend(format!(
                "event {} belongs to {}, not {}",
                event.id,
                event.resource_id(),
                resource_id
            )));
        }
        let wanted = expected_sequence + offset as u64 + 1;
        if event.sequence_no() != wanted {
            return Err(StoreError::InvalidAppend(format!(
                "event {} for {} has sequence {}, expected {}",
                event.id,
                resource_id,
                event.sequence_no(),
                wanted
            )));
        }
    }
    Ok(())
}
