// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory Event Store Implementation
//!
//! Keeps every stream in a hash map behind one `tokio` read-write lock. The
//! write lock is the serialization point that makes the sequence check and
//! the append a single step.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::event_store::{check_continuation, EventStore, StoreResult, StoredEvent};
use crate::events::Event;

#[derive(Default)]
struct Inner {
    streams: HashMap<String, Vec<Event>>,
    log: Vec<StoredEvent>,
}

/// Event store held entirely in process memory
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams
    pub async fn len(&self) -> usize {
        self.inner.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        resource_id: &str,
        expected_sequence: u64,
        events: &[Event],
    ) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;

        let current = inner
            .streams
            .get(resource_id)
            .and_then(|stream| stream.last())
            .map(Event::sequence_no)
            .unwrap_or(0);

        check_continuation(resource_id, expected_sequence, current, events)?;

        let mut position = inner.log.len() as u64;
        for event in events {
            position += 1;
            inner.log.push(StoredEvent {
                position,
                event: event.clone(),
            });
        }
        inner
            .streams
            .entry(resource_id.to_string())
            .or_default()
            .extend(events.iter().cloned());

        let new_sequence = expected_sequence + events.len() as u64;
        debug!(
            resource_id = %resource_id,
            appended = events.len(),
            sequence_no = new_sequence,
            "Appended events"
        );
        Ok(new_sequence)
    }

    async fn read_events(&self, resource_id: &str) -> StoreResult<Vec<Event>> {
        self.read_events_from(resource_id, 1).await
    }

    async fn read_events_from(&self, resource_id: &str, from_sequence: u64) -> StoreResult<Vec<Event>> {
        let inner = self.inner.read().await;
        let events: Vec<Event> = inner
            .streams
            .get(resource_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.sequence_no() >= from_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        trace!(resource_id = %resource_id, count = events.len(), "Read events");
        Ok(events)
    }

    async fn current_sequence(&self, resource_id: &str) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(resource_id)
            .and_then(|stream| stream.last())
            .map(Event::sequence_no)
            .unwrap_or(0))
    }

    async fn read_all(&self, from_position: u64) -> StoreResult<Vec<StoredEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .log
            .iter()
            .filter(|stored| stored.position >= from_position)
            .cloned()
            .collect())
    }

    async fn read_by_root(&self, root_id: &str) -> StoreResult<Vec<Event>> {
        let inner = self.inner.read().await;
        Ok(inner
            .log
            .iter()
            .filter(|stored| stored.event.meta.root_id == root_id)
            .map(|stored| stored.event.clone())
            .collect())
    }
}
