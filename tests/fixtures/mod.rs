// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-resource-store
//!
//! Builders for engines, repositories, contexts and bodies shared by the
//! integration tests. Ids, identities and schema entries are fixed so every
//! test sees the same layout.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use cim_resource_store::event_store::{StoreResult, StoredEvent};
use cim_resource_store::{
    CoreConfig, Event, EventStore, Identity, InMemoryEventStore, InMemoryProjectionStore,
    ProjectionEngine, RequestContext, ResourceBody, ResourceRepository, StaticSchemaProvider,
    StoreError,
};

pub const BLOG_1: &str = "/blogs/1";
pub const BLOG_2: &str = "/blogs/2";
pub const BLOG_3: &str = "/blogs/3";

pub const USER_ID: &str = "alice";
pub const ACCOUNT_ID: &str = "acme";

/// Object body from a JSON literal
pub fn body(value: Value) -> ResourceBody {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture body must be an object, got {}", other),
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new(Identity::user(USER_ID).with_account(ACCOUNT_ID))
}

pub fn config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.schema.insert("/blogs".to_string(), "Blog".to_string());
    config.schema.insert("/authors".to_string(), "Author".to_string());
    config
}

pub fn schema() -> Arc<StaticSchemaProvider> {
    Arc::new(StaticSchemaProvider::from_config(&config()))
}

/// Engine over fresh in-memory stores
pub fn engine() -> Arc<ProjectionEngine> {
    Arc::new(ProjectionEngine::in_memory(&config()))
}

/// Engine over the given event store and a fresh projection store
pub fn engine_with_events(events: Arc<dyn EventStore>) -> Arc<ProjectionEngine> {
    Arc::new(ProjectionEngine::new(
        events,
        Arc::new(InMemoryProjectionStore::new()),
        &config(),
    ))
}

pub fn repository() -> ResourceRepository {
    ResourceRepository::new(engine(), schema())
}

pub fn repository_on(engine: Arc<ProjectionEngine>) -> ResourceRepository {
    ResourceRepository::new(engine, schema())
}

/// In-memory event store that refuses appends for one resource id
pub struct RejectingEventStore {
    inner: InMemoryEventStore,
    rejected_id: String,
}

impl RejectingEventStore {
    pub fn new(rejected_id: impl Into<String>) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            rejected_id: rejected_id.into(),
        }
    }
}

#[async_trait]
impl EventStore for RejectingEventStore {
    async fn append(
        &self,
        resource_id: &str,
        expected_sequence: u64,
        events: &[Event],
    ) -> StoreResult<u64> {
        if resource_id == self.rejected_id {
            return Err(StoreError::Unavailable(format!(
                "append refused for {}",
                resource_id
            )));
        }
        self.inner.append(resource_id, expected_sequence, events).await
    }

    async fn read_events(&self, resource_id: &str) -> StoreResult<Vec<Event>> {
        self.inner.read_events(resource_id).await
    }

    async fn read_events_from(&self, resource_id: &str, from_sequence: u64) -> StoreResult<Vec<Event>> {
        self.inner.read_events_from(resource_id, from_sequence).await
    }

    async fn current_sequence(&self, resource_id: &str) -> StoreResult<u64> {
        self.inner.current_sequence(resource_id).await
    }

    async fn read_all(&self, from_position: u64) -> StoreResult<Vec<StoredEvent>> {
        self.inner.read_all(from_position).await
    }

    async fn read_by_root(&self, root_id: &str) -> StoreResult<Vec<Event>> {
        self.inner.read_by_root(root_id).await
    }
}

/// In-memory event store whose reads take a few milliseconds
///
/// Widens the window between loading a resource and appending to it, so
/// concurrent writers reliably read the same sequence number.
pub struct SlowReadEventStore {
    inner: InMemoryEventStore,
    delay: Duration,
}

impl SlowReadEventStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl EventStore for SlowReadEventStore {
    async fn append(
        &self,
        resource_id: &str,
        expected_sequence: u64,
        events: &[Event],
    ) -> StoreResult<u64> {
        self.inner.append(resource_id, expected_sequence, events).await
    }

    async fn read_events(&self, resource_id: &str) -> StoreResult<Vec<Event>> {
        let events = self.inner.read_events(resource_id).await;
        tokio::time::sleep(self.delay).await;
        events
    }

    async fn read_events_from(&self, resource_id: &str, from_sequence: u64) -> StoreResult<Vec<Event>> {
        self.inner.read_events_from(resource_id, from_sequence).await
    }

    async fn current_sequence(&self, resource_id: &str) -> StoreResult<u64> {
        self.inner.current_sequence(resource_id).await
    }

    async fn read_all(&self, from_position: u64) -> StoreResult<Vec<StoredEvent>> {
        self.inner.read_all(from_position).await
    }

    async fn read_by_root(&self, root_id: &str) -> StoreResult<Vec<Event>> {
        self.inner.read_by_root(root_id).await
    }
}
