// Copyright (c) 2025 - Cowboy AI, Inc.
//! Side Effect Executor
//!
//! Interprets [`ProjectionEffect`]s returned by the pure projection and
//! performs the store I/O. [`StoreProjection`] ties the two together as the
//! built-in event handler the engine registers for `create`, `update` and
//! `delete`.
//!
//! ```text
//! Event ──decode──> Body ──project()──> Effect ──execute()──> ProjectionStore
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::decoder::DecoderRegistry;
use super::pure::{project, ProjectionEffect};
use super::store::ProjectionStore;
use super::EventHandler;
use crate::context::RequestContext;
use crate::errors::{HandlerError, HandlerResult};
use crate::event_store::StoreResult;
use crate::events::Event;

/// Name the built-in projection handler reports in errors and logs
pub const STORE_PROJECTION: &str = "projection-store";

/// Apply one effect to the store
///
/// Returns whether the store changed.
pub async fn execute(store: &dyn ProjectionStore, effect: ProjectionEffect) -> StoreResult<bool> {
    match effect {
        ProjectionEffect::Upsert(record) => store.save(record).await,
        ProjectionEffect::Remove { id, sequence_no } => {
            debug!(resource_id = %id, sequence_no, "Removing projection");
            store.delete(&id, sequence_no).await
        }
        ProjectionEffect::Ignore { id, reason } => {
            trace!(resource_id = %id, reason = %reason, "Projection effect ignored");
            Ok(false)
        }
    }
}

/// Built-in handler keeping the projection store in step with the log
pub struct StoreProjection {
    store: Arc<dyn ProjectionStore>,
    decoders: Arc<DecoderRegistry>,
}

impl StoreProjection {
    pub fn new(store: Arc<dyn ProjectionStore>, decoders: Arc<DecoderRegistry>) -> Self {
        Self { store, decoders }
    }

    fn failure(&self, message: impl std::fmt::Display) -> HandlerError {
        HandlerError::failed(STORE_PROJECTION, message.to_string())
    }
}

#[async_trait]
impl EventHandler for StoreProjection {
    async fn handle(&self, _ctx: &RequestContext, event: &Event) -> HandlerResult<()> {
        let previous = self
            .store
            .find(event.resource_id())
            .await
            .map_err(|e| self.failure(e))?;

        let body = if event.event_type.is_upsert() {
            self.decoders.decode(event).map_err(|e| self.failure(e))?
        } else {
            Default::default()
        };

        let effect = project(previous.as_ref(), event, body);
        execute(self.store.as_ref(), effect)
            .await
            .map_err(|e| self.failure(e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        STORE_PROJECTION
    }

    fn replays(&self) -> bool {
        true
    }
}
