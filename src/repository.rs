// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Repository
//!
//! Application service for writing resources. Every write walks the
//! write-path state machine:
//!
//! ```text
//! Received ──validate body / request──> Validated
//!          ──check concurrency token──> SequenceChecked
//!          ──append to event store────> Persisted
//!          ──project──────────────────> Projected
//! ```
//!
//! # Transaction Semantics
//!
//! Each method is one transaction over one resource:
//! 1. Load events and rebuild the resource
//! 2. Record the change as a pending event
//! 3. Check the supplied token against the newly assigned sequence number
//! 4. Append, conditioned on the durable sequence number
//! 5. Project inline
//!
//! Steps 1 to 4 abort the write. A write without a token that loses the
//! append race in step 4 starts again from step 1, up to
//! [`MAX_UNCONDITIONED_ATTEMPTS`] times. A failure in step 5 is reported as a
//! warning on the result; the event stays durable.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::concurrency::{ConcurrencyToken, WriteOutcome};
use crate::context::RequestContext;
use crate::errors::{CoreError, CoreResult, ErrorKind};
use crate::events::EventType;
use crate::projection::{ProjectionEngine, ProjectionRecord};
use crate::resource::{Resource, ResourceBody};
use crate::schema::{SchemaProvider, TYPE_FIELD};
use crate::state_machine::{StageTracker, WriteStage, WriteStep};

/// How often a write without a token reloads after losing an append race
pub const MAX_UNCONDITIONED_ATTEMPTS: u32 = 5;

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub outcome: WriteOutcome,

    /// Token reflecting the new durable sequence number
    pub token: ConcurrencyToken,

    pub sequence_no: u64,

    /// Final write-path stage
    pub stage: WriteStage,

    /// Projection failures that did not unwind the write
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Fail if the resource exists
    Create,
    /// Create or replace
    Upsert,
    /// Fail unless the resource exists
    Update,
    Delete,
}

/// Writes resources through the projection engine
pub struct ResourceRepository {
    engine: Arc<ProjectionEngine>,
    schema: Arc<dyn SchemaProvider>,
}

impl ResourceRepository {
    pub fn new(engine: Arc<ProjectionEngine>, schema: Arc<dyn SchemaProvider>) -> Self {
        Self { engine, schema }
    }

    pub fn engine(&self) -> &Arc<ProjectionEngine> {
        &self.engine
    }

    /// Create a resource that must not exist yet
    pub async fn create(
        &self,
        ctx: &RequestContext,
        id: &str,
        resource_type: Option<&str>,
        body: ResourceBody,
    ) -> CoreResult<WriteResult> {
        self.write(ctx, id, WriteMode::Create, resource_type, Some(body), None)
            .await
    }

    /// Create or replace a resource, optionally conditioned on a token
    pub async fn save(
        &self,
        ctx: &RequestContext,
        id: &str,
        resource_type: Option<&str>,
        body: ResourceBody,
        token: Option<&ConcurrencyToken>,
    ) -> CoreResult<WriteResult> {
        self.write(ctx, id, WriteMode::Upsert, resource_type, Some(body), token)
            .await
    }

    /// Create or replace a resource from a raw JSON payload
    ///
    /// A payload that is not a JSON object is rejected before anything is
    /// recorded.
    pub async fn save_json(
        &self,
        ctx: &RequestContext,
        id: &str,
        payload: &[u8],
        token: Option<&ConcurrencyToken>,
    ) -> CoreResult<WriteResult> {
        match serde_json::from_slice::<ResourceBody>(payload) {
            Ok(body) => self.save(ctx, id, None, body, token).await,
            Err(e) => {
                warn!(resource_id = %id, error = %e, "Rejected unparseable payload");
                Err(CoreError::InvalidPayload(format!(
                    "body for {} is not a JSON object: {}",
                    id, e
                )))
            }
        }
    }

    /// Replace the body of an existing resource
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        body: ResourceBody,
        token: Option<&ConcurrencyToken>,
    ) -> CoreResult<WriteResult> {
        self.write(ctx, id, WriteMode::Update, None, Some(body), token)
            .await
    }

    /// Delete an existing resource
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        id: &str,
        token: Option<&ConcurrencyToken>,
    ) -> CoreResult<WriteResult> {
        self.write(ctx, id, WriteMode::Delete, None, None, token).await
    }

    /// Current read-model record; its token conditions the next write
    pub async fn get(&self, id: &str) -> CoreResult<Option<ProjectionRecord>> {
        self.engine.get_by_uri(id).await
    }

    async fn write(
        &self,
        ctx: &RequestContext,
        id: &str,
        mode: WriteMode,
        resource_type: Option<&str>,
        body: Option<ResourceBody>,
        token: Option<&ConcurrencyToken>,
    ) -> CoreResult<WriteResult> {
        ctx.ensure_active()?;
        let mut attempt = 1;

        let (mut fsm, resource, persisted) = loop {
            let mut fsm = StageTracker::new(WriteStage::Received);

            let loaded = self.engine.load_resource(id).await?;
            let mut resource = match self.stage(ctx, id, mode, resource_type, body.clone(), loaded) {
                Ok(resource) => {
                    fsm.step(WriteStep::BodyAccepted)?;
                    resource
                }
                Err(err) => {
                    fsm.step(WriteStep::BodyRejected)?;
                    warn!(resource_id = %id, error = %err, "Write rejected");
                    return Err(err);
                }
            };

            if let Some(token) = token {
                if let Err(err) = token.check(id, resource.sequence_no()) {
                    fsm.step(WriteStep::SequenceMismatch)?;
                    warn!(resource_id = %id, token = %token, error = %err, "Stale concurrency token");
                    return Err(err);
                }
            }
            fsm.step(WriteStep::SequenceMatched)?;

            match self.engine.persist_resource(ctx, &mut resource).await {
                Ok(persisted) => break (fsm, resource, persisted),
                // without a token nothing was promised about the base sequence
                Err(err)
                    if token.is_none()
                        && err.kind() == ErrorKind::ConcurrencyConflict
                        && attempt < MAX_UNCONDITIONED_ATTEMPTS =>
                {
                    debug!(resource_id = %id, attempt, error = %err, "Lost append race, reloading");
                    attempt += 1;
                }
                Err(err) => {
                    let step = match err.kind() {
                        ErrorKind::ConcurrencyConflict => Some(WriteStep::SequenceMismatch),
                        ErrorKind::Storage => Some(WriteStep::StorageFailed),
                        _ => None,
                    };
                    if let Some(step) = step {
                        fsm.step(step)?;
                    }
                    warn!(resource_id = %id, error = %err, stage = %fsm.current(), attempt, "Write failed");
                    return Err(err);
                }
            }
        };
        fsm.step(WriteStep::Stored)?;

        let output = if persisted.projection_errors.is_empty() {
            fsm.step(WriteStep::ProjectionApplied)?
        } else {
            let messages = persisted
                .projection_errors
                .iter()
                .map(ToString::to_string)
                .collect();
            fsm.step(WriteStep::ProjectionFailed(messages))?
        };

        let outcome = WriteOutcome::from_sequence(persisted.sequence_no);
        info!(
            resource_id = %id,
            resource_type = %resource.resource_type(),
            sequence_no = persisted.sequence_no,
            outcome = ?outcome,
            warnings = output.warnings.len(),
            path = ?fsm.path(),
            "Write completed"
        );

        Ok(WriteResult {
            outcome,
            token: ConcurrencyToken::new(id, persisted.sequence_no),
            sequence_no: persisted.sequence_no,
            stage: fsm.current().clone(),
            warnings: output.warnings,
        })
    }

    /// Validate the request against current state and record the change
    fn stage(
        &self,
        ctx: &RequestContext,
        id: &str,
        mode: WriteMode,
        resource_type: Option<&str>,
        body: Option<ResourceBody>,
        loaded: Option<Resource>,
    ) -> CoreResult<Resource> {
        if id.trim().is_empty() {
            return Err(CoreError::InvalidPayload("resource id is empty".to_string()));
        }

        let exists = loaded.as_ref().is_some_and(Resource::exists);
        match mode {
            WriteMode::Create if exists => return Err(CoreError::AlreadyExists(id.to_string())),
            WriteMode::Update | WriteMode::Delete if !exists => {
                return Err(CoreError::NotFound(id.to_string()))
            }
            _ => {}
        }

        let body = body.unwrap_or_default();
        let tagged = tagged_type(&body)?;

        let mut resource = match loaded {
            Some(resource) => {
                let requested = resource_type.or(tagged.as_deref());
                if let Some(requested) = requested.filter(|t| *t != resource.resource_type()) {
                    return Err(CoreError::InvalidPayload(format!(
                        "{} is a {}, not a {}",
                        id,
                        resource.resource_type(),
                        requested
                    )));
                }
                resource
            }
            None => {
                let resource_type = resource_type
                    .map(str::to_string)
                    .or(tagged)
                    .or_else(|| self.schema.resource_type_for(id))
                    .ok_or_else(|| {
                        CoreError::InvalidPayload(format!("cannot determine resource type for {}", id))
                    })?;
                Resource::new(id, resource_type)
            }
        };

        match mode {
            WriteMode::Delete => {
                resource.delete(ctx)?;
            }
            _ if resource.exists() => {
                resource.update(ctx, body)?;
            }
            _ => {
                resource.record(ctx, EventType::Create, body)?;
            }
        }
        Ok(resource)
    }
}

fn tagged_type(body: &ResourceBody) -> CoreResult<Option<String>> {
    match body.get(TYPE_FIELD) {
        None => Ok(None),
        Some(serde_json::Value::String(tag)) if !tag.trim().is_empty() => Ok(Some(tag.clone())),
        Some(other) => Err(CoreError::InvalidPayload(format!(
            "{} must be a non-empty string, got {}",
            TYPE_FIELD, other
        ))),
    }
}
