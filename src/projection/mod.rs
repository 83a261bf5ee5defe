// Copyright (c) 2025 - Cowboy AI, Inc.
//! Projection Engine
//!
//! The single durable-write path for events and the read-model
//! synchronization path.
//!
//! # Architecture
//!
//! ```text
//! Resource.pending ──append──> EventStore           (per-resource atomic)
//!                                   │
//!                                   ▼ dispatch, inline
//!               (event_type, resource_type) handlers
//!             + (event_type, "") global handlers ──> StoreProjection ──> ProjectionStore
//!                                                                          │
//!                  get_by_uri / get_by_key / get_list / get_by_properties ◄┘
//! ```
//!
//! Projection runs inline after a successful append, so a read issued after
//! `persist` returns sees the write. A failing projection handler is logged
//! and reported; it never unwinds the append.

pub mod decoder;
pub mod executor;
pub mod pure;
pub mod store;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::CoreConfig;
use crate::context::RequestContext;
use crate::dispatcher::join_failure;
use crate::errors::{CoreError, CoreResult, HandlerError, HandlerResult};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::events::{Event, EventType};
use crate::query::{ListQuery, Page};
use crate::resource::{Resource, ResourceBody};
use crate::subjects::SubscriptionKey;

pub use decoder::{DecoderRegistry, JsonDecoder, PayloadDecoder};
pub use executor::{StoreProjection, STORE_PROJECTION};
pub use pure::{fold_projection, project, ProjectionEffect};
pub use store::{InMemoryProjectionStore, ProjectionRecord, ProjectionStore};

/// Handler reacting to persisted events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, event: &Event) -> HandlerResult<()>;

    /// Name used in logs and error reports
    fn name(&self) -> &str {
        "event-handler"
    }

    /// Whether [`ProjectionEngine::replay`] re-runs this handler
    ///
    /// Only handlers that derive read state from events should opt in.
    /// Side effects such as notifications stay at the default.
    fn replays(&self) -> bool {
        false
    }
}

/// Closure-based event handler
pub struct FnEventHandler<F> {
    name: String,
    replays: bool,
    handler: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(RequestContext, Event) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<()>> + Send,
{
    async fn handle(&self, ctx: &RequestContext, event: &Event) -> HandlerResult<()> {
        (self.handler)(ctx.clone(), event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn replays(&self) -> bool {
        self.replays
    }
}

/// Wrap a closure as a shareable event handler
///
/// The handler only sees live events; replay skips it.
pub fn event_handler_fn<F, Fut>(name: impl Into<String>, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(RequestContext, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    Arc::new(FnEventHandler {
        name: name.into(),
        replays: false,
        handler,
    })
}

/// Wrap a closure that maintains read state as a shareable event handler
///
/// Unlike [`event_handler_fn`], the handler also runs during replay.
pub fn projection_handler_fn<F, Fut>(name: impl Into<String>, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(RequestContext, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    Arc::new(FnEventHandler {
        name: name.into(),
        replays: true,
        handler,
    })
}

/// A resource whose events could not be made durable
#[derive(Debug)]
pub struct PersistFailure {
    pub resource_id: String,
    pub error: CoreError,
}

/// A resource whose events were appended
#[derive(Debug, Clone, PartialEq)]
pub struct Persisted {
    pub resource_id: String,

    /// Durable sequence number after the append
    pub sequence_no: u64,

    /// Event handler failures; the append stands regardless
    pub projection_errors: Vec<HandlerError>,
}

/// Per-resource results of one persist call
#[derive(Debug, Default)]
pub struct PersistReport {
    pub persisted: Vec<Persisted>,
    pub failures: Vec<PersistFailure>,
}

impl PersistReport {
    pub fn projection_errors(&self) -> impl Iterator<Item = &HandlerError> {
        self.persisted.iter().flat_map(|p| p.projection_errors.iter())
    }
}

/// Outcome of a projection rebuild
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Records dropped before the rebuild
    pub cleared: usize,

    /// Events re-dispatched
    pub replayed: usize,

    pub errors: Vec<HandlerError>,
}

type HandlerList = Vec<Arc<dyn EventHandler>>;

/// Event store, event dispatch and read-model queries
pub struct ProjectionEngine {
    events: Arc<dyn EventStore>,
    projections: Arc<dyn ProjectionStore>,
    decoders: Arc<DecoderRegistry>,
    subscribers: RwLock<HashMap<SubscriptionKey, HandlerList>>,
    default_page_size: u32,
    max_page_size: u32,
}

impl ProjectionEngine {
    /// Build an engine and register the built-in projection handler
    pub fn new(
        events: Arc<dyn EventStore>,
        projections: Arc<dyn ProjectionStore>,
        config: &CoreConfig,
    ) -> Self {
        let decoders = Arc::new(DecoderRegistry::new());
        let engine = Self {
            events,
            projections: Arc::clone(&projections),
            decoders: Arc::clone(&decoders),
            subscribers: RwLock::new(HashMap::new()),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        };

        let builtin: Arc<dyn EventHandler> = Arc::new(StoreProjection::new(projections, decoders));
        for event_type in [EventType::Create, EventType::Update, EventType::Delete] {
            engine.add_subscriber(event_type.as_str(), "", Arc::clone(&builtin));
        }
        engine
    }

    /// Engine backed by in-memory stores
    pub fn in_memory(config: &CoreConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryProjectionStore::new()),
            config,
        )
    }

    /// Append a handler for `(event_type, resource_type)`
    ///
    /// An empty resource type registers a global handler for the event type.
    pub fn add_subscriber(
        &self,
        event_type: impl Into<String>,
        resource_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        let key = SubscriptionKey::new(event_type, resource_type);
        debug!(key = %key, handler = handler.name(), "Registering event handler");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(handler);
    }

    /// Total number of registered event handlers, built-in ones included
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Register a payload decoder for a resource type
    pub fn register_decoder(&self, resource_type: impl Into<String>, decoder: Arc<dyn PayloadDecoder>) {
        self.decoders.register(resource_type, decoder);
    }

    /// Decode an event payload with the decoder for its resource type
    pub fn decode(&self, event: &Event) -> CoreResult<ResourceBody> {
        self.decoders.decode(event)
    }

    fn resolve(&self, event: &Event) -> HandlerList {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let exact = SubscriptionKey::new(event.event_type.as_str(), event.resource_type());
        let global = SubscriptionKey::any_resource(event.event_type.as_str());

        let mut handlers: HandlerList = subscribers.get(&exact).cloned().unwrap_or_default();
        if exact != global {
            if let Some(found) = subscribers.get(&global) {
                handlers.extend(found.iter().cloned());
            }
        }
        handlers
    }

    /// Run every handler subscribed to the event concurrently
    ///
    /// Returns one error per failed, panicked or cancelled handler.
    pub async fn dispatch(&self, ctx: &RequestContext, event: &Event) -> Vec<HandlerError> {
        let handlers = self.resolve(event);
        self.run_handlers(ctx, event, handlers).await
    }

    async fn run_handlers(&self, ctx: &RequestContext, event: &Event, handlers: HandlerList) -> Vec<HandlerError> {
        if handlers.is_empty() {
            return Vec::new();
        }

        let event = Arc::new(event.clone());
        let mut tasks = FuturesUnordered::new();

        for handler in handlers {
            let name = handler.name().to_string();
            let task_ctx = ctx.clone();
            let task_event = Arc::clone(&event);
            let task_name = name.clone();

            let join = tokio::spawn(async move {
                tokio::select! {
                    result = handler.handle(&task_ctx, &task_event) => result,
                    _ = task_ctx.cancelled() => Err(HandlerError::Cancelled { handler: task_name }),
                }
            });
            tasks.push(async move { (name, join.await) });
        }

        let mut errors = Vec::new();
        while let Some((name, joined)) = tasks.next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => join_failure(name, join_err),
            };
            warn!(
                resource_id = %event.resource_id(),
                event_type = %event.event_type,
                sequence_no = event.sequence_no(),
                handler = err.handler(),
                error = %err,
                "Event handler failed"
            );
            errors.push(err);
        }
        errors
    }

    /// Append one resource's pending events and project them
    ///
    /// The append is conditioned on the resource's durable sequence number,
    /// so a concurrent writer that got there first yields
    /// [`CoreError::PreconditionFailed`] and nothing is written.
    pub async fn persist_resource(&self, ctx: &RequestContext, resource: &mut Resource) -> CoreResult<Persisted> {
        ctx.ensure_active()?;

        let pending = resource.pending_events().to_vec();
        if pending.is_empty() {
            return Ok(Persisted {
                resource_id: resource.id().to_string(),
                sequence_no: resource.persisted_sequence_no(),
                projection_errors: Vec::new(),
            });
        }

        let sequence_no = self
            .events
            .append(resource.id(), resource.persisted_sequence_no(), &pending)
            .await?;
        resource.mark_persisted();

        let mut projection_errors = Vec::new();
        for event in &pending {
            projection_errors.extend(self.dispatch(ctx, event).await);
        }

        info!(
            resource_id = %resource.id(),
            resource_type = %resource.resource_type(),
            sequence_no,
            events = pending.len(),
            "Persisted resource"
        );
        Ok(Persisted {
            resource_id: resource.id().to_string(),
            sequence_no,
            projection_errors,
        })
    }

    /// Persist every resource; failures are reported per resource
    ///
    /// Resources that persisted before a sibling failed are not rolled back.
    pub async fn persist_with_report(&self, ctx: &RequestContext, resources: &mut [Resource]) -> PersistReport {
        let mut report = PersistReport::default();

        for resource in resources.iter_mut() {
            match self.persist_resource(ctx, resource).await {
                Ok(persisted) => report.persisted.push(persisted),
                Err(error) => {
                    error!(resource_id = %resource.id(), error = %error, "Failed to persist resource");
                    report.failures.push(PersistFailure {
                        resource_id: resource.id().to_string(),
                        error,
                    });
                }
            }
        }
        report
    }

    /// Persist every resource, returning one failure per resource that failed
    pub async fn persist(&self, ctx: &RequestContext, resources: &mut [Resource]) -> Vec<PersistFailure> {
        self.persist_with_report(ctx, resources).await.failures
    }

    /// Record a delete event on each resource and persist it
    pub async fn remove(&self, ctx: &RequestContext, resources: &mut [Resource]) -> Vec<PersistFailure> {
        let mut failures = Vec::new();
        let mut staged = Vec::with_capacity(resources.len());

        for (index, resource) in resources.iter_mut().enumerate() {
            match resource.delete(ctx) {
                Ok(_) => staged.push(index),
                Err(error) => failures.push(PersistFailure {
                    resource_id: resource.id().to_string(),
                    error,
                }),
            }
        }

        for index in staged {
            let resource = &mut resources[index];
            if let Err(error) = self.persist_resource(ctx, resource).await {
                error!(resource_id = %resource.id(), error = %error, "Failed to remove resource");
                failures.push(PersistFailure {
                    resource_id: resource.id().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Drop projections and re-dispatch the stored events in log order
    ///
    /// Only handlers whose [`EventHandler::replays`] is true see the
    /// replayed events.
    pub async fn replay(&self, ctx: &RequestContext, resource_type: Option<&str>) -> CoreResult<ReplayReport> {
        let mut report = ReplayReport {
            cleared: self.projections.clear(resource_type).await?,
            ..ReplayReport::default()
        };

        for stored in self.events.read_all(1).await? {
            if resource_type.is_some_and(|t| t != stored.event.resource_type()) {
                continue;
            }
            ctx.ensure_active()?;
            let handlers = self
                .resolve(&stored.event)
                .into_iter()
                .filter(|handler| handler.replays())
                .collect();
            report
                .errors
                .extend(self.run_handlers(ctx, &stored.event, handlers).await);
            report.replayed += 1;
        }

        info!(
            resource_type = resource_type.unwrap_or("*"),
            cleared = report.cleared,
            replayed = report.replayed,
            errors = report.errors.len(),
            "Replayed projections"
        );
        Ok(report)
    }

    /// Rebuild a resource's write-side state from its events
    pub async fn load_resource(&self, resource_id: &str) -> CoreResult<Option<Resource>> {
        let events = self.events.read_events(resource_id).await?;
        Resource::from_events(&events)
    }

    pub async fn events_for(&self, resource_id: &str) -> CoreResult<Vec<Event>> {
        Ok(self.events.read_events(resource_id).await?)
    }

    pub async fn events_by_root(&self, root_id: &str) -> CoreResult<Vec<Event>> {
        Ok(self.events.read_by_root(root_id).await?)
    }

    /// Durable sequence number, 0 when the resource has no events
    pub async fn current_sequence(&self, resource_id: &str) -> CoreResult<u64> {
        Ok(self.events.current_sequence(resource_id).await?)
    }

    pub async fn get_by_uri(&self, uri: &str) -> CoreResult<Option<ProjectionRecord>> {
        Ok(self.projections.find(uri).await?)
    }

    /// Single record of a type identified by its key fields
    pub async fn get_by_key(
        &self,
        resource_type: &str,
        identifiers: &ResourceBody,
    ) -> CoreResult<Option<ProjectionRecord>> {
        if identifiers.is_empty() {
            return Err(CoreError::InvalidPayload(format!(
                "no identifiers given for {}",
                resource_type
            )));
        }
        let found = self
            .projections
            .find_by_properties(resource_type, identifiers)
            .await?;
        if found.len() > 1 {
            warn!(
                resource_type = %resource_type,
                matches = found.len(),
                "Key lookup matched more than one record"
            );
        }
        Ok(found.into_iter().next())
    }

    /// Filtered, sorted page of records
    pub async fn get_list(&self, query: ListQuery) -> CoreResult<Page<ProjectionRecord>> {
        let query = query.normalized(self.default_page_size, self.max_page_size);
        Ok(self.projections.list(&query).await?)
    }

    pub async fn get_by_properties(
        &self,
        resource_type: &str,
        properties: &ResourceBody,
    ) -> CoreResult<Vec<ProjectionRecord>> {
        Ok(self
            .projections
            .find_by_properties(resource_type, properties)
            .await?)
    }
}
