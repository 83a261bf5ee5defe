// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-sourced resource persistence for the Composable Information Machine
//!
//! This crate provides the write and read core behind a resource API:
//! command dispatch to business handlers, versioned event persistence with
//! optimistic concurrency, and projection of events into a queryable read
//! model.
//!
//! ```text
//! boundary ──> CommandDispatcher ──> handlers
//!     │
//!     └──> ResourceRepository ──> ProjectionEngine ──> EventStore
//!                                        │
//!                                        └──> EventHandlers ──> ProjectionStore
//! ```

pub mod boundary;
pub mod commands;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod identity;
pub mod logging;
pub mod projection;
pub mod query;
pub mod repository;
pub mod resource;
pub mod schema;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use commands::Command;
pub use concurrency::{ConcurrencyToken, WriteOutcome};
pub use config::CoreConfig;
pub use context::{Cancellation, RequestContext};
pub use dispatcher::{handler_fn, CommandDispatcher, CommandHandler, DispatchOptions, DispatchOutcome};
pub use errors::{CoreError, CoreResult, ErrorKind, HandlerError, HandlerResult};
pub use event_store::{EventStore, InMemoryEventStore, StoreError};
pub use events::{Event, EventMeta, EventType};
pub use identity::{Identity, IdentityValidator, PolicyEnforcer};
pub use projection::{
    event_handler_fn, projection_handler_fn, EventHandler, InMemoryProjectionStore,
    ProjectionEngine, ProjectionRecord, ProjectionStore,
};
pub use query::{FilterOp, FilterOption, ListQuery, Page, Sort, SortOrder};
pub use repository::{ResourceRepository, WriteResult};
pub use resource::{Resource, ResourceBody};
pub use schema::{SchemaProvider, StaticSchemaProvider};
