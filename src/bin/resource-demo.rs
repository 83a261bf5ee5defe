// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Store Demo
//!
//! Walks a blog resource through the full write and read path against the
//! in-memory stores:
//!
//! 1. Create `/blogs/1` (201, `ETag: "/blogs/1.1"`)
//! 2. Update it with `If-Match: "/blogs/1.1"` (200, `ETag: "/blogs/1.2"`)
//! 3. Retry with the stale token (412, sequence stays 2)
//! 4. Read it back and list blogs through a filtered query string
//! 5. Dispatch a `publish` command to business handlers
//! 6. Rebuild the projection from the event log
//!
//! Run with: cargo run --bin resource-demo
//!
//! Configuration comes from `CIM_RESOURCE_*` environment variables.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cim_resource_store::{
    boundary, handler_fn, logging, Command, CommandDispatcher, CoreConfig, DispatchOptions,
    HandlerError, Identity, ProjectionEngine, RequestContext, ResourceBody, ResourceRepository,
    StaticSchemaProvider,
};
use serde_json::json;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = CoreConfig::from_env().context("Failed to load configuration")?;
    if config.schema.is_empty() {
        config.schema.insert("/blogs".to_string(), "Blog".to_string());
    }
    logging::init_tracing(&config.log_filter).context("Failed to initialise tracing")?;

    info!("🚀 Starting resource store demo");
    info!(
        default_page_size = config.default_page_size,
        max_page_size = config.max_page_size,
        schema_entries = config.schema.len(),
        "📋 Configuration loaded"
    );

    let engine = Arc::new(ProjectionEngine::in_memory(&config));
    let repository = ResourceRepository::new(
        Arc::clone(&engine),
        Arc::new(StaticSchemaProvider::from_config(&config)),
    );
    let ctx = RequestContext::new(Identity::user("demo").with_account("acme"));

    // 1. create
    let created = repository
        .save(&ctx, "/blogs/1", None, body(json!({"title": "A", "authorName": "Ann"})), None)
        .await;
    let response = boundary::write_response(&created);
    info!(status = response.status, etag = ?response.etag, "✅ Created /blogs/1");
    let first_etag = response.etag.context("create returned no ETag")?;

    // 2. conditional update
    let token = boundary::if_match(Some(&first_etag))?;
    let updated = repository
        .save(&ctx, "/blogs/1", None, body(json!({"title": "B", "authorName": "Ann"})), token.as_ref())
        .await;
    let response = boundary::write_response(&updated);
    info!(status = response.status, etag = ?response.etag, "✅ Updated /blogs/1");

    // 3. stale update
    let stale = repository
        .save(&ctx, "/blogs/1", None, body(json!({"title": "C"})), token.as_ref())
        .await;
    let response = boundary::write_response(&stale);
    if response.status != boundary::PRECONDITION_FAILED {
        bail!("stale token was accepted with status {}", response.status);
    }
    warn!(
        status = response.status,
        sequence_no = engine.current_sequence("/blogs/1").await?,
        "⛔ Stale token rejected"
    );

    // 4. reads
    let read = boundary::read_response(&repository.get("/blogs/1").await);
    info!(status = read.status, etag = ?read.etag, body = ?read.body, "📖 Read /blogs/1");

    let query = boundary::list_query("Blog", "_filters[authorName][eq]=Ann&_sorts[title]=asc")?;
    let page = engine.get_list(query).await?;
    info!(total = page.total, page = page.page, limit = page.limit, "📚 Listed blogs");

    // 5. commands
    let dispatcher = CommandDispatcher::new();
    dispatcher.add_subscriber(
        "publish",
        "Blog",
        handler_fn("publisher", |_ctx, command| async move {
            match command.metadata.entity_id {
                Some(id) => Ok(Some(json!({"published": id}))),
                None => Err(HandlerError::failed("publisher", "publish needs an entity id")),
            }
        }),
    );
    dispatcher.add_subscriber(
        "*",
        "",
        handler_fn("audit", |_ctx, command| async move {
            info!(command_type = %command.command_type, "📝 Audited command");
            Ok::<_, HandlerError>(None)
        }),
    );

    let command = Command::new("publish", "Blog", Vec::new())
        .with_entity_id("/blogs/1")
        .with_context(&ctx);
    let outcome = dispatcher
        .dispatch(&ctx, command, &DispatchOptions::default())
        .await?;
    info!(
        handlers = outcome.handlers_invoked,
        response = ?outcome.response,
        errors = outcome.errors.len(),
        "📨 Dispatched publish"
    );

    // 6. replay
    let report = engine.replay(&ctx, None).await?;
    info!(
        cleared = report.cleared,
        replayed = report.replayed,
        errors = report.errors.len(),
        "🔄 Rebuilt projections"
    );

    let history = engine.events_for("/blogs/1").await?;
    info!(events = history.len(), "🏁 Demo complete");
    Ok(())
}

fn body(value: serde_json::Value) -> ResourceBody {
    value.as_object().cloned().unwrap_or_default()
}
