// Copyright (c) 2025 - Cowboy AI, Inc.
//! Command Dispatcher
//!
//! Routes a [`Command`] to every registered handler that matches it and runs
//! them concurrently, one task per handler.
//!
//! # Resolution
//!
//! ```text
//! (type, entityType) handlers      exact tier
//!   └─ empty? → (type) handlers    generic tier, only as fallback
//! + "*" handlers                   always appended
//! ```
//!
//! # Failure Isolation
//!
//! Each handler runs in its own `tokio` task. A handler that returns an
//! error or panics is reported in [`DispatchOutcome::errors`]; siblings keep
//! running and the dispatcher always joins every task before returning.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::commands::Command;
use crate::context::RequestContext;
use crate::errors::{CoreError, CoreResult, HandlerError, HandlerResult};
use crate::subjects::{SubscriptionKey, WILDCARD};

/// Optional response produced by a command handler
pub type CommandResponse = Option<Value>;

/// Business-logic handler reacting to commands
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command
    ///
    /// Long-running handlers should watch [`RequestContext::cancelled`].
    async fn handle(&self, ctx: &RequestContext, command: &Command) -> HandlerResult<CommandResponse>;

    /// Name used in logs and error reports
    fn name(&self) -> &str {
        "command-handler"
    }
}

/// Closure-based command handler
pub struct FnCommandHandler<F> {
    name: String,
    handler: F,
}

impl<F> FnCommandHandler<F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(RequestContext, Command) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<CommandResponse>> + Send,
{
    async fn handle(&self, ctx: &RequestContext, command: &Command) -> HandlerResult<CommandResponse> {
        (self.handler)(ctx.clone(), command.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a shareable command handler
pub fn handler_fn<F, Fut>(name: impl Into<String>, handler: F) -> Arc<dyn CommandHandler>
where
    F: Fn(RequestContext, Command) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<CommandResponse>> + Send + 'static,
{
    Arc::new(FnCommandHandler::new(name, handler))
}

/// Per-call dispatch options
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// Reject the dispatch when more than one handler produced a response
    pub require_single_responder: bool,
}

/// Everything a dispatch produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Response of the last handler to complete with one
    pub response: CommandResponse,

    /// One entry per failed handler
    pub errors: Vec<HandlerError>,

    /// Number of handlers resolved and run
    pub handlers_invoked: usize,

    /// Number of handlers that produced a response
    pub responders: usize,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into the response or the first handler error
    pub fn into_result(self) -> CoreResult<CommandResponse> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(self.response),
        }
    }
}

type HandlerList = Vec<Arc<dyn CommandHandler>>;

/// Registry of command handlers plus the concurrent fan-out
///
/// Constructed once at startup and shared by handle (`Arc`). Registration
/// may continue while dispatches are in flight; each dispatch works on a
/// snapshot of the matching handler lists.
#[derive(Default)]
pub struct CommandDispatcher {
    subscribers: RwLock<HashMap<SubscriptionKey, HandlerList>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `(command_type, resource_type)`
    ///
    /// An empty resource type registers a generic handler for the command
    /// type; the command type `"*"` registers a wildcard handler for every
    /// command, whatever resource type is given. Repeated registration is
    /// additive.
    pub fn add_subscriber(
        &self,
        command_type: impl Into<String>,
        resource_type: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) {
        let command_type = command_type.into();
        let resource_type = resource_type.into();
        let key = if command_type == WILDCARD {
            if !resource_type.is_empty() {
                warn!(
                    resource_type = %resource_type,
                    handler = handler.name(),
                    "Wildcard handlers see every command; ignoring resource type"
                );
            }
            SubscriptionKey::wildcard()
        } else {
            SubscriptionKey::new(command_type, resource_type)
        };
        debug!(key = %key, handler = handler.name(), "Registering command handler");

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.entry(key).or_default().push(handler);
    }

    /// Registered keys with their handler counts, sorted by key
    pub fn subscribers(&self) -> Vec<(SubscriptionKey, usize)> {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = subscribers
            .iter()
            .map(|(key, handlers)| (key.clone(), handlers.len()))
            .collect();
        keys.sort();
        keys
    }

    /// Handlers that would run for `command`, in registration order per tier
    pub fn resolve(&self, command: &Command) -> HandlerList {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let exact = SubscriptionKey::new(command.command_type.clone(), command.entity_type());
        let mut handlers: HandlerList = subscribers.get(&exact).cloned().unwrap_or_default();

        if handlers.is_empty() {
            let generic = SubscriptionKey::any_resource(command.command_type.clone());
            if !generic.is_wildcard() {
                if let Some(found) = subscribers.get(&generic) {
                    handlers.extend(found.iter().cloned());
                }
            }
        }

        if let Some(wildcard) = subscribers.get(&SubscriptionKey::wildcard()) {
            handlers.extend(wildcard.iter().cloned());
        }

        handlers
    }

    /// Run every matching handler concurrently and join them all
    ///
    /// A command with no matching handlers is not an error; it yields an
    /// empty outcome.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        command: Command,
        options: &DispatchOptions,
    ) -> CoreResult<DispatchOutcome> {
        command.validate()?;
        ctx.ensure_active()?;

        let handlers = self.resolve(&command);
        let mut outcome = DispatchOutcome {
            handlers_invoked: handlers.len(),
            ..DispatchOutcome::default()
        };

        if handlers.is_empty() {
            debug!(
                command_type = %command.command_type,
                entity_type = %command.entity_type(),
                "No handlers registered for command"
            );
            return Ok(outcome);
        }

        let command = Arc::new(command);
        let mut tasks = FuturesUnordered::new();

        for handler in handlers {
            let name = handler.name().to_string();
            let task_ctx = ctx.clone();
            let task_command = Arc::clone(&command);
            let task_name = name.clone();

            let join = tokio::spawn(async move {
                tokio::select! {
                    result = handler.handle(&task_ctx, &task_command) => result,
                    _ = task_ctx.cancelled() => Err(HandlerError::Cancelled { handler: task_name }),
                }
            });
            tasks.push(async move { (name, join.await) });
        }

        while let Some((name, joined)) = tasks.next().await {
            match joined {
                Ok(Ok(Some(response))) => {
                    outcome.responders += 1;
                    outcome.response = Some(response);
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    warn!(
                        handler = %name,
                        command_type = %command.command_type,
                        error = %err,
                        "Command handler failed"
                    );
                    outcome.errors.push(err);
                }
                Err(join_err) => {
                    let err = join_failure(name, join_err);
                    error!(
                        command_type = %command.command_type,
                        error = %err,
                        "Command handler task aborted"
                    );
                    outcome.errors.push(err);
                }
            }
        }

        if options.require_single_responder && outcome.responders > 1 {
            return Err(CoreError::InvalidCommand(format!(
                "{} handlers responded to {} on {}; exactly one is allowed",
                outcome.responders,
                command.command_type,
                command.entity_type()
            )));
        }

        Ok(outcome)
    }
}

/// Convert a failed task join into a handler error
pub(crate) fn join_failure(handler: String, err: JoinError) -> HandlerError {
    if err.is_panic() {
        HandlerError::Panicked {
            handler,
            message: panic_message(err.into_panic()),
        }
    } else {
        HandlerError::Cancelled { handler }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
