// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request-scoped parameters
//!
//! Identity values and the cancellation signal travel as an explicit
//! [`RequestContext`] passed to every dispatcher, engine and handler call.

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::identity::Identity;

/// Cooperative cancellation shared by every clone
///
/// Cancelling is sticky: once set, every clone reports cancellation and
/// every pending [`Cancellation::cancelled`] future resolves.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    /// Create a signal that is not cancelled
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel all holders of this signal
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let cancelled = *rx.borrow_and_update();
            if cancelled {
                return;
            }
            // The sender lives in `self`, so `changed` cannot observe a closed channel here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit request-scoped parameters for one inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates log lines of one request (UUID v7)
    pub request_id: Uuid,

    /// Identity established by the boundary; stored as event metadata only
    pub identity: Identity,

    cancellation: Cancellation,
}

impl RequestContext {
    /// Create a context for the given identity
    pub fn new(identity: Identity) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            identity,
            cancellation: Cancellation::new(),
        }
    }

    /// Context for internal or system work without a caller identity
    pub fn system() -> Self {
        Self::new(Identity::default())
    }

    /// Attach an externally owned cancellation signal
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.user_id.as_deref()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.identity.account_id.as_deref()
    }

    pub fn application_id(&self) -> Option<&str> {
        self.identity.application_id.as_deref()
    }

    /// The cancellation signal carried by this context
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolve once the request is cancelled
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Fail fast when the request has already been cancelled
    pub fn ensure_active(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }
}
