// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tracing initialisation

use tracing_subscriber::EnvFilter;

use crate::errors::{CoreError, CoreResult};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_directive`
///
/// Fails if the directive is invalid or a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> CoreResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            CoreError::Configuration(format!("invalid log filter '{}': {}", default_directive, e))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| CoreError::Configuration(format!("tracing already initialised: {}", e)))
}
