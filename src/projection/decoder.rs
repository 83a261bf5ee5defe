// Copyright (c) 2025 - Cowboy AI, Inc.
//! Payload decoders
//!
//! Event payloads are opaque bytes. At the projection boundary they are
//! turned back into a [`ResourceBody`] by the decoder registered for the
//! event's resource type, or by [`JsonDecoder`] when none is registered.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::errors::CoreResult;
use crate::events::Event;
use crate::resource::ResourceBody;

/// Turns an event payload into a resource body
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, event: &Event) -> CoreResult<ResourceBody>;
}

/// Payload is a JSON object
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl PayloadDecoder for JsonDecoder {
    fn decode(&self, event: &Event) -> CoreResult<ResourceBody> {
        event.decode_body()
    }
}

/// Decoders keyed by resource type
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: RwLock<HashMap<String, Arc<dyn PayloadDecoder>>>,
    fallback: JsonDecoder,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the decoder for a resource type
    pub fn register(&self, resource_type: impl Into<String>, decoder: Arc<dyn PayloadDecoder>) {
        let resource_type = resource_type.into();
        debug!(resource_type = %resource_type, "Registering payload decoder");
        self.decoders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource_type, decoder);
    }

    pub fn decode(&self, event: &Event) -> CoreResult<ResourceBody> {
        let decoder = self
            .decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event.resource_type())
            .cloned();

        match decoder {
            Some(decoder) => decoder.decode(event),
            None => self.fallback.decode(event),
        }
    }
}
