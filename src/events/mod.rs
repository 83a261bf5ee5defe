// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Events
//!
//! An [`Event`] is the immutable record of one accepted change to a resource.
//! Events are appended to the event store, never mutated or deleted.
//!
//! # Event Sourcing Principles
//!
//! 1. **Events are immutable**: Once recorded, an event never changes
//! 2. **Events are sequenced**: `meta.sequence_no` is gapless per resource, starting at 1
//! 3. **Events are generation-ordered**: ids are UUID v7, so sorting by id preserves insertion order
//! 4. **Events carry the full body**: the payload is the serialized resource body at event time
//!
//! # Event Flow
//!
//! ```text
//! Resource::record → pending events → EventStore::append → EventHandler fan-out
//!                                                              ↓
//!                                                     projection upsert/remove
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::resource::ResourceBody;

/// Event type discriminator
///
/// The three lifecycle types are known to the built-in projection; anything
/// else is a domain-specific event carried through as [`EventType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventType {
    Create,
    Update,
    Delete,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Custom(name) => name,
        }
    }

    /// Whether applying this event leaves the resource visible on the read side
    pub fn is_upsert(&self) -> bool {
        matches!(self, EventType::Create | EventType::Update)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "create" => EventType::Create,
            "update" => EventType::Update,
            "delete" => EventType::Delete,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// Metadata attached to every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Resource this event belongs to
    pub resource_id: String,

    /// Resource type discriminator (a schema type URI)
    pub resource_type: String,

    /// Position of this event in the resource's stream, starting at 1
    pub sequence_no: u64,

    /// Root aggregate the resource belongs to (the resource itself when unset)
    pub root_id: String,

    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub application_id: Option<String>,

    /// When the change was accepted
    pub created: DateTime<Utc>,
}

/// Immutable record of one accepted change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique, generation-ordered id (UUID v7)
    pub id: Uuid,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Serialized resource body at the time of the event
    pub payload: Vec<u8>,

    pub meta: EventMeta,
}

impl Event {
    /// Create an event with a freshly generated id
    pub fn new(event_type: EventType, payload: Vec<u8>, meta: EventMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type,
            payload,
            meta,
        }
    }

    /// Create an event whose payload is the JSON encoding of `body`
    pub fn with_body(event_type: EventType, body: &ResourceBody, meta: EventMeta) -> CoreResult<Self> {
        let payload = serde_json::to_vec(body)?;
        Ok(Self::new(event_type, payload, meta))
    }

    /// Decode the payload as a JSON resource body
    ///
    /// An empty payload decodes to an empty body.
    pub fn decode_body(&self) -> CoreResult<ResourceBody> {
        if self.payload.is_empty() {
            return Ok(ResourceBody::new());
        }
        serde_json::from_slice(&self.payload).map_err(|e| {
            CoreError::InvalidPayload(format!(
                "event {} for {} is not a JSON object: {}",
                self.id, self.meta.resource_id, e
            ))
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.meta.resource_id
    }

    pub fn resource_type(&self) -> &str {
        &self.meta.resource_type
    }

    pub fn sequence_no(&self) -> u64 {
        self.meta.sequence_no
    }

    /// Structural validity required before an event may be appended
    pub fn validate(&self) -> CoreResult<()> {
        if self.meta.resource_id.trim().is_empty() {
            return Err(CoreError::InvalidPayload(format!(
                "event {} has no resource id",
                self.id
            )));
        }
        if self.meta.sequence_no == 0 {
            return Err(CoreError::InvalidPayload(format!(
                "event {} for {} has sequence number 0",
                self.id, self.meta.resource_id
            )));
        }
        Ok(())
    }
}
