// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Aggregate
//!
//! A [`Resource`] wraps an arbitrary structured body and is the unit the
//! rest of the system versions and persists. Every accepted change is
//! recorded as a pending [`Event`] carrying the next sequence number; the
//! pending list is cleared once the event store has made them durable.
//!
//! # Architecture
//!
//! ```text
//! record(type, body) → Event{seq = n + 1} → pending
//!                                             ↓  ProjectionEngine::persist
//!                                           durable (pending cleared)
//!
//! Events → from_events() → Resource  (fold, used to load durable state)
//! ```
//!
//! # Invariants
//!
//! - `sequence_no` equals the number of events ever recorded for the id
//! - `sequence_no` never decreases
//! - a resource with `sequence_no == 0` does not exist on the read side

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::concurrency::ConcurrencyToken;
use crate::context::RequestContext;
use crate::errors::{CoreError, CoreResult};
use crate::event_store::StoreError;
use crate::events::{Event, EventMeta, EventType};

/// Open map of arbitrary fields
pub type ResourceBody = serde_json::Map<String, Value>;

/// Aggregate wrapper around a structured body
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: String,
    resource_type: String,
    root_id: String,
    body: ResourceBody,
    sequence_no: u64,
    persisted_sequence_no: u64,
    deleted: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    pending: Vec<Event>,
}

impl Resource {
    /// Empty resource that has recorded no events yet
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            root_id: id.clone(),
            id,
            resource_type: resource_type.into(),
            body: ResourceBody::new(),
            sequence_no: 0,
            persisted_sequence_no: 0,
            deleted: false,
            created_at: None,
            updated_at: None,
            pending: Vec::new(),
        }
    }

    /// Attach the resource to a root aggregate
    pub fn with_root(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = root_id.into();
        self
    }

    /// Create a resource and record its creation event
    pub fn create(
        ctx: &RequestContext,
        id: impl Into<String>,
        resource_type: impl Into<String>,
        body: ResourceBody,
    ) -> CoreResult<Self> {
        let mut resource = Self::new(id, resource_type);
        resource.record(ctx, EventType::Create, body)?;
        Ok(resource)
    }

    /// Reconstruct durable state by folding a resource's event stream
    ///
    /// Returns `None` for an empty stream. The stream must be gapless and
    /// start at sequence 1.
    pub fn from_events(events: &[Event]) -> CoreResult<Option<Self>> {
        let Some(first) = events.first() else {
            return Ok(None);
        };

        let mut resource = Self::new(first.resource_id(), first.resource_type())
            .with_root(first.meta.root_id.clone());

        for event in events {
            if event.resource_id() != resource.id {
                return Err(StoreError::Corrupt(format!(
                    "event {} belongs to {}, not {}",
                    event.id,
                    event.resource_id(),
                    resource.id
                ))
                .into());
            }
            if event.sequence_no() != resource.sequence_no + 1 {
                return Err(StoreError::Corrupt(format!(
                    "gap in stream {}: expected sequence {}, found {}",
                    resource.id,
                    resource.sequence_no + 1,
                    event.sequence_no()
                ))
                .into());
            }
            resource.apply(event)?;
        }

        resource.persisted_sequence_no = resource.sequence_no;
        Ok(Some(resource))
    }

    /// Apply an event to in-memory state without recording it
    fn apply(&mut self, event: &Event) -> CoreResult<()> {
        match &event.event_type {
            EventType::Create | EventType::Update => {
                self.body = event.decode_body()?;
                self.deleted = false;
            }
            EventType::Delete => {
                self.deleted = true;
            }
            EventType::Custom(_) => {
                if !event.payload.is_empty() {
                    self.body = event.decode_body()?;
                }
            }
        }

        if self.created_at.is_none() || event.event_type == EventType::Create {
            self.created_at = Some(event.meta.created);
        }
        self.updated_at = Some(event.meta.created);
        self.sequence_no = event.sequence_no();
        Ok(())
    }

    /// Record a new change as a pending event with the next sequence number
    pub fn record(
        &mut self,
        ctx: &RequestContext,
        event_type: EventType,
        body: ResourceBody,
    ) -> CoreResult<&Event> {
        let meta = EventMeta {
            resource_id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            sequence_no: self.sequence_no + 1,
            root_id: self.root_id.clone(),
            user_id: ctx.user_id().map(str::to_string),
            account_id: ctx.account_id().map(str::to_string),
            application_id: ctx.application_id().map(str::to_string),
            created: Utc::now(),
        };
        let event = Event::with_body(event_type, &body, meta)?;
        event.validate()?;

        self.apply(&event)?;
        self.pending.push(event);
        let recorded = self.pending.len() - 1;
        Ok(&self.pending[recorded])
    }

    /// Replace the body of an existing resource
    pub fn update(&mut self, ctx: &RequestContext, body: ResourceBody) -> CoreResult<&Event> {
        if !self.exists() {
            return Err(CoreError::NotFound(self.id.clone()));
        }
        self.record(ctx, EventType::Update, body)
    }

    /// Record the removal of an existing resource
    pub fn delete(&mut self, ctx: &RequestContext) -> CoreResult<&Event> {
        if !self.exists() {
            return Err(CoreError::NotFound(self.id.clone()));
        }
        let body = self.body.clone();
        self.record(ctx, EventType::Delete, body)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn body(&self) -> &ResourceBody {
        &self.body
    }

    /// Number of events recorded, durable and pending
    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// Sequence number known to be durable
    pub fn persisted_sequence_no(&self) -> u64 {
        self.persisted_sequence_no
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Recorded at least once and not deleted
    pub fn exists(&self) -> bool {
        self.sequence_no > 0 && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Events recorded since the last successful persist, in order
    pub fn pending_events(&self) -> &[Event] {
        &self.pending
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Clear the pending list after the event store accepted all of it
    pub(crate) fn mark_persisted(&mut self) {
        if let Some(last) = self.pending.last() {
            self.persisted_sequence_no = last.sequence_no();
        }
        self.pending.clear();
    }

    /// Token reflecting the current sequence number
    pub fn concurrency_token(&self) -> ConcurrencyToken {
        ConcurrencyToken::new(self.id.clone(), self.sequence_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use serde_json::json;

    fn body(value: serde_json::Value) -> ResourceBody {
        value.as_object().cloned().unwrap_or_default()
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Identity::user("alice").with_account("acme"))
    }

    #[test]
    fn test_create_records_first_event() {
        let resource = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({"title": "A"}))).unwrap();

        assert_eq!(resource.sequence_no(), 1);
        assert_eq!(resource.persisted_sequence_no(), 0);
        assert!(resource.exists());
        assert_eq!(resource.pending_events().len(), 1);

        let event = &resource.pending_events()[0];
        assert_eq!(event.event_type, EventType::Create);
        assert_eq!(event.meta.sequence_no, 1);
        assert_eq!(event.meta.user_id.as_deref(), Some("alice"));
        assert_eq!(event.meta.account_id.as_deref(), Some("acme"));
        assert_eq!(event.meta.root_id, "/blogs/1");
    }

    #[test]
    fn test_each_record_increments_sequence_once() {
        let mut resource = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({"title": "A"}))).unwrap();
        resource.update(&ctx(), body(json!({"title": "B"}))).unwrap();
        resource.update(&ctx(), body(json!({"title": "C"}))).unwrap();

        let sequence: Vec<u64> = resource
            .pending_events()
            .iter()
            .map(|e| e.sequence_no())
            .collect();
        assert_eq!(sequence, vec![1, 2, 3]);
        assert_eq!(resource.body()["title"], json!("C"));
    }

    #[test]
    fn test_mark_persisted_clears_pending() {
        let mut resource = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({}))).unwrap();
        resource.mark_persisted();

        assert!(!resource.has_pending_events());
        assert_eq!(resource.persisted_sequence_no(), 1);
        assert_eq!(resource.sequence_no(), 1);
    }

    #[test]
    fn test_from_events_rebuilds_state() {
        let mut original = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({"title": "A"}))).unwrap();
        original.update(&ctx(), body(json!({"title": "B"}))).unwrap();
        let events = original.pending_events().to_vec();

        let rebuilt = Resource::from_events(&events).unwrap().unwrap();
        assert_eq!(rebuilt.sequence_no(), 2);
        assert_eq!(rebuilt.persisted_sequence_no(), 2);
        assert_eq!(rebuilt.body(), original.body());
        assert!(!rebuilt.has_pending_events());

        assert!(Resource::from_events(&[]).unwrap().is_none());
    }

    #[test]
    fn test_from_events_rejects_gaps() {
        let mut original = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({}))).unwrap();
        original.update(&ctx(), body(json!({}))).unwrap();
        original.update(&ctx(), body(json!({}))).unwrap();
        let mut events = original.pending_events().to_vec();
        events.remove(1);

        assert!(matches!(
            Resource::from_events(&events),
            Err(CoreError::Storage(StoreError::Corrupt(_)))
        ));
    }

    #[test]
    fn test_delete_hides_resource_but_keeps_sequence() {
        let mut resource = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({"title": "A"}))).unwrap();
        resource.delete(&ctx()).unwrap();

        assert!(!resource.exists());
        assert!(resource.is_deleted());
        assert_eq!(resource.sequence_no(), 2);

        assert!(matches!(
            resource.update(&ctx(), body(json!({}))),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_requires_existing_resource() {
        let mut resource = Resource::new("/blogs/9", "Blog");
        assert!(matches!(
            resource.update(&ctx(), body(json!({}))),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(resource.sequence_no(), 0);
    }

    #[test]
    fn test_concurrency_token_tracks_sequence() {
        let mut resource = Resource::create(&ctx(), "/blogs/1", "Blog", body(json!({}))).unwrap();
        assert_eq!(resource.concurrency_token().to_string(), "/blogs/1.1");
        resource.update(&ctx(), body(json!({}))).unwrap();
        assert_eq!(resource.concurrency_token().to_string(), "/blogs/1.2");
    }
}
