// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Projection Function
//!
//! The built-in projection is a pure function from the previously stored
//! record and an event to an effect:
//!
//! ```text
//! (Option<Record>, Event, Body) → ProjectionEffect
//! ```
//!
//! Side effects are returned as data and applied by
//! [`executor`](super::executor). Replay is a fold of this function over the
//! event log.
//!
//! # Architecture
//!
//! ```text
//! Pure Projection Function          Side Effect Executor
//! ─────────────────────────         ──────────────────────
//!
//! (Record, Event)                   ProjectionEffect
//!      │                                 │
//!      ▼                                 ▼
//! ┌──────────────┐                 ┌──────────────┐
//! │   project()  │    Effect       │   execute()  │
//! │  pure func   │ ─────────────>  │  async I/O   │
//! └──────────────┘                 └──────────────┘
//!                                        │
//!                                        ▼
//!                                 ProjectionStore
//! ```

use serde::{Deserialize, Serialize};

use crate::events::{Event, EventType};
use crate::projection::store::ProjectionRecord;
use crate::resource::ResourceBody;

/// Change to apply to the projection store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectionEffect {
    /// Insert or replace the record
    Upsert(ProjectionRecord),

    /// Remove the record
    Remove { id: String, sequence_no: u64 },

    /// Nothing to do
    Ignore { id: String, reason: String },
}

impl ProjectionEffect {
    pub fn resource_id(&self) -> &str {
        match self {
            ProjectionEffect::Upsert(record) => &record.id,
            ProjectionEffect::Remove { id, .. } | ProjectionEffect::Ignore { id, .. } => id,
        }
    }
}

/// Project one event onto the previously stored record
///
/// Events at or below the stored sequence number are ignored, so applying
/// the same event twice is harmless.
pub fn project(previous: Option<&ProjectionRecord>, event: &Event, body: ResourceBody) -> ProjectionEffect {
    let id = event.resource_id().to_string();

    if let Some(previous) = previous {
        if previous.sequence_no >= event.sequence_no() {
            return ProjectionEffect::Ignore {
                id,
                reason: format!(
                    "already projected sequence {} (event carries {})",
                    previous.sequence_no,
                    event.sequence_no()
                ),
            };
        }
    }

    match &event.event_type {
        EventType::Create | EventType::Update => {
            let mut record = ProjectionRecord {
                id,
                resource_type: event.resource_type().to_string(),
                root_id: event.meta.root_id.clone(),
                sequence_no: event.sequence_no(),
                body,
                columns: ResourceBody::new(),
                created_at: previous
                    .map(|p| p.created_at)
                    .unwrap_or(event.meta.created),
                updated_at: event.meta.created,
                user_id: event.meta.user_id.clone(),
                account_id: event.meta.account_id.clone(),
            };
            record.index_columns();
            ProjectionEffect::Upsert(record)
        }
        EventType::Delete => ProjectionEffect::Remove {
            id,
            sequence_no: event.sequence_no(),
        },
        EventType::Custom(name) => ProjectionEffect::Ignore {
            id,
            reason: format!("no built-in projection for {}", name),
        },
    }
}

/// Fold an ordered event history into the final record, if any
pub fn fold_projection<'a, I>(events: I) -> Option<ProjectionRecord>
where
    I: IntoIterator<Item = (&'a Event, ResourceBody)>,
{
    events
        .into_iter()
        .fold(None, |state, (event, body)| match project(state.as_ref(), event, body) {
            ProjectionEffect::Upsert(record) => Some(record),
            ProjectionEffect::Remove { .. } => None,
            ProjectionEffect::Ignore { .. } => state,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::identity::Identity;
    use crate::resource::Resource;
    use serde_json::json;

    fn body(value: serde_json::Value) -> ResourceBody {
        value.as_object().cloned().unwrap_or_default()
    }

    fn history() -> Vec<Event> {
        let ctx = RequestContext::new(Identity::user("alice"));
        let mut resource = Resource::create(&ctx, "/blogs/1", "Blog", body(json!({"title": "A"}))).unwrap();
        resource.update(&ctx, body(json!({"title": "B"}))).unwrap();
        resource.pending_events().to_vec()
    }

    #[test]
    fn test_create_yields_upsert() {
        let events = history();
        let effect = project(None, &events[0], events[0].decode_body().unwrap());

        let ProjectionEffect::Upsert(record) = effect else {
            panic!("expected upsert");
        };
        assert_eq!(record.sequence_no, 1);
        assert_eq!(record.columns["title"], json!("A"));
        assert_eq!(record.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_update_keeps_creation_time() {
        let events = history();
        let ProjectionEffect::Upsert(first) = project(None, &events[0], events[0].decode_body().unwrap()) else {
            panic!("expected upsert");
        };
        let ProjectionEffect::Upsert(second) =
            project(Some(&first), &events[1], events[1].decode_body().unwrap())
        else {
            panic!("expected upsert");
        };

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.sequence_no, 2);
        assert_eq!(second.body["title"], json!("B"));
    }

    #[test]
    fn test_replayed_event_is_ignored() {
        let events = history();
        let ProjectionEffect::Upsert(second) =
            project(None, &events[1], events[1].decode_body().unwrap())
        else {
            panic!("expected upsert");
        };

        let effect = project(Some(&second), &events[0], events[0].decode_body().unwrap());
        assert!(matches!(effect, ProjectionEffect::Ignore { .. }));
    }

    #[test]
    fn test_fold_is_replay() {
        let events = history();
        let record = fold_projection(events.iter().map(|e| (e, e.decode_body().unwrap()))).unwrap();
        assert_eq!(record.sequence_no, 2);
        assert_eq!(record.body["title"], json!("B"));

        let ctx = RequestContext::system();
        let mut resource = Resource::from_events(&events).unwrap().unwrap();
        resource.delete(&ctx).unwrap();
        let mut all = events.clone();
        all.extend(resource.pending_events().iter().cloned());

        assert!(fold_projection(all.iter().map(|e| (e, e.decode_body().unwrap()))).is_none());
    }
}
