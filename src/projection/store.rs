// Copyright (c) 2025 - Cowboy AI, Inc.
//! Projection Store
//!
//! The read model: one [`ProjectionRecord`] per live resource, kept current
//! by the built-in projection handler. Queries from the boundary never touch
//! the event log; they read from here.
//!
//! Records carry both the original body and a flattened `columns` map whose
//! keys follow the storage naming convention (`author.name` →
//! `author_name`). Filters and sorts run against `columns`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::concurrency::ConcurrencyToken;
use crate::event_store::StoreResult;
use crate::query::{column_name, ListQuery, Page};
use crate::resource::ResourceBody;

/// Materialized, queryable view of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub id: String,
    pub resource_type: String,
    pub root_id: String,

    /// Sequence number of the last event applied
    pub sequence_no: u64,

    pub body: ResourceBody,

    /// Flattened snake_case view of `body` plus metadata columns
    pub columns: ResourceBody,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
}

impl ProjectionRecord {
    /// Token callers send back to condition their next write
    pub fn token(&self) -> ConcurrencyToken {
        ConcurrencyToken::new(self.id.clone(), self.sequence_no)
    }

    /// Rebuild `columns` from the body and metadata
    pub fn index_columns(&mut self) {
        let mut columns = ResourceBody::new();
        flatten_into(&mut columns, "", &self.body);
        // metadata wins over body fields of the same name
        columns.insert("id".to_string(), Value::String(self.id.clone()));
        columns.insert("sequence_no".to_string(), Value::from(self.sequence_no));
        columns.insert(
            "created_at".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        columns.insert(
            "updated_at".to_string(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        self.columns = columns;
    }

    /// Whether every property equals the matching column
    pub fn has_properties(&self, properties: &ResourceBody) -> bool {
        properties.iter().all(|(field, expected)| {
            self.columns
                .get(&column_name(field))
                .is_some_and(|actual| same_value(actual, expected))
        })
    }
}

fn flatten_into(columns: &mut ResourceBody, prefix: &str, body: &ResourceBody) {
    for (key, value) in body {
        let column = if prefix.is_empty() {
            column_name(key)
        } else {
            format!("{}_{}", prefix, column_name(key))
        };
        match value {
            Value::Object(nested) => flatten_into(columns, &column, nested),
            other => {
                columns.insert(column, other.clone());
            }
        }
    }
}

fn same_value(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(a), Value::String(b)) => {
            b.parse::<f64>().ok().is_some_and(|b| a.as_f64() == Some(b))
        }
        _ => actual == expected,
    }
}

/// Keyed storage for projection records
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Insert or replace a record
    ///
    /// Returns `false` when the stored record is already at the same or a
    /// newer sequence number; the save is then a no-op.
    async fn save(&self, record: ProjectionRecord) -> StoreResult<bool>;

    async fn find(&self, id: &str) -> StoreResult<Option<ProjectionRecord>>;

    /// Remove a record as of the delete event's sequence number
    ///
    /// The store remembers the sequence as a tombstone so a late save at or
    /// below it stays a no-op. A stored record at or above the sequence is
    /// kept. Returns whether a record was removed.
    async fn delete(&self, id: &str, sequence_no: u64) -> StoreResult<bool>;

    /// Filtered, sorted page of records of one resource type
    ///
    /// The query is expected to be normalized already.
    async fn list(&self, query: &ListQuery) -> StoreResult<Page<ProjectionRecord>>;

    /// Every record of a type whose columns equal all given properties
    async fn find_by_properties(
        &self,
        resource_type: &str,
        properties: &ResourceBody,
    ) -> StoreResult<Vec<ProjectionRecord>>;

    /// Drop all records and tombstones, or only those of one type; returns
    /// how many records were dropped
    async fn clear(&self, resource_type: Option<&str>) -> StoreResult<usize>;
}

#[derive(Debug, Clone)]
struct Tombstone {
    resource_type: String,
    sequence_no: u64,
}

#[derive(Default)]
struct Tables {
    records: HashMap<String, ProjectionRecord>,
    tombstones: HashMap<String, Tombstone>,
}

/// Projection store held in process memory
#[derive(Default)]
pub struct InMemoryProjectionStore {
    tables: RwLock<Tables>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn save(&self, mut record: ProjectionRecord) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;

        if let Some(tombstone) = tables.tombstones.get(&record.id) {
            if tombstone.sequence_no >= record.sequence_no {
                trace!(
                    resource_id = %record.id,
                    deleted_at = tombstone.sequence_no,
                    incoming = record.sequence_no,
                    "Skipping projection older than its delete"
                );
                return Ok(false);
            }
        }

        if let Some(existing) = tables.records.get(&record.id) {
            if existing.sequence_no >= record.sequence_no {
                trace!(
                    resource_id = %record.id,
                    stored = existing.sequence_no,
                    incoming = record.sequence_no,
                    "Skipping stale projection"
                );
                return Ok(false);
            }
        }

        if record.columns.is_empty() {
            record.index_columns();
        }
        debug!(resource_id = %record.id, sequence_no = record.sequence_no, "Saved projection");
        tables.tombstones.remove(&record.id);
        tables.records.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn find(&self, id: &str) -> StoreResult<Option<ProjectionRecord>> {
        Ok(self.tables.read().await.records.get(id).cloned())
    }

    async fn delete(&self, id: &str, sequence_no: u64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.records.get(id) {
            if existing.sequence_no >= sequence_no {
                trace!(
                    resource_id = %id,
                    stored = existing.sequence_no,
                    incoming = sequence_no,
                    "Skipping stale projection delete"
                );
                return Ok(false);
            }
        }

        let removed = tables.records.remove(id);
        let tombstone = tables
            .tombstones
            .entry(id.to_string())
            .or_insert_with(|| Tombstone {
                resource_type: String::new(),
                sequence_no,
            });
        tombstone.sequence_no = tombstone.sequence_no.max(sequence_no);
        if let Some(record) = &removed {
            tombstone.resource_type = record.resource_type.clone();
        }

        let removed = removed.is_some();
        debug!(resource_id = %id, sequence_no, removed, "Deleted projection");
        Ok(removed)
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Page<ProjectionRecord>> {
        let tables = self.tables.read().await;

        let mut matching: Vec<&ProjectionRecord> = tables
            .records
            .values()
            .filter(|record| record.resource_type == query.resource_type)
            .filter(|record| query.matches(&record.columns))
            .collect();

        matching.sort_by(|a, b| {
            query
                .compare(&a.columns, &b.columns)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn find_by_properties(
        &self,
        resource_type: &str,
        properties: &ResourceBody,
    ) -> StoreResult<Vec<ProjectionRecord>> {
        let tables = self.tables.read().await;
        let mut found: Vec<ProjectionRecord> = tables
            .records
            .values()
            .filter(|record| record.resource_type == resource_type)
            .filter(|record| record.has_properties(properties))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn clear(&self, resource_type: Option<&str>) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.records.len();
        match resource_type {
            Some(resource_type) => {
                tables.records.retain(|_, record| record.resource_type != resource_type);
                tables
                    .tombstones
                    .retain(|_, tombstone| tombstone.resource_type != resource_type);
            }
            None => {
                tables.records.clear();
                tables.tombstones.clear();
            }
        }
        Ok(before - tables.records.len())
    }
}
