// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource type tagging
//!
//! A new resource needs a type. When the payload does not name one with
//! `@type`, the [`SchemaProvider`] maps the resource id to a type.

use std::collections::BTreeMap;

use crate::config::CoreConfig;

/// Key in a payload that names the resource type explicitly
pub const TYPE_FIELD: &str = "@type";

/// Supplies resource types for resource ids
pub trait SchemaProvider: Send + Sync {
    fn resource_type_for(&self, resource_id: &str) -> Option<String>;
}

/// Maps id path prefixes to resource types; the longest prefix wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSchemaProvider {
    prefixes: BTreeMap<String, String>,
}

impl StaticSchemaProvider {
    pub fn new(prefixes: BTreeMap<String, String>) -> Self {
        Self { prefixes }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.schema.clone())
    }

    pub fn with(mut self, prefix: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), resource_type.into());
        self
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn resource_type_for(&self, resource_id: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(prefix, _)| {
                let prefix = prefix.trim_end_matches('/');
                resource_id == prefix
                    || resource_id
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, resource_type)| resource_type.clone())
    }
}
