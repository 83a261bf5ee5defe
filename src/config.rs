// Copyright (c) 2025 - Cowboy AI, Inc.
//! Core configuration
//!
//! Loaded from environment variables or a JSON document:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `CIM_RESOURCE_LOG` | `log_filter` | `info` |
//! | `CIM_RESOURCE_DEFAULT_PAGE_SIZE` | `default_page_size` | `20` |
//! | `CIM_RESOURCE_MAX_PAGE_SIZE` | `max_page_size` | `100` |
//! | `CIM_RESOURCE_SCHEMA` | `schema` (`prefix=Type,...`) | empty |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

pub const ENV_LOG: &str = "CIM_RESOURCE_LOG";
pub const ENV_DEFAULT_PAGE_SIZE: &str = "CIM_RESOURCE_DEFAULT_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "CIM_RESOURCE_MAX_PAGE_SIZE";
pub const ENV_SCHEMA: &str = "CIM_RESOURCE_SCHEMA";

/// Configuration shared by the engine, repository and binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// `tracing` filter directive
    pub log_filter: String,

    /// Page size used when a list query gives none
    pub default_page_size: u32,

    /// Upper bound on any list query's page size
    pub max_page_size: u32,

    /// Resource id prefix → resource type, used to tag new resources
    pub schema: BTreeMap<String, String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            default_page_size: 20,
            max_page_size: 100,
            schema: BTreeMap::new(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_PAGE_SIZE) {
            config.default_page_size = parse_size(ENV_DEFAULT_PAGE_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PAGE_SIZE) {
            config.max_page_size = parse_size(ENV_MAX_PAGE_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SCHEMA) {
            config.schema = parse_schema(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid JSON configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(CoreError::Configuration(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(CoreError::Configuration(format!(
                "default page size {} exceeds maximum {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if let Some((prefix, _)) = self
            .schema
            .iter()
            .find(|(prefix, resource_type)| prefix.is_empty() || resource_type.is_empty())
        {
            return Err(CoreError::Configuration(format!(
                "schema entry for prefix '{}' is incomplete",
                prefix
            )));
        }
        Ok(())
    }
}

fn parse_size(key: &str, raw: &str) -> CoreResult<u32> {
    raw.trim()
        .parse()
        .map_err(|e| CoreError::Configuration(format!("{}={}: {}", key, raw, e)))
}

/// Parse `prefix=Type,prefix=Type`
fn parse_schema(raw: &str) -> CoreResult<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(prefix, resource_type)| {
                    (prefix.trim().to_string(), resource_type.trim().to_string())
                })
                .ok_or_else(|| {
                    CoreError::Configuration(format!("{} entry '{}' is not prefix=Type", ENV_SCHEMA, entry))
                })
        })
        .collect()
}
