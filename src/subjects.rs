// Copyright (c) 2025 - Cowboy AI, Inc.

//! Subscription keys for handler registries
//!
//! Both the command dispatcher and the projection engine key their handler
//! lists by a message type (command type or event type) and a resource type.
//!
//! # Key Tiers
//!
//! ```text
//! create.Blog   exact pair: handlers for "create" on Blog resources
//! create        message type only: resource type left empty
//! *             wildcard: every command
//! ```
//!
//! # Examples
//!
//! ```rust
//! use cim_resource_store::subjects::SubscriptionKey;
//!
//! let key = SubscriptionKey::new("create", "Blog");
//! assert_eq!(key.to_string(), "create.Blog");
//!
//! let generic = SubscriptionKey::any_resource("create");
//! assert_eq!(generic.to_string(), "create");
//! assert!(SubscriptionKey::wildcard().is_wildcard());
//! ```

use std::fmt;

/// Message type matching every command
pub const WILDCARD: &str = "*";

/// Registry key: message type plus resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub message_type: String,

    /// Empty for handlers that match every resource type
    pub resource_type: String,
}

impl SubscriptionKey {
    pub fn new(message_type: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            resource_type: resource_type.into(),
        }
    }

    /// Key for handlers interested in a message type on any resource
    pub fn any_resource(message_type: impl Into<String>) -> Self {
        Self::new(message_type, "")
    }

    /// Key for handlers interested in every message
    pub fn wildcard() -> Self {
        Self::any_resource(WILDCARD)
    }

    pub fn is_wildcard(&self) -> bool {
        self.message_type == WILDCARD
    }

    /// Whether this key ignores the resource type
    pub fn is_global(&self) -> bool {
        self.resource_type.is_empty()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.resource_type.is_empty() {
            write!(f, "{}", self.message_type)
        } else {
            write!(f, "{}.{}", self.message_type, self.resource_type)
        }
    }
}
