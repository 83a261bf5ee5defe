// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity and policy collaborators
//!
//! The core never validates identity tokens or evaluates policies itself. It
//! consumes these two interfaces at the boundary and keeps the resulting
//! identity as event and command metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreResult;

/// Result of validating an inbound request's credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub valid: bool,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub account_id: Option<String>,
    pub application_id: Option<String>,
}

impl Identity {
    /// A valid identity for the given user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Policy subject: the role when present, otherwise the user id
    pub fn subject(&self) -> Option<&str> {
        self.role.as_deref().or(self.user_id.as_deref())
    }
}

/// Validates the credentials carried by an inbound request
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Validate a bearer credential
    ///
    /// Returns an identity with `valid == false` or an error when the
    /// credential is rejected.
    async fn validate(&self, credential: &str) -> CoreResult<Identity>;
}

/// Decides whether a subject may perform an action on a resource path
pub trait PolicyEnforcer: Send + Sync {
    fn enforce(&self, subject: &str, resource_path: &str, action: &str) -> bool;
}
