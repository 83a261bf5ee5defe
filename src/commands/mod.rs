// Copyright (c) 2025 - Cowboy AI, Inc.
//! Commands
//!
//! A [`Command`] is a request to perform a business action outside the
//! direct "replace the whole resource" path. Commands express intent and can
//! be rejected; the events they lead to are facts.
//!
//! The metadata carries the expected prior sequence number when a handler
//! must apply optimistic concurrency.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concurrency::ConcurrencyToken;
use crate::context::RequestContext;
use crate::errors::{CoreError, CoreResult};

/// Well-known command type for creating a resource
pub const CREATE: &str = "create";
/// Well-known command type for updating a resource
pub const UPDATE: &str = "update";
/// Well-known command type for deleting a resource
pub const DELETE: &str = "delete";

/// Routing and concurrency metadata of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    pub entity_id: Option<String>,
    pub entity_type: String,

    /// Expected prior sequence number of the entity
    pub sequence_no: Option<u64>,

    /// Payload schema version
    pub version: u32,

    pub execution_date: DateTime<Utc>,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
}

/// Request to change state, routed to handlers by type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub command_type: String,

    /// Handler-specific payload
    pub payload: Vec<u8>,

    pub metadata: CommandMetadata,
}

impl Command {
    pub fn new(
        command_type: impl Into<String>,
        entity_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            command_type: command_type.into(),
            payload,
            metadata: CommandMetadata {
                entity_id: None,
                entity_type: entity_type.into(),
                sequence_no: None,
                version: 1,
                execution_date: Utc::now(),
                user_id: None,
                account_id: None,
            },
        }
    }

    /// Command whose payload is the JSON encoding of `payload`
    pub fn json<T: Serialize>(
        command_type: impl Into<String>,
        entity_type: impl Into<String>,
        payload: &T,
    ) -> CoreResult<Self> {
        Ok(Self::new(command_type, entity_type, serde_json::to_vec(payload)?))
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.metadata.entity_id = Some(entity_id.into());
        self
    }

    /// Require the entity to still be at `sequence_no` when the command applies
    pub fn with_expected_sequence(mut self, sequence_no: u64) -> Self {
        self.metadata.sequence_no = Some(sequence_no);
        self
    }

    /// Copy caller identity from the request context
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.metadata.user_id = ctx.user_id().map(str::to_string);
        self.metadata.account_id = ctx.account_id().map(str::to_string);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.metadata.entity_type
    }

    /// Decode the payload as JSON
    pub fn decode_payload<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            CoreError::InvalidCommand(format!(
                "payload of {} command is not valid: {}",
                self.command_type, e
            ))
        })
    }

    /// Concurrency token implied by the metadata, if both parts are present
    pub fn expected_token(&self) -> Option<ConcurrencyToken> {
        match (&self.metadata.entity_id, self.metadata.sequence_no) {
            (Some(id), Some(sequence_no)) => Some(ConcurrencyToken::new(id.clone(), sequence_no)),
            _ => None,
        }
    }

    /// Routing fields every dispatchable command must carry
    pub fn validate(&self) -> CoreResult<()> {
        if self.command_type.trim().is_empty() {
            return Err(CoreError::InvalidCommand(
                "command type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Publish {
        title: String,
    }

    #[test]
    fn test_json_payload_round_trips() {
        let command = Command::json(
            "publish",
            "Blog",
            &Publish {
                title: "A".to_string(),
            },
        )
        .unwrap();

        let decoded: Publish = command.decode_payload().unwrap();
        assert_eq!(decoded.title, "A");
        assert_eq!(command.entity_type(), "Blog");
    }

    #[test]
    fn test_bad_payload_is_invalid_command() {
        let command = Command::new("publish", "Blog", b"not json".to_vec());
        let result: CoreResult<Publish> = command.decode_payload();
        assert!(matches!(result, Err(CoreError::InvalidCommand(_))));
    }

    #[test]
    fn test_expected_token_requires_id_and_sequence() {
        let command = Command::new(UPDATE, "Blog", Vec::new()).with_entity_id("/blogs/1");
        assert!(command.expected_token().is_none());

        let command = command.with_expected_sequence(2);
        assert_eq!(
            command.expected_token(),
            Some(ConcurrencyToken::new("/blogs/1", 2))
        );
    }

    #[test]
    fn test_with_context_copies_identity() {
        let ctx = RequestContext::new(Identity::user("alice").with_account("acme"));
        let command = Command::new(CREATE, "Blog", Vec::new()).with_context(&ctx);

        assert_eq!(command.metadata.user_id.as_deref(), Some("alice"));
        assert_eq!(command.metadata.account_id.as_deref(), Some("acme"));
        assert!(Command::new(" ", "Blog", Vec::new()).validate().is_err());
    }
}
