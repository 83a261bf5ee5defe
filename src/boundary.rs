// Copyright (c) 2025 - Cowboy AI, Inc.
//! Boundary adapters
//!
//! Translation between an HTTP-style transport and the core: `If-Match` and
//! `ETag` headers to and from concurrency tokens, core results to status
//! codes, query strings to [`ListQuery`], and credentials to a
//! [`RequestContext`] via the identity and policy collaborators.
//!
//! # Status Mapping
//!
//! ```text
//! Created              201      Client error         400
//! Updated / read       200      Unauthorized         401
//! Not found            404      Forbidden            403
//! Already exists       409      Precondition failed  412
//! Handler failure      500      Storage failure      503
//! ```

use serde_json::Value;
use tracing::{debug, warn};

use crate::concurrency::{ConcurrencyToken, WriteOutcome};
use crate::context::RequestContext;
use crate::errors::{CoreError, CoreResult, ErrorKind};
use crate::identity::{IdentityValidator, PolicyEnforcer};
use crate::projection::ProjectionRecord;
use crate::query::{decode_pairs, parse_filters, parse_sorts, ListQuery};
use crate::repository::WriteResult;

pub const OK: u16 = 200;
pub const CREATED: u16 = 201;
pub const BAD_REQUEST: u16 = 400;
pub const UNAUTHORIZED: u16 = 401;
pub const FORBIDDEN: u16 = 403;
pub const NOT_FOUND: u16 = 404;
pub const REQUEST_TIMEOUT: u16 = 408;
pub const CONFLICT: u16 = 409;
pub const PRECONDITION_FAILED: u16 = 412;
pub const INTERNAL_SERVER_ERROR: u16 = 500;
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Option<Value>,
}

/// Parse an `If-Match` header into an optional concurrency token
pub fn if_match(header: Option<&str>) -> CoreResult<Option<ConcurrencyToken>> {
    ConcurrencyToken::parse_header(header)
}

pub fn write_status(outcome: WriteOutcome) -> u16 {
    match outcome {
        WriteOutcome::Created => CREATED,
        WriteOutcome::Updated => OK,
    }
}

pub fn error_status(err: &CoreError) -> u16 {
    match err {
        CoreError::NotFound(_) => NOT_FOUND,
        CoreError::AlreadyExists(_) => CONFLICT,
        other => match other.kind() {
            ErrorKind::Client => BAD_REQUEST,
            ErrorKind::ConcurrencyConflict => PRECONDITION_FAILED,
            ErrorKind::Handler | ErrorKind::Configuration => INTERNAL_SERVER_ERROR,
            ErrorKind::Storage => SERVICE_UNAVAILABLE,
            ErrorKind::Unauthorized => UNAUTHORIZED,
            ErrorKind::Forbidden => FORBIDDEN,
            ErrorKind::Cancelled => REQUEST_TIMEOUT,
        },
    }
}

/// Response for a write: creation or update status plus the new `ETag`
pub fn write_response(result: &CoreResult<WriteResult>) -> BoundaryResponse {
    match result {
        Ok(written) => BoundaryResponse {
            status: write_status(written.outcome),
            etag: Some(written.token.to_etag()),
            body: None,
        },
        Err(err) => error_response(err),
    }
}

/// Response for a single-resource read; absence is a 404, not an error
pub fn read_response(result: &CoreResult<Option<ProjectionRecord>>) -> BoundaryResponse {
    match result {
        Ok(Some(record)) => BoundaryResponse {
            status: OK,
            etag: Some(record.token().to_etag()),
            body: Some(Value::Object(record.body.clone())),
        },
        Ok(None) => BoundaryResponse {
            status: NOT_FOUND,
            etag: None,
            body: None,
        },
        Err(err) => error_response(err),
    }
}

pub fn error_response(err: &CoreError) -> BoundaryResponse {
    let status = error_status(err);
    if status >= INTERNAL_SERVER_ERROR {
        warn!(status, error = %err, "Request failed");
    } else {
        debug!(status, error = %err, "Request rejected");
    }
    BoundaryResponse {
        status,
        etag: None,
        body: Some(serde_json::json!({ "error": err.to_string() })),
    }
}

/// Build a list query from `page`, `limit`, `query`, `_filters[...]` and `_sorts[...]`
pub fn list_query(resource_type: &str, query_string: &str) -> CoreResult<ListQuery> {
    let mut query = ListQuery::new(resource_type);

    for (key, value) in decode_pairs(query_string)? {
        match key.as_str() {
            "page" => query.page = parse_number("page", &value)?,
            "limit" => query.limit = parse_number("limit", &value)?,
            "query" | "q" if !value.trim().is_empty() => query.query = Some(value),
            _ => {}
        }
    }
    query.filters = parse_filters(query_string)?;
    query.sorts = parse_sorts(query_string)?;
    Ok(query)
}

fn parse_number(name: &str, raw: &str) -> CoreResult<u32> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::InvalidPayload(format!("{} must be a non-negative integer, got '{}'", name, raw)))
}

/// Establish identity and check policy before the core is invoked
///
/// # Errors
///
/// - `Unauthorized` when the validator rejects the credential or the
///   identity carries no subject
/// - `Forbidden` when the policy denies `action` on `resource_path`
pub async fn authorize(
    validator: &dyn IdentityValidator,
    enforcer: &dyn PolicyEnforcer,
    credential: &str,
    resource_path: &str,
    action: &str,
) -> CoreResult<RequestContext> {
    let identity = validator.validate(credential).await.map_err(|err| match err {
        CoreError::Unauthorized(_) => err,
        other => CoreError::Unauthorized(other.to_string()),
    })?;

    if !identity.valid {
        return Err(CoreError::Unauthorized("credential rejected".to_string()));
    }
    let subject = identity
        .subject()
        .ok_or_else(|| CoreError::Unauthorized("identity has no subject".to_string()))?;

    if !enforcer.enforce(subject, resource_path, action) {
        return Err(CoreError::Forbidden(format!(
            "{} may not {} {}",
            subject, action, resource_path
        )));
    }

    debug!(subject = %subject, resource_path = %resource_path, action = %action, "Request authorized");
    Ok(RequestContext::new(identity))
}
