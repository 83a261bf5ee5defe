// Copyright (c) 2025 - Cowboy AI, Inc.
//! Concurrency tokens
//!
//! A token has the literal form `<resourceId>.<sequenceNo>` and is carried as
//! an `If-Match` precondition and echoed as an `ETag`. The resource id may
//! itself contain dots, so the sequence number is split off the last one.

use std::fmt;
use std::str::FromStr;

use crate::errors::{CoreError, CoreResult};

/// External encoding of `(resource_id, sequence_no)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken {
    pub resource_id: String,
    pub sequence_no: u64,
}

impl ConcurrencyToken {
    pub fn new(resource_id: impl Into<String>, sequence_no: u64) -> Self {
        Self {
            resource_id: resource_id.into(),
            sequence_no,
        }
    }

    /// Parse an optional header value
    ///
    /// Absent or blank means no concurrency check was requested. Anything
    /// else must parse as `<id>.<integer>`. Surrounding quotes and a weak
    /// validator prefix (`W/`) are accepted.
    pub fn parse_header(value: Option<&str>) -> CoreResult<Option<Self>> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }

    /// Check a freshly assigned sequence number against this token
    ///
    /// The write is accepted only when `assigned == sequence_no + 1` and the
    /// token names the resource being written.
    pub fn check(&self, resource_id: &str, assigned: u64) -> CoreResult<()> {
        let next = self.sequence_no.checked_add(1);
        if self.resource_id != resource_id || next != Some(assigned) {
            return Err(CoreError::PreconditionFailed {
                resource_id: resource_id.to_string(),
                expected: self.sequence_no,
                actual: assigned.saturating_sub(1),
            });
        }
        Ok(())
    }

    /// Quoted form used for the `ETag` header
    pub fn to_etag(&self) -> String {
        format!("\"{}\"", self)
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_id, self.sequence_no)
    }
}

impl FromStr for ConcurrencyToken {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unquoted = s
            .trim()
            .trim_start_matches("W/")
            .trim_matches('"');

        let (resource_id, sequence) = unquoted
            .rsplit_once('.')
            .ok_or_else(|| CoreError::MalformedToken(s.to_string()))?;

        if resource_id.is_empty() {
            return Err(CoreError::MalformedToken(s.to_string()));
        }

        let sequence_no = sequence
            .parse::<u64>()
            .map_err(|_| CoreError::MalformedToken(s.to_string()))?;

        Ok(Self::new(resource_id, sequence_no))
    }
}

/// What a successful write did to the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First recorded event (sequence 1)
    Created,
    /// Any later event
    Updated,
}

impl WriteOutcome {
    pub fn from_sequence(sequence_no: u64) -> Self {
        if sequence_no == 1 {
            WriteOutcome::Created
        } else {
            WriteOutcome::Updated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/blogs/1.1", "/blogs/1", 1 ; "plain path")]
    #[test_case("\"/blogs/1.7\"", "/blogs/1", 7 ; "quoted")]
    #[test_case("W/\"/blogs/1.2\"", "/blogs/1", 2 ; "weak validator")]
    #[test_case("example.com/a.b.12", "example.com/a.b", 12 ; "dots in id")]
    fn test_parse_valid_tokens(raw: &str, id: &str, sequence_no: u64) {
        let token: ConcurrencyToken = raw.parse().unwrap();
        assert_eq!(token, ConcurrencyToken::new(id, sequence_no));
    }

    #[test_case("/blogs/1" ; "missing sequence")]
    #[test_case("/blogs/1.x" ; "non numeric sequence")]
    #[test_case(".3" ; "missing id")]
    #[test_case("/blogs/1.-1" ; "negative sequence")]
    fn test_parse_malformed_tokens(raw: &str) {
        assert!(matches!(
            raw.parse::<ConcurrencyToken>(),
            Err(CoreError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_absent_header_means_no_check() {
        assert_eq!(ConcurrencyToken::parse_header(None).unwrap(), None);
        assert_eq!(ConcurrencyToken::parse_header(Some("  ")).unwrap(), None);
        assert!(ConcurrencyToken::parse_header(Some("garbage")).is_err());
    }

    #[test]
    fn test_check_requires_next_sequence() {
        let token = ConcurrencyToken::new("/blogs/1", 2);
        assert!(token.check("/blogs/1", 3).is_ok());

        match token.check("/blogs/1", 4) {
            Err(CoreError::PreconditionFailed {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected precondition failure, got {:?}", other),
        }

        assert!(token.check("/blogs/2", 3).is_err());
    }

    #[test_case(2, "/blogs/1", 3, true ; "next sequence")]
    #[test_case(2, "/blogs/1", 2, false ; "same sequence")]
    #[test_case(0, "/blogs/1", 1, true ; "first write")]
    #[test_case(u64::MAX, "/blogs/1", 1, false ; "sequence at u64 max")]
    #[test_case(u64::MAX, "/blogs/1", u64::MAX, false ; "assigned at u64 max")]
    fn test_check_table(token_sequence: u64, id: &str, assigned: u64, accepted: bool) {
        let token = ConcurrencyToken::new("/blogs/1", token_sequence);
        let result = token.check(id, assigned);
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(result, Err(CoreError::PreconditionFailed { .. })));
        }
    }

    #[test]
    fn test_display_and_etag() {
        let token = ConcurrencyToken::new("/blogs/1", 2);
        assert_eq!(token.to_string(), "/blogs/1.2");
        assert_eq!(token.to_etag(), "\"/blogs/1.2\"");
    }

    #[test]
    fn test_outcome_from_sequence() {
        assert_eq!(WriteOutcome::from_sequence(1), WriteOutcome::Created);
        assert_eq!(WriteOutcome::from_sequence(2), WriteOutcome::Updated);
    }
}
