// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Sequence Numbers and Tokens
//!
//! Any run of writes to one resource yields a gapless stream numbered from
//! 1, and a token is honoured only when it names the durable sequence.

use cim_resource_store::{ConcurrencyToken, ErrorKind};
use proptest::prelude::*;
use serde_json::json;

use crate::fixtures::{body, ctx, repository, BLOG_1};

fn titles() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,12}", 1..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Sequence numbers are contiguous from 1 and match the write count
    #[test]
    fn prop_sequence_numbers_are_gapless(titles in titles()) {
        tokio_test::block_on(async {
            let repository = repository();

            for (index, title) in titles.iter().enumerate() {
                let written = repository
                    .save(&ctx(), BLOG_1, None, body(json!({"title": title})), None)
                    .await
                    .unwrap();
                prop_assert_eq!(written.sequence_no, index as u64 + 1);
                prop_assert_eq!(written.token, ConcurrencyToken::new(BLOG_1, index as u64 + 1));
            }

            let events = repository.engine().events_for(BLOG_1).await.unwrap();
            let numbers: Vec<u64> = events.iter().map(|event| event.sequence_no()).collect();
            let expected: Vec<u64> = (1..=titles.len() as u64).collect();
            prop_assert_eq!(numbers, expected);

            let record = repository.get(BLOG_1).await.unwrap().unwrap();
            prop_assert_eq!(record.sequence_no, titles.len() as u64);
            prop_assert_eq!(
                record.body.get("title").and_then(|title| title.as_str()),
                titles.last().map(String::as_str)
            );
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Only the current token is accepted; a rejected write appends nothing
    #[test]
    fn prop_only_current_token_is_accepted(writes in 1u64..10, offered in 0u64..12) {
        tokio_test::block_on(async {
            let repository = repository();
            for n in 0..writes {
                repository
                    .save(&ctx(), BLOG_1, None, body(json!({"n": n})), None)
                    .await
                    .unwrap();
            }

            let token = ConcurrencyToken::new(BLOG_1, offered);
            let result = repository
                .update(&ctx(), BLOG_1, body(json!({"n": "last"})), Some(&token))
                .await;
            let durable = repository.engine().current_sequence(BLOG_1).await.unwrap();

            if offered == writes {
                prop_assert!(result.is_ok());
                prop_assert_eq!(durable, writes + 1);
            } else {
                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrencyConflict);
                prop_assert_eq!(durable, writes);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
