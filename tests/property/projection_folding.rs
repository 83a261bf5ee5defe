// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Projection Folding
//!
//! The live read model, a fold over the stored events and a full replay
//! must all agree, whatever mix of updates and deletes produced them.

use cim_resource_store::projection::fold_projection;
use proptest::prelude::*;
use serde_json::json;

use crate::fixtures::{body, ctx, repository, BLOG_1};

#[derive(Debug, Clone)]
enum Write {
    Save(u32),
    Delete,
}

fn writes() -> impl Strategy<Value = Vec<Write>> {
    prop::collection::vec(
        prop_oneof![
            4 => any::<u32>().prop_map(Write::Save),
            1 => Just(Write::Delete),
        ],
        1..20,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_live_fold_and_replay_agree(writes in writes()) {
        tokio_test::block_on(async {
            let repository = repository();
            let engine = repository.engine();

            for write in &writes {
                match write {
                    Write::Save(n) => {
                        repository
                            .save(&ctx(), BLOG_1, None, body(json!({"n": n})), None)
                            .await
                            .unwrap();
                    }
                    // deleting an absent resource is rejected and leaves no event
                    Write::Delete => {
                        let _ = repository.delete(&ctx(), BLOG_1, None).await;
                    }
                }
            }

            let live = engine.get_by_uri(BLOG_1).await.unwrap();

            let events = engine.events_for(BLOG_1).await.unwrap();
            let decoded: Vec<_> = events
                .iter()
                .map(|event| (event, engine.decode(event).unwrap()))
                .collect();
            let folded = fold_projection(decoded);

            engine.replay(&ctx(), None).await.unwrap();
            let replayed = engine.get_by_uri(BLOG_1).await.unwrap();

            let summary = |record: &Option<cim_resource_store::ProjectionRecord>| {
                record.as_ref().map(|r| (r.sequence_no, r.body.clone()))
            };
            prop_assert_eq!(summary(&live), summary(&folded));
            prop_assert_eq!(summary(&live), summary(&replayed));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
