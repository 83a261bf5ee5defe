// Copyright (c) 2025 - Cowboy AI, Inc.
//! End-to-end write and read path tests
//!
//! Drives the repository and the boundary adapters the way a transport
//! would: create, conditional update, stale token, read back.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use cim_resource_store::state_machine::WriteStage;
use cim_resource_store::{
    boundary, event_handler_fn, ConcurrencyToken, CoreError, ErrorKind, HandlerError, Resource,
    WriteOutcome,
};
use fixtures::{body, ctx, BLOG_1, BLOG_2, BLOG_3};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_create_update_and_stale_token() {
    let repository = fixtures::repository();

    // create
    let created = repository
        .save(&ctx(), BLOG_1, None, body(json!({"title": "A"})), None)
        .await;
    let response = boundary::write_response(&created);
    assert_eq!(response.status, boundary::CREATED);
    assert_eq!(response.etag.as_deref(), Some("\"/blogs/1.1\""));

    let created = created.unwrap();
    assert_eq!(created.outcome, WriteOutcome::Created);
    assert_eq!(created.sequence_no, 1);
    assert_eq!(created.stage, WriteStage::Projected);

    // update conditioned on the first token
    let token = boundary::if_match(response.etag.as_deref()).unwrap();
    let updated = repository
        .save(&ctx(), BLOG_1, None, body(json!({"title": "B"})), token.as_ref())
        .await;
    let response = boundary::write_response(&updated);
    assert_eq!(response.status, boundary::OK);
    assert_eq!(response.etag.as_deref(), Some("\"/blogs/1.2\""));
    assert_eq!(updated.unwrap().token, ConcurrencyToken::new(BLOG_1, 2));

    // the same token is now stale
    let stale = repository
        .save(&ctx(), BLOG_1, None, body(json!({"title": "C"})), token.as_ref())
        .await;
    assert_eq!(boundary::write_response(&stale).status, boundary::PRECONDITION_FAILED);
    assert_eq!(stale.unwrap_err().kind(), ErrorKind::ConcurrencyConflict);
    assert_eq!(repository.engine().current_sequence(BLOG_1).await.unwrap(), 2);

    // read back what the update wrote
    let read = boundary::read_response(&repository.get(BLOG_1).await);
    assert_eq!(read.status, boundary::OK);
    assert_eq!(read.etag.as_deref(), Some("\"/blogs/1.2\""));
    assert_eq!(read.body, Some(json!({"title": "B"})));
}

#[tokio::test]
async fn test_read_reflects_write_immediately() {
    let repository = fixtures::repository();
    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "Hello", "tags": ["rust"]})))
        .await
        .unwrap();

    let record = repository.engine().get_by_uri(BLOG_1).await.unwrap().unwrap();
    assert_eq!(record.resource_type, "Blog");
    assert_eq!(record.sequence_no, 1);
    assert_eq!(record.body.get("title"), Some(&json!("Hello")));
    assert_eq!(record.user_id.as_deref(), Some(fixtures::USER_ID));
    assert_eq!(record.account_id.as_deref(), Some(fixtures::ACCOUNT_ID));
}

#[tokio::test]
async fn test_token_behind_durable_sequence_writes_nothing() {
    let repository = fixtures::repository();
    for title in ["one", "two", "three"] {
        repository
            .save(&ctx(), BLOG_1, None, body(json!({"title": title})), None)
            .await
            .unwrap();
    }

    let stale = ConcurrencyToken::new(BLOG_1, 2);
    let err = repository
        .update(&ctx(), BLOG_1, body(json!({"title": "four"})), Some(&stale))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::PreconditionFailed { ref resource_id, expected: 2, actual: 3 } if resource_id == BLOG_1
    ));
    assert_eq!(repository.engine().events_for(BLOG_1).await.unwrap().len(), 3);
    let record = repository.get(BLOG_1).await.unwrap().unwrap();
    assert_eq!(record.body.get("title"), Some(&json!("three")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writers_with_same_token() {
    let repository = Arc::new(fixtures::repository());
    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "base"})))
        .await
        .unwrap();
    let token = ConcurrencyToken::new(BLOG_1, 1);

    let writers: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|title| {
            let repository = Arc::clone(&repository);
            let token = token.clone();
            tokio::spawn(async move {
                repository
                    .update(&ctx(), BLOG_1, body(json!({"title": title})), Some(&token))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut conflicted = 0;
    for writer in writers {
        match writer.await.unwrap() {
            Ok(written) => {
                assert_eq!(written.sequence_no, 2);
                succeeded += 1;
            }
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
                conflicted += 1;
            }
        }
    }

    assert_eq!((succeeded, conflicted), (1, 1));
    assert_eq!(repository.engine().current_sequence(BLOG_1).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writers_without_token_both_land() {
    let engine = fixtures::engine_with_events(Arc::new(fixtures::SlowReadEventStore::new(
        Duration::from_millis(5),
    )));
    let repository = Arc::new(fixtures::repository_on(engine));
    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "base"})))
        .await
        .unwrap();

    let writers: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|title| {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move {
                repository
                    .save(&ctx(), BLOG_1, None, body(json!({"title": title})), None)
                    .await
            })
        })
        .collect();

    let mut sequences = Vec::new();
    for writer in writers {
        let written = writer.await.unwrap();
        assert_eq!(boundary::write_response(&written).status, boundary::OK);
        sequences.push(written.unwrap().sequence_no);
    }
    sequences.sort_unstable();

    assert_eq!(sequences, vec![2, 3]);
    assert_eq!(repository.engine().current_sequence(BLOG_1).await.unwrap(), 3);
    assert_eq!(repository.get(BLOG_1).await.unwrap().unwrap().sequence_no, 3);
}

#[tokio::test]
async fn test_token_at_max_sequence_is_precondition_failure() {
    let repository = fixtures::repository();
    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "A"})))
        .await
        .unwrap();

    let token = boundary::if_match(Some("\"/blogs/1.18446744073709551615\"")).unwrap();
    assert_eq!(token, Some(ConcurrencyToken::new(BLOG_1, u64::MAX)));

    let written = repository
        .save(&ctx(), BLOG_1, None, body(json!({"title": "B"})), token.as_ref())
        .await;
    assert_eq!(boundary::write_response(&written).status, boundary::PRECONDITION_FAILED);
    assert_eq!(repository.engine().current_sequence(BLOG_1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_partial_persist_failure_keeps_siblings() {
    let engine = fixtures::engine_with_events(Arc::new(fixtures::RejectingEventStore::new(BLOG_2)));
    let request = ctx();

    let mut resources: Vec<Resource> = [BLOG_1, BLOG_2, BLOG_3]
        .into_iter()
        .map(|id| Resource::create(&request, id, "Blog", body(json!({"title": id}))).unwrap())
        .collect();

    let failures = engine.persist(&request, &mut resources).await;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].resource_id, BLOG_2);
    assert_eq!(failures[0].error.kind(), ErrorKind::Storage);
    assert!(failures[0].error.is_retryable());

    assert!(engine.get_by_uri(BLOG_1).await.unwrap().is_some());
    assert!(engine.get_by_uri(BLOG_2).await.unwrap().is_none());
    assert!(engine.get_by_uri(BLOG_3).await.unwrap().is_some());

    assert!(!resources[0].has_pending_events());
    assert!(resources[1].has_pending_events());
}

#[tokio::test]
async fn test_projection_failure_is_a_warning() {
    let engine = fixtures::engine();
    engine.add_subscriber(
        "update",
        "Blog",
        event_handler_fn("search-index", |_ctx, _event| async move {
            Err(HandlerError::failed("search-index", "index offline"))
        }),
    );
    let repository = fixtures::repository_on(engine);

    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "A"})))
        .await
        .unwrap();
    let updated = repository
        .update(&ctx(), BLOG_1, body(json!({"title": "B"})), None)
        .await
        .unwrap();

    assert_eq!(updated.stage, WriteStage::Projected);
    assert_eq!(updated.warnings.len(), 1);
    assert!(updated.warnings[0].contains("index offline"));

    let record = repository.get(BLOG_1).await.unwrap().unwrap();
    assert_eq!(record.sequence_no, 2);
}

#[tokio::test]
async fn test_delete_then_recreate_continues_sequence() {
    let repository = fixtures::repository();
    repository
        .create(&ctx(), BLOG_1, None, body(json!({"title": "A"})))
        .await
        .unwrap();

    let deleted = repository
        .delete(&ctx(), BLOG_1, Some(&ConcurrencyToken::new(BLOG_1, 1)))
        .await
        .unwrap();
    assert_eq!(deleted.sequence_no, 2);
    assert_eq!(boundary::read_response(&repository.get(BLOG_1).await).status, boundary::NOT_FOUND);

    let again = repository
        .delete(&ctx(), BLOG_1, None)
        .await
        .unwrap_err();
    assert!(matches!(again, CoreError::NotFound(_)));

    let recreated = repository
        .save(&ctx(), BLOG_1, None, body(json!({"title": "A again"})), None)
        .await
        .unwrap();
    assert_eq!(recreated.sequence_no, 3);
    assert_eq!(recreated.outcome, WriteOutcome::Updated);
    assert!(repository.get(BLOG_1).await.unwrap().is_some());
}

#[tokio::test]
async fn test_json_payload_entry_point() {
    let repository = fixtures::repository();

    let written = repository
        .save_json(&ctx(), "/notes/1", br#"{"@type": "Note", "text": "hi"}"#, None)
        .await
        .unwrap();
    assert_eq!(written.outcome, WriteOutcome::Created);
    let record = repository.get("/notes/1").await.unwrap().unwrap();
    assert_eq!(record.resource_type, "Note");

    let rejected = repository.save_json(&ctx(), "/notes/2", b"[1, 2]", None).await;
    assert_eq!(boundary::write_response(&rejected).status, boundary::BAD_REQUEST);
    assert_eq!(repository.engine().current_sequence("/notes/2").await.unwrap(), 0);
}
