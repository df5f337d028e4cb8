//! End-to-end tests of the idempotency protocol over the in-memory
//! collaborators: lock, read, execute, write, replayed verbatim.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use futures::future::join_all;
use idempotent_request_core::coordinator::{ReadOutcome, RequestCoordinator};
use idempotent_request_core::key::IdempotencyKey;
use idempotent_request_core::record::{CapturedResponse, Headers, ResponseBody, StoredRecord};
use idempotent_request_testing::{
    init_tracing, CountingOperation, InMemoryStorage, RecordingNotifier,
};
use std::sync::Arc;

fn json_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

/// Drive one request through the full protocol the way a transport adapter
/// would: lock, check for a prior result, run the operation only on a miss,
/// record the outcome.
async fn submit(
    coordinator: &RequestCoordinator,
    key: &str,
    payload: &[u8],
    operation: &CountingOperation,
) -> CapturedResponse {
    let key = IdempotencyKey::new(key);
    // A held lock with a committed record still replays below; a held lock
    // without one means the first attempt is in flight, which these tests
    // never exercise concurrently with a miss.
    let _acquired = coordinator.lock(key.clone()).await.expect("lock");

    match coordinator.read(key.clone(), payload).await.expect("read") {
        ReadOutcome::Cached(response) | ReadOutcome::Conflict(response) => return response,
        ReadOutcome::NoRecord => {}
    }

    let (status, headers, body) = operation.run();
    coordinator
        .write(key, status, headers, body, payload)
        .await
        .expect("write")
}

#[tokio::test]
async fn first_write_wins() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let coordinator = RequestCoordinator::new(storage);
    let operation = CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Whole(b"first".to_vec()),
    );

    let first = submit(&coordinator, "key-1", b"payload", &operation).await;

    // A second operation configured differently must never be consulted:
    // the replay comes from storage, byte-identical to the first response.
    let drifted = CountingOperation::new(
        200,
        Headers::new(),
        ResponseBody::Whole(b"second".to_vec()),
    );
    let second = submit(&coordinator, "key-1", b"payload", &drifted).await;

    assert_eq!(first, second);
    assert_eq!(first.body, vec![b"first".to_vec()]);
    assert_eq!(operation.calls(), 1);
    assert_eq!(drifted.calls(), 0);
}

#[tokio::test]
async fn conflict_detection_never_replays_the_record() {
    init_tracing();
    let coordinator = RequestCoordinator::new(Arc::new(InMemoryStorage::new()));
    let operation = CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Whole(b"ok".to_vec()),
    );

    submit(&coordinator, "key-1", br#"{"amount":10}"#, &operation).await;

    let outcome = coordinator
        .read(IdempotencyKey::new("key-1"), br#"{"amount":20}"#)
        .await
        .expect("read");

    assert!(matches!(outcome, ReadOutcome::Conflict(_)));
}

#[tokio::test]
async fn failure_releases_the_lock() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let coordinator = RequestCoordinator::new(storage.clone());
    let operation = CountingOperation::new(
        503,
        Headers::new(),
        ResponseBody::Whole(b"unavailable".to_vec()),
    );

    let response = submit(&coordinator, "key-1", b"payload", &operation).await;
    assert_eq!(response.status, 503);

    // No record, no lock leak: the key is fully retryable.
    assert!(!storage.is_locked("key-1").await);
    assert!(coordinator
        .lock(IdempotencyKey::new("key-1"))
        .await
        .expect("lock"));

    // And a retry that succeeds commits normally.
    let retry = CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Whole(b"ok".to_vec()),
    );
    let response = submit(&coordinator, "key-1", b"payload", &retry).await;
    assert_eq!(response.status, 200);
    assert_eq!(retry.calls(), 1);
}

#[tokio::test]
async fn success_never_double_invokes_the_operation() {
    init_tracing();
    let coordinator = RequestCoordinator::new(Arc::new(InMemoryStorage::new()));
    let operation = CountingOperation::new(
        201,
        json_headers(),
        ResponseBody::Whole(b"created".to_vec()),
    );

    let first = submit(&coordinator, "key-1", b"payload", &operation).await;
    let second = submit(&coordinator, "key-1", b"payload", &operation).await;
    let third = submit(&coordinator, "key-1", b"payload", &operation).await;

    assert_eq!(operation.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[tokio::test]
async fn replayed_submissions_share_one_coordinator_across_tasks() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let coordinator = Arc::new(RequestCoordinator::new(storage));
    let operation = Arc::new(CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Whole(b"ok".to_vec()),
    ));

    // Commit once, then replay from many tasks at once.
    submit(&coordinator, "key-1", b"payload", &operation).await;

    let replays = (0..8).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        let operation = Arc::clone(&operation);
        tokio::spawn(async move {
            submit(&coordinator, "key-1", b"payload", &operation).await
        })
    });

    for response in join_all(replays).await {
        let response = response.expect("task");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, vec![b"ok".to_vec()]);
    }
    assert_eq!(operation.calls(), 1);
}

#[tokio::test]
async fn stored_bytes_decode_to_what_was_written() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let coordinator = RequestCoordinator::new(storage.clone());
    let operation = CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Chunks(vec![
            b"chunk-one".to_vec(),
            b"chunk-two".to_vec(),
        ]),
    );

    submit(&coordinator, "key-1", b"raw payload bytes", &operation).await;

    let raw = storage.raw_record("key-1").await.expect("record stored");
    let record = StoredRecord::decode(&raw).expect("record decodes");

    assert_eq!(record.status, 200);
    assert_eq!(record.headers, json_headers());
    assert_eq!(
        record.response,
        vec![b"chunk-one".to_vec(), b"chunk-two".to_vec()]
    );
    assert_eq!(record.post_data, b"raw payload bytes".to_vec());
}

#[tokio::test]
async fn malformed_record_surfaces_an_error() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    storage.seed_raw("key-1", b"{\"status\":true}".to_vec()).await;
    let coordinator = RequestCoordinator::new(storage);

    let result = coordinator.read(IdempotencyKey::new("key-1"), b"{}").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn end_to_end_payment_scenario() {
    init_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = RequestCoordinator::new(storage).with_notifier(notifier.clone());
    let operation = CountingOperation::new(
        200,
        json_headers(),
        ResponseBody::Chunks(vec![b"ok".to_vec()]),
    );

    // First submission executes the operation and persists its response.
    let first = submit(&coordinator, "abc", br#"{"amount":10}"#, &operation).await;
    assert_eq!(first, operation.expected_response());
    assert_eq!(first.status, 200);
    assert_eq!(first.body, vec![b"ok".to_vec()]);
    assert_eq!(operation.calls(), 1);
    assert_eq!(notifier.detection_count(), 0);

    // Identical retry replays the stored response; the operation stays at
    // one invocation and the replay is reported.
    let second = submit(&coordinator, "abc", br#"{"amount":10}"#, &operation).await;
    assert_eq!(second, first);
    assert_eq!(operation.calls(), 1);
    assert_eq!(notifier.detection_count(), 1);

    // Same key, different body: the fixed conflict response, verbatim.
    let conflict = submit(&coordinator, "abc", br#"{"amount":20}"#, &operation).await;
    assert_eq!(conflict.status, 400);
    assert_eq!(
        conflict.headers.get("Content-Type").map(String::as_str),
        Some("application/json; charset=utf-8")
    );
    let body: serde_json::Value =
        serde_json::from_slice(&conflict.body[0]).expect("conflict body is JSON");
    assert_eq!(
        body,
        serde_json::json!({
            "error": "Request inconsistent with the supplied idempotent key",
        })
    );
    assert_eq!(operation.calls(), 1);
    assert_eq!(notifier.detection_count(), 2);
}
