use pretty_assertions::assert_eq;
use relsync_storage::{
    Direction, DocumentStore, MemoryStore, RemoteDatabase, ReplicationEvent, ReplicationOptions,
    ReplicationStream, WriteOutcome,
};
use relsync_types::{DocumentChange, RecordDocument};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn doc(value: serde_json::Value) -> RecordDocument {
    RecordDocument::from_value(value).unwrap()
}

async fn next_event(stream: &mut ReplicationStream) -> ReplicationEvent {
    tokio::time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("timed out waiting for replication event")
        .expect("stream closed")
}

/// Skips events until one matches.
async fn wait_for<F>(stream: &mut ReplicationStream, mut pred: F) -> ReplicationEvent
where
    F: FnMut(&ReplicationEvent) -> bool,
{
    loop {
        let event = next_event(stream).await;
        if pred(&event) {
            return event;
        }
    }
}

fn remote_of(store: &MemoryStore) -> Arc<dyn RemoteDatabase> {
    Arc::new(store.clone())
}

// ── One-shot ────────────────────────────────────────────────────

#[tokio::test]
async fn one_shot_push_copies_documents_and_completes() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    local.save("post", doc(json!({"id": "1"}))).await.unwrap();
    local.save("post", doc(json!({"id": "2"}))).await.unwrap();

    let mut stream = local
        .replicate_to(remote_of(&remote), ReplicationOptions::live_retry(false))
        .await
        .unwrap();
    assert_eq!(stream.direction(), Direction::Outbound);

    let event = wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Complete(_))).await;
    let ReplicationEvent::Complete(info) = event else { unreachable!() };
    assert!(info.ok);
    assert!(!info.canceled);
    assert_eq!(info.docs_written, 2);
    assert_eq!(remote.doc_count(), 2);
    assert_eq!(remote.get("post_1"), local.get("post_1"));
}

#[tokio::test]
async fn replicated_revisions_are_preserved_and_not_echoed() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    local.save("post", doc(json!({"id": "1"}))).await.unwrap();

    let mut push = local
        .replicate_to(remote_of(&remote), ReplicationOptions::live_retry(false))
        .await
        .unwrap();
    wait_for(&mut push, |e| matches!(e, ReplicationEvent::Complete(_))).await;

    let mut pull = local
        .replicate_from(remote_of(&remote), ReplicationOptions::live_retry(false))
        .await
        .unwrap();
    let ReplicationEvent::Complete(info) =
        wait_for(&mut pull, |e| matches!(e, ReplicationEvent::Complete(_))).await
    else {
        unreachable!()
    };
    assert_eq!(info.docs_read, 1);
    assert_eq!(info.docs_written, 0);
}

// ── Live ────────────────────────────────────────────────────────

#[tokio::test]
async fn live_pull_delivers_remote_changes_as_batches() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let mut stream = local
        .replicate_from(remote_of(&remote), ReplicationOptions::default())
        .await
        .unwrap();

    assert!(matches!(next_event(&mut stream).await, ReplicationEvent::Active));
    assert!(matches!(next_event(&mut stream).await, ReplicationEvent::Paused(None)));

    remote.save("post", doc(json!({"id": "7", "title": "x"}))).await.unwrap();
    let event = wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Change(_))).await;
    let ReplicationEvent::Change(batch) = event else { unreachable!() };
    assert_eq!(batch.docs.len(), 1);
    assert_eq!(batch.docs[0].id, "post_7");
    assert_eq!(local.get("post_7").unwrap().get("title"), Some(&json!("x")));
}

#[tokio::test]
async fn live_replication_propagates_deletions() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let saved = remote.save("post", doc(json!({"id": "1"}))).await.unwrap();

    let mut stream = local
        .replicate_from(remote_of(&remote), ReplicationOptions::default())
        .await
        .unwrap();
    wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Paused(None))).await;
    assert!(local.get("post_1").is_some());

    remote.delete("post", saved).await.unwrap();
    let event = wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Change(_))).await;
    let ReplicationEvent::Change(batch) = event else { unreachable!() };
    assert!(batch.docs[0].deleted);
    assert!(local.is_deleted("post_1"));
}

#[tokio::test]
async fn cancel_completes_with_canceled_flag() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let mut stream = local
        .replicate_to(remote_of(&remote), ReplicationOptions::default())
        .await
        .unwrap();
    wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Paused(None))).await;

    stream.cancel();
    let event = wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Complete(_))).await;
    let ReplicationEvent::Complete(info) = event else { unreachable!() };
    assert!(info.canceled);
}

// ── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn offline_remote_without_retry_errors_out() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    remote.set_online(false);

    let mut stream = local
        .replicate_from(
            remote_of(&remote),
            ReplicationOptions {
                retry: false,
                ..ReplicationOptions::default()
            },
        )
        .await
        .unwrap();

    match next_event(&mut stream).await {
        ReplicationEvent::Error(err) => assert_eq!(err.name, "offline"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn offline_remote_with_retry_pauses_then_recovers() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    remote.set_online(false);
    remote.save("post", doc(json!({"id": "1"}))).await.unwrap();

    let mut stream = local
        .replicate_from(remote_of(&remote), ReplicationOptions::default())
        .await
        .unwrap();

    match next_event(&mut stream).await {
        ReplicationEvent::Paused(Some(err)) => assert_eq!(err.name, "offline"),
        other => panic!("unexpected event: {other:?}"),
    }

    remote.set_online(true);
    wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Change(_))).await;
    assert!(local.get("post_1").is_some());
}

#[tokio::test]
async fn read_only_target_denies_each_document() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    local.save("post", doc(json!({"id": "1"}))).await.unwrap();
    remote.set_read_only(true);

    let mut stream = local
        .replicate_to(remote_of(&remote), ReplicationOptions::live_retry(false))
        .await
        .unwrap();

    match wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Denied(_))).await {
        ReplicationEvent::Denied(err) => {
            assert_eq!(err.status, Some(403));
            assert!(err.message.starts_with("post_1"));
        }
        _ => unreachable!(),
    }
    let ReplicationEvent::Complete(info) =
        wait_for(&mut stream, |e| matches!(e, ReplicationEvent::Complete(_))).await
    else {
        unreachable!()
    };
    assert_eq!(info.doc_write_failures, 1);
    assert_eq!(remote.doc_count(), 0);
}

// ── apply_revisions ─────────────────────────────────────────────

#[tokio::test]
async fn apply_revisions_skips_older_revisions() {
    let store = MemoryStore::new("remote");
    let saved = store.save("post", doc(json!({"id": "1"}))).await.unwrap();
    let updated = store.save("post", saved.clone()).await.unwrap();

    let stale = DocumentChange {
        rev: saved.rev().map(str::to_string),
        doc: Some(saved),
        ..DocumentChange::upsert("post_1")
    };
    let outcomes = store.apply_revisions(vec![stale]).await.unwrap();
    assert_eq!(outcomes, vec![WriteOutcome::Skipped]);
    assert_eq!(store.get("post_1"), Some(updated));
}
