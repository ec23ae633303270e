use std::time::Duration;

use chrono::Utc;
use orbit_store::{EventDirection, EventStore, ExportFormat, NewEvent, ReadOptions, ReadOrder};
use serde_json::json;

fn sample_event(thread_id: &str, text: &str) -> NewEvent {
    NewEvent {
        thread_id: thread_id.to_string(),
        turn_id: Some("turn-1".to_string()),
        direction: EventDirection::Outbound,
        role: "agent".to_string(),
        method: Some("session/update".to_string()),
        payload: json!({ "text": text }),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn append_then_read_round_trips_in_arrival_order() {
    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "first")).await.unwrap();
    store.append(sample_event("t1", "second")).await.unwrap();

    let events = store.read("t1", ReadOptions::default()).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].payload["text"], "first");
    assert_eq!(events[1].payload["text"], "second");
    assert!(events[0].seq < events[1].seq);
}

#[tokio::test]
async fn read_descending_reverses_order() {
    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "first")).await.unwrap();
    store.append(sample_event("t1", "second")).await.unwrap();

    let events = store.read("t1", ReadOptions { limit: None, order: ReadOrder::Descending }).await.unwrap();
    assert_eq!(events[0].payload["text"], "second");
    assert_eq!(events[1].payload["text"], "first");
}

#[tokio::test]
async fn read_is_scoped_to_its_thread() {
    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "mine")).await.unwrap();
    store.append(sample_event("t2", "not mine")).await.unwrap();

    let events = store.read("t1", ReadOptions::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["text"], "mine");
}

#[tokio::test]
async fn search_finds_text_via_fts() {
    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "the quick brown fox")).await.unwrap();
    store.append(sample_event("t1", "a slow red turtle")).await.unwrap();

    let hits = store.search("t1", "quick").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["text"], "the quick brown fox");
}

#[tokio::test]
async fn export_json_streams_one_line_per_event() {
    use futures::StreamExt;

    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "first")).await.unwrap();
    store.append(sample_event("t1", "second")).await.unwrap();

    let chunks: Vec<_> = store.export("t1", ExportFormat::Json).await.unwrap().collect().await;
    assert_eq!(chunks.len(), 2);
    for chunk in &chunks {
        let line = chunk.as_ref().unwrap();
        assert!(line.ends_with('\n'));
        serde_json::from_str::<serde_json::Value>(line).expect("each line is valid json");
    }
}

#[tokio::test]
async fn import_creates_new_thread_id_and_preserves_order() {
    let store = EventStore::connect_memory().await.unwrap();
    let events = vec![sample_event("ignored", "first"), sample_event("ignored", "second")];

    let new_thread_id = store.import(events).await.unwrap();
    assert_ne!(new_thread_id, "ignored");

    let replayed = store.read(&new_thread_id, ReadOptions::default()).await.unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].payload["text"], "first");
    assert_eq!(replayed[1].payload["text"], "second");
}

#[tokio::test]
async fn prune_deletes_only_rows_older_than_retention() {
    let store = EventStore::connect_memory().await.unwrap();
    let mut stale = sample_event("t1", "stale");
    stale.created_at = Utc::now() - chrono::Duration::days(30);
    store.append(stale).await.unwrap();
    store.append(sample_event("t1", "fresh")).await.unwrap();

    let deleted = store.prune(Duration::from_secs(7 * 24 * 3600)).await.unwrap();
    assert_eq!(deleted, 1);

    let remaining = store.read("t1", ReadOptions::default()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload["text"], "fresh");
}

#[tokio::test]
async fn set_archived_is_idempotent_upsert() {
    let store = EventStore::connect_memory().await.unwrap();
    store.set_archived("t1", true).await.unwrap();
    store.set_archived("t1", true).await.unwrap();
    store.set_archived("t1", false).await.unwrap();

    let row: (i64,) = sqlx::query_as("SELECT archived FROM thread_metadata WHERE thread_id = ?")
        .bind("t1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(row.0, 0);
}

#[tokio::test]
async fn stored_event_serializes_with_spec_wire_keys() {
    let store = EventStore::connect_memory().await.unwrap();
    store.append(sample_event("t1", "hello")).await.unwrap();

    let events = store.read("t1", ReadOptions::default()).await.unwrap();
    let wire = serde_json::to_value(&events[0]).unwrap();

    assert!(wire.get("id").is_some(), "seq must be renamed to id");
    assert!(wire.get("seq").is_none());
    assert_eq!(wire["threadId"], "t1");
    assert_eq!(wire["turnId"], "turn-1");
    assert_eq!(wire["direction"], "server");
    assert!(wire.get("createdAtSeconds").is_some());
    assert!(wire.get("created_at").is_none());
}

#[tokio::test]
async fn reconnecting_to_the_same_file_does_not_reapply_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");

    let first = EventStore::connect(&path).await.unwrap();
    first.append(sample_event("t1", "persisted")).await.unwrap();
    drop(first);

    let second = EventStore::connect(&path).await.unwrap();
    let events = second.read("t1", ReadOptions::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["text"], "persisted");
}
