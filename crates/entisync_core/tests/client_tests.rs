//! Client lifecycle, repository registry, namespaces and metadata.

use entisync_codec::Value;
use entisync_core::{Client, ClientConfig, CoreError, MetaValue, RecordMapper};
use entisync_storage::MemoryStorage;
use entisync_testkit::prelude::*;
use futures::StreamExt;
use std::sync::Arc;

#[tokio::test]
async fn repository_names_are_unique() {
    let fixture = TestClient::memory().await;

    let err = fixture
        .client
        .repository(NOTES, RecordMapper::<Note>::serde())
        .unwrap_err();
    assert!(err.is_validation());

    assert!(fixture
        .client
        .repository("", RecordMapper::<Note>::serde())
        .unwrap_err()
        .is_validation());

    fixture
        .client
        .repository("archive", RecordMapper::<Note>::serde())
        .unwrap();
    assert_eq!(fixture.client.repository_names(), vec!["archive", NOTES]);
}

#[tokio::test]
async fn open_switches_to_configured_namespace() {
    let client = Client::open(
        Arc::new(MemoryStorage::new()),
        ClientConfig::new().with_namespace("tenant-a"),
    )
    .await
    .unwrap();

    assert_eq!(client.namespace(), "tenant-a");
    assert!(client.is_open());
}

#[tokio::test]
async fn namespaces_isolate_data() {
    let fixture = TestClient::memory().await;
    let notes = fixture.notes();
    notes.upsert(&Note::new("1", "default"), false).await.unwrap();
    fixture.client.set_meta("cursor", 7i64).await.unwrap();

    fixture.client.switch_namespace("tenant-b").await.unwrap();
    assert_eq!(notes.count().await.unwrap(), 0);
    assert!(fixture.client.get_meta("cursor").await.unwrap().is_none());
    notes.upsert(&Note::new("2", "tenant"), false).await.unwrap();

    fixture.client.switch_namespace("default").await.unwrap();
    let ids: Vec<String> = notes.get_all().await.unwrap().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["1"]);
    assert_eq!(
        fixture.client.get_meta("cursor").await.unwrap(),
        Some(MetaValue::Int(7))
    );
}

#[tokio::test]
async fn namespace_switch_re_emits_watches() {
    let fixture = TestClient::memory().await;
    let notes = fixture.notes();
    notes.upsert(&Note::new("1", "default"), false).await.unwrap();

    let mut stream = notes.watch(notes.query()).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);

    fixture.client.switch_namespace("empty").await.unwrap();
    assert!(stream.next().await.unwrap().unwrap().is_empty());

    fixture.client.switch_namespace("default").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_namespace_is_rejected() {
    let fixture = TestClient::memory().await;
    assert!(fixture.client.switch_namespace("").await.is_err());
    assert_eq!(fixture.client.namespace(), "default");
}

#[tokio::test]
async fn metadata_round_trip() {
    let fixture = TestClient::memory().await;
    let client = &fixture.client;

    client.set_meta("enabled", true).await.unwrap();
    client.set_meta("ratio", 0.5).await.unwrap();
    client.set_meta("server", "https://sync.example").await.unwrap();
    client
        .set_meta("tags", vec!["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    assert_eq!(client.get_meta("enabled").await.unwrap(), Some(MetaValue::Bool(true)));
    assert_eq!(client.get_meta("ratio").await.unwrap(), Some(MetaValue::Double(0.5)));
    assert_eq!(
        client.get_meta("tags").await.unwrap(),
        Some(MetaValue::TextList(vec!["a".to_string(), "b".to_string()]))
    );

    assert!(client.remove_meta("server").await.unwrap());
    assert!(!client.remove_meta("server").await.unwrap());
    assert!(client.get_meta("server").await.unwrap().is_none());
}

#[tokio::test]
async fn unsupported_metadata_is_a_validation_error() {
    let fixture = TestClient::memory().await;
    let client = &fixture.client;

    client
        .set_meta_value("count", Value::Integer(3))
        .await
        .unwrap();
    assert_eq!(client.get_meta("count").await.unwrap(), Some(MetaValue::Int(3)));

    let map = Value::map([("nested", Value::Bool(true))]);
    assert!(client.set_meta_value("bad", map).await.unwrap_err().is_validation());

    let mixed = Value::Array(vec![Value::from("a"), Value::Integer(1)]);
    assert!(client.set_meta_value("bad", mixed).await.unwrap_err().is_validation());
    assert!(client.get_meta("bad").await.unwrap().is_none());
}

#[tokio::test]
async fn close_ends_streams_and_rejects_use() {
    let fixture = TestClient::memory().await;
    let notes = fixture.notes();
    let mut stream = notes.watch(notes.query()).unwrap();
    stream.next().await.unwrap().unwrap();

    fixture.client.close().await.unwrap();
    assert!(stream.next().await.is_none());
    assert!(!fixture.client.is_open());

    // closing twice is harmless
    fixture.client.close().await.unwrap();

    assert!(matches!(
        fixture.client.repository("late", RecordMapper::<Note>::serde()),
        Err(CoreError::Closed)
    ));
    assert!(matches!(
        fixture.client.get_meta("x").await,
        Err(CoreError::Closed)
    ));
    assert!(matches!(
        notes.upsert(&Note::new("1", "late"), true).await,
        Err(CoreError::Storage(_))
    ));
}

#[tokio::test]
async fn close_after_unread_change_completes_stream() {
    let fixture = TestClient::memory().await;
    let notes = fixture.notes();
    let mut stream = notes.watch(notes.query()).unwrap();
    assert!(stream.next().await.unwrap().unwrap().is_empty());

    notes.upsert(&Note::new("1", "unseen"), false).await.unwrap();
    fixture.client.close().await.unwrap();

    assert!(stream.next().await.is_none());
}
