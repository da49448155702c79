//! End-to-end tests: reader and writer against a mocked engine over HTTP.

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

use e2e_tests::{hit, source_settings, EngineHarness, STEP_TIMEOUT};
use esbridge_client::encoder_for;
use esbridge_destination::{DestinationError, Writer};
use esbridge_source::{Reader, SourceError};
use esbridge_types::{ChangeRecord, DestinationSettings, EngineVersion, SortOrder};

async fn read_n(reader: &Reader, n: usize) -> Vec<ChangeRecord> {
    let mut records = Vec::with_capacity(n);
    for _ in 0..n {
        let record = timeout(STEP_TIMEOUT, reader.read_next())
            .await
            .expect("Timed out waiting for a record")
            .expect("Failed to read record");
        records.push(record);
    }
    records
}

/// Documents read from one index are written back, in order, routed by
/// their collection metadata.
#[tokio::test]
async fn test_read_then_write() {
    let engine = EngineHarness::start(EngineVersion::V8).await;
    engine
        .mount_page(
            "orders",
            None,
            vec![
                hit("orders", "o-1", json!({"total": 10}), 0),
                hit("orders", "o-2", json!({"total": 20}), 1),
            ],
        )
        .await;
    engine
        .mount_bulk(json!({
            "errors": false,
            "items": [
                {"update": {"_id": "{\"id\":\"o-1\"}", "status": 201}},
                {"update": {"_id": "{\"id\":\"o-2\"}", "status": 201}}
            ]
        }))
        .await;

    let reader = Reader::new(engine.client(), source_settings(&["orders"]));
    reader.open(None).await.unwrap();
    let records = read_n(&reader, 2).await;
    reader.teardown().await;

    assert_eq!(
        records[1].position.as_deref(),
        Some(&br#"{"indexPositions":{"orders":1}}"#[..])
    );

    let writer = Writer::new(
        engine.client(),
        encoder_for(EngineVersion::V8, None),
        &DestinationSettings::default(),
    );
    writer.open().await.unwrap();
    assert_eq!(writer.write(&records).await.unwrap(), 2);
    writer.teardown().await;

    let bulks = engine.bulk_bodies().await;
    assert_eq!(bulks.len(), 1);
    assert_eq!(
        bulks[0],
        vec![
            json!({"update": {"_id": "{\"id\":\"o-1\"}", "_index": "orders", "retry_on_conflict": 3}}),
            json!({"doc": {"total": 10}, "doc_as_upsert": true}),
            json!({"update": {"_id": "{\"id\":\"o-2\"}", "_index": "orders", "retry_on_conflict": 3}}),
            json!({"doc": {"total": 20}, "doc_as_upsert": true}),
        ]
    );
}

/// A reopened reader continues after the stored cursor of each index and
/// reads unseen indexes from the start.
#[tokio::test]
async fn test_resume_from_position() {
    let engine = EngineHarness::start(EngineVersion::V7).await;
    engine
        .mount_page("i1", Some(5), vec![hit("i1", "a", json!({"n": 6}), 6)])
        .await;
    engine
        .mount_page("i2", None, vec![hit("i2", "b", json!({"n": 0}), 0)])
        .await;

    let reader = Reader::new(engine.client(), source_settings(&["i1", "i2"]));
    reader
        .open(Some(br#"{"indexPositions":{"i1":5}}"#))
        .await
        .unwrap();
    let mut records = read_n(&reader, 2).await;
    reader.teardown().await;

    records.sort_by_key(|r| r.collection().map(String::from));
    assert_eq!(records[0].collection(), Some("i1"));
    assert_eq!(records[1].collection(), Some("i2"));
    assert_eq!(
        records[0].payload.after.as_ref().map(|d| d.to_bytes()),
        Some(br#"{"n":6}"#.to_vec())
    );

    let first_i1 = &engine.search_bodies("i1").await[0];
    assert_eq!(first_i1["search_after"], json!([5]));
    assert_eq!(first_i1["sort"], json!([{"_seq_no": {"order": "asc"}}]));

    let first_i2 = &engine.search_bodies("i2").await[0];
    assert!(first_i2.get("search_after").is_none());
}

/// Pages keep moving forward: the second search resumes after the last hit
/// of the first page.
#[tokio::test]
async fn test_pages_advance() {
    let engine = EngineHarness::start(EngineVersion::V8).await;
    engine
        .mount_page("logs", None, vec![hit("logs", "1", json!({}), 10)])
        .await;
    engine
        .mount_page("logs", Some(10), vec![hit("logs", "2", json!({}), 11)])
        .await;

    let reader = Reader::new(engine.client(), source_settings(&["logs"]));
    reader.open(None).await.unwrap();
    let records = read_n(&reader, 2).await;
    reader.teardown().await;

    let ids: Vec<_> = records.iter().filter_map(|r| r.key_string()).collect();
    assert_eq!(ids, vec![r#"{"id":"1"}"#, r#"{"id":"2"}"#]);
}

/// Version 5 cannot page by `_seq_no`; with no retries the poller stops and
/// the queue closes.
#[tokio::test]
async fn test_v5_seq_no_sort_closes_queue() {
    let engine = EngineHarness::start(EngineVersion::V5).await;
    let reader = Reader::new(engine.client(), source_settings(&["legacy"]));
    reader.open(None).await.unwrap();

    let result = timeout(STEP_TIMEOUT, reader.read_next()).await.unwrap();
    assert!(matches!(result, Err(SourceError::QueueClosed)));
    reader.teardown().await;

    assert!(engine.search_bodies("legacy").await.is_empty());
}

/// Version 5 pages by a custom field and writes typed actions.
#[tokio::test]
async fn test_v5_custom_sort_and_typed_write() {
    let engine = EngineHarness::start(EngineVersion::V5).await;
    engine
        .mount_page("legacy", None, vec![hit("legacy", "x", json!({"v": 1}), 100)])
        .await;
    engine
        .mount_bulk(json!({"items": [{"update": {"_id": "{\"id\":\"x\"}", "status": 200}}]}))
        .await;

    let mut settings = source_settings(&["legacy"]);
    settings.indexes[0] = settings.indexes[0]
        .clone()
        .with_sort("updated_at", SortOrder::Asc);
    let reader = Reader::new(engine.client(), settings);
    reader.open(None).await.unwrap();
    let records = read_n(&reader, 1).await;
    reader.teardown().await;

    let writer = Writer::new(
        engine.client(),
        encoder_for(EngineVersion::V5, Some("doc".to_string())),
        &DestinationSettings {
            index: Some("archive".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(writer.write(&records).await.unwrap(), 1);

    assert_eq!(
        engine.bulk_bodies().await[0][0],
        json!({"update": {"_id": "{\"id\":\"x\"}", "_index": "archive", "_type": "doc"}})
    );
    assert_eq!(
        engine.search_bodies("legacy").await[0]["sort"],
        json!([{"updated_at": {"order": "asc"}}])
    );
}

/// The writer reports how many leading records landed before a rejected item.
#[tokio::test]
async fn test_partial_bulk_failure_over_http() {
    let engine = EngineHarness::start(EngineVersion::V8).await;
    engine
        .mount_bulk(json!({
            "errors": true,
            "items": [
                {"delete": {"_id": "1", "status": 404}},
                {"update": {"_id": "2", "status": 409, "error": {
                    "type": "version_conflict_engine_exception",
                    "reason": "[2]: version conflict"
                }}},
                {"update": {"_id": "3", "status": 200}}
            ]
        }))
        .await;

    let records: Vec<ChangeRecord> = [
        r#"{"operation":"delete","key":"1"}"#,
        r#"{"operation":"update","key":"2","payload":{"after":{"n":2}}}"#,
        r#"{"operation":"update","key":"3","payload":{"after":{"n":3}}}"#,
    ]
    .iter()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();

    let writer = Writer::new(
        engine.client(),
        encoder_for(EngineVersion::V8, None),
        &DestinationSettings {
            index: Some("orders".to_string()),
            ..Default::default()
        },
    );
    let err = writer.write(&records).await.unwrap_err();

    assert_eq!(err.written, 1);
    match err.error {
        DestinationError::PartialBulkFailure { key, action, detail } => {
            assert_eq!(key, "2");
            assert_eq!(action, "update");
            assert_eq!(
                detail,
                "[version_conflict_engine_exception] [2]: version conflict"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Teardown returns promptly even when nobody drains a full queue.
#[tokio::test]
async fn test_teardown_with_undrained_queue() {
    let engine = EngineHarness::start(EngineVersion::V8).await;
    let hits = (0..20)
        .map(|i| hit("busy", &format!("d{i}"), json!({}), i))
        .collect();
    engine.mount_page("busy", None, hits).await;

    let mut settings = source_settings(&["busy"]);
    settings.batch_size = 2;
    let reader = Reader::new(engine.client(), settings);
    reader.open(None).await.unwrap();
    let _ = read_n(&reader, 1).await;

    timeout(STEP_TIMEOUT, reader.teardown())
        .await
        .expect("Teardown hung on a full queue");
    assert!(matches!(reader.read_next().await, Err(SourceError::NotOpen)));
}
