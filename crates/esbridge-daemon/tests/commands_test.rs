//! Command-level tests against a scripted engine client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use esbridge_client::{encoder_for, Hit, MockSearchClient};
use esbridge_daemon::{ping_with_backoff, stream_records, write_records, WriteSummary};
use esbridge_destination::Writer;
use esbridge_source::Reader;
use esbridge_types::{DestinationSettings, EngineVersion, IndexSettings, SourceSettings};

fn source_settings(indexes: &[&str]) -> SourceSettings {
    SourceSettings {
        indexes: indexes.iter().map(|name| IndexSettings::new(*name)).collect(),
        batch_size: 10,
        polling_period_ms: 100,
        retries: 0,
    }
}

fn writer(client: &Arc<MockSearchClient>) -> Writer {
    let settings = DestinationSettings {
        index: Some("sink".to_string()),
        ..Default::default()
    };
    Writer::new(client.clone(), encoder_for(EngineVersion::V8, None), &settings)
}

fn ok_items(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({"update": {"_id": i.to_string(), "status": 200}}))
        .collect();
    json!({"errors": false, "items": items})
}

#[tokio::test(start_paused = true)]
async fn test_stream_records_writes_lines_and_position() {
    let client = Arc::new(MockSearchClient::new());
    client.push_hits(
        "orders",
        vec![
            Hit::new("orders", "a", json!({"n": 1}), 1),
            Hit::new("orders", "b", json!({"n": 2}), 2),
        ],
    );
    let reader = Reader::new(client.clone(), source_settings(&["orders"]));
    reader.open(None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let position_file = dir.path().join("position.json");
    let mut out = Vec::new();

    let emitted = stream_records(
        &reader,
        &mut out,
        Some(&position_file),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await
    .unwrap();
    reader.teardown().await;

    assert_eq!(emitted, 2);
    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["operation"], json!("create"));
    assert_eq!(lines[0]["key"], json!({"id": "a"}));
    assert_eq!(lines[1]["metadata"]["opencdc.collection"], json!("orders"));

    let position = std::fs::read(&position_file).unwrap();
    assert_eq!(position, br#"{"indexPositions":{"orders":2}}"#.to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_stream_records_fails_when_all_pollers_stop() {
    let client = Arc::new(MockSearchClient::new());
    client.push_search_error("orders", 500, "boom");
    let reader = Reader::new(client.clone(), source_settings(&["orders"]));
    reader.open(None).await.unwrap();

    let mut out = Vec::new();
    let result = stream_records(&reader, &mut out, None, std::future::pending()).await;
    reader.teardown().await;

    assert!(result.is_err());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_write_records_in_batches() {
    let client = Arc::new(MockSearchClient::new());
    client.push_bulk_response(ok_items(2));
    client.push_bulk_response(ok_items(2));
    client.push_bulk_response(ok_items(1));

    let input: String = (0..5)
        .map(|i| {
            format!(
                "{}\n\n",
                json!({"operation": "update", "key": format!("k{i}"), "payload": {"after": {"n": i}}})
            )
        })
        .collect();

    let summary = write_records(&writer(&client), input.as_bytes(), 2)
        .await
        .unwrap();

    assert_eq!(summary, WriteSummary { batches: 3, written: 5 });
    assert_eq!(client.bulk_payloads().len(), 3);
}

#[tokio::test]
async fn test_write_records_stops_on_failed_item() {
    let client = Arc::new(MockSearchClient::new());
    client.push_bulk_response(json!({
        "errors": true,
        "items": [
            {"update": {"_id": "k0", "status": 200}},
            {"update": {"_id": "k1", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad"}}}
        ]
    }));

    let input = concat!(
        r#"{"operation":"update","key":"k0","payload":{"after":{"n":0}}}"#,
        "\n",
        r#"{"operation":"update","key":"k1","payload":{"after":{"n":1}}}"#,
        "\n",
    );
    let err = write_records(&writer(&client), input.as_bytes(), 10)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("after 1 records"));
}

#[tokio::test]
async fn test_write_records_rejects_bad_line() {
    let client = Arc::new(MockSearchClient::new());
    let err = write_records(&writer(&client), &b"{not json}\n"[..], 10)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("line 1"));
    assert!(client.bulk_payloads().is_empty());
}

#[tokio::test]
async fn test_ping_with_backoff() {
    let client = MockSearchClient::new();
    ping_with_backoff(&client, Duration::from_millis(300))
        .await
        .unwrap();

    client.set_unreachable(true);
    assert!(ping_with_backoff(&client, Duration::from_millis(300))
        .await
        .is_err());
}
