//! End-to-end test infrastructure for esbridge.
//!
//! [`EngineHarness`] stands up a wiremock server that speaks just enough of
//! the engine's REST API (ping, paged search, bulk) to drive the reader and
//! the writer over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use esbridge_client::SearchClient;
use esbridge_types::{ConnectionSettings, EngineVersion, IndexSettings, SourceSettings};

/// Matches a search whose body resumes after `cursor`, or a cold start
/// (no `search_after`) when `cursor` is `None`.
pub struct SearchAfter(pub Option<i64>);

impl Match for SearchAfter {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        match (self.0, body.get("search_after")) {
            (None, None) => true,
            (Some(cursor), Some(after)) => after == &json!([cursor]),
            _ => false,
        }
    }
}

/// A mocked engine plus helpers to script it.
pub struct EngineHarness {
    pub server: MockServer,
    pub version: EngineVersion,
}

impl EngineHarness {
    /// Start a server that answers pings and returns empty pages for any
    /// search that was not scripted.
    pub async fn start(version: EngineVersion) -> Self {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(wiremock::matchers::path_regex(r"^/[^/]+/_search$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![])))
            .with_priority(u8::MAX)
            .mount(&server)
            .await;

        Self { server, version }
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.server.uri(),
            version: self.version,
            request_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    pub fn client(&self) -> Arc<dyn SearchClient> {
        esbridge_client::connect(&self.connection()).expect("Failed to build client")
    }

    /// Serve `hits` once for the search on `index` resuming after `cursor`.
    pub async fn mount_page(&self, index: &str, cursor: Option<i64>, hits: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path(format!("/{index}/_search")))
            .and(SearchAfter(cursor))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(hits)))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Answer the next bulk request with `body`.
    pub async fn mount_bulk(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Bodies of every search request received for `index`.
    pub async fn search_bodies(&self, index: &str) -> Vec<Value> {
        let wanted = format!("/{index}/_search");
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == wanted)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Every bulk body received, each split into its JSON lines.
    pub async fn bulk_bodies(&self) -> Vec<Vec<Value>> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == "/_bulk")
            .map(|r| ndjson_lines(&r.body))
            .collect()
    }

    async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

/// A search response body.
pub fn page(hits: Vec<Value>) -> Value {
    json!({ "took": 1, "timed_out": false, "hits": { "hits": hits } })
}

/// A search hit with a single sort value.
pub fn hit(index: &str, id: &str, source: Value, sort: i64) -> Value {
    json!({ "_index": index, "_id": id, "_source": source, "sort": [sort] })
}

pub fn ndjson_lines(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("Bulk line is not JSON"))
        .collect()
}

/// Reader settings with a short polling period for tests.
pub fn source_settings(indexes: &[&str]) -> SourceSettings {
    SourceSettings {
        indexes: indexes.iter().map(|name| IndexSettings::new(*name)).collect(),
        batch_size: 10,
        polling_period_ms: 50,
        retries: 0,
    }
}

/// Upper bound for any single await in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);
