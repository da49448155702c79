//! Scripted in-memory client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{Hit, SearchRequest, SearchResponse};
use crate::error::ClientError;
use crate::SearchClient;

type Scripted<T> = Result<T, (u16, String)>;

#[derive(Default)]
struct State {
    pages: HashMap<String, VecDeque<Scripted<SearchResponse>>>,
    searches: Vec<SearchRequest>,
    bulk_responses: VecDeque<Scripted<Vec<u8>>>,
    bulk_payloads: Vec<Vec<u8>>,
    unreachable: bool,
}

/// Mock client that replays scripted responses.
///
/// Search pages are queued per index; an index with nothing queued answers
/// with an empty page, which a poller treats as idle. Every request is
/// recorded so tests can assert on what was sent.
#[derive(Default)]
pub struct MockSearchClient {
    state: Mutex<State>,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a page of hits for an index.
    pub fn push_hits(&self, index: &str, hits: Vec<Hit>) {
        self.state()
            .pages
            .entry(index.to_string())
            .or_default()
            .push_back(Ok(SearchResponse::from_hits(hits)));
    }

    /// Queue a failed search for an index.
    pub fn push_search_error(&self, index: &str, status: u16, reason: impl Into<String>) {
        self.state()
            .pages
            .entry(index.to_string())
            .or_default()
            .push_back(Err((status, reason.into())));
    }

    /// Queue the body returned by the next bulk call.
    pub fn push_bulk_response(&self, body: Value) {
        self.state()
            .bulk_responses
            .push_back(Ok(body.to_string().into_bytes()));
    }

    /// Queue a failed bulk call.
    pub fn push_bulk_error(&self, status: u16, reason: impl Into<String>) {
        self.state()
            .bulk_responses
            .push_back(Err((status, reason.into())));
    }

    /// Make `ping` fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Every search request received so far, in order.
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state().searches.clone()
    }

    /// Search requests received for one index.
    pub fn searches_for(&self, index: &str) -> Vec<SearchRequest> {
        self.state()
            .searches
            .iter()
            .filter(|r| r.index == index)
            .cloned()
            .collect()
    }

    /// Every bulk payload received so far, in order.
    pub fn bulk_payloads(&self) -> Vec<Vec<u8>> {
        self.state().bulk_payloads.clone()
    }
}

fn status_error((status, reason): (u16, String)) -> ClientError {
    ClientError::Status { status, reason }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn ping(&self) -> Result<(), ClientError> {
        if self.state().unreachable {
            return Err(status_error((503, "engine unreachable".to_string())));
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError> {
        let mut state = self.state();
        state.searches.push(request.clone());
        match state
            .pages
            .get_mut(&request.index)
            .and_then(VecDeque::pop_front)
        {
            Some(scripted) => scripted.map_err(status_error),
            None => Ok(SearchResponse::default()),
        }
    }

    async fn bulk(&self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let mut state = self.state();
        state.bulk_payloads.push(payload);
        match state.bulk_responses.pop_front() {
            Some(scripted) => scripted.map_err(status_error),
            None => Err(status_error((500, "no scripted bulk response".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esbridge_types::SortOrder;
    use serde_json::json;

    fn request(index: &str) -> SearchRequest {
        SearchRequest {
            index: index.to_string(),
            size: 2,
            sort_by: "_seq_no".to_string(),
            order: SortOrder::Asc,
            search_after: None,
        }
    }

    #[tokio::test]
    async fn test_pages_replay_per_index() {
        let client = MockSearchClient::new();
        client.push_hits("a", vec![Hit::new("a", "1", json!({}), 0)]);
        client.push_search_error("a", 500, "boom");

        let page = client.search(&request("a")).await.unwrap();
        assert_eq!(page.hits.hits.len(), 1);
        assert!(client.search(&request("b")).await.unwrap().is_empty());
        assert!(matches!(
            client.search(&request("a")).await,
            Err(ClientError::Status { status: 500, .. })
        ));
        assert!(client.search(&request("a")).await.unwrap().is_empty());

        assert_eq!(client.searches().len(), 4);
        assert_eq!(client.searches_for("a").len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_and_ping() {
        let client = MockSearchClient::new();
        client.push_bulk_response(json!({"items": []}));

        let body = client.bulk(b"x\n".to_vec()).await.unwrap();
        assert_eq!(body, br#"{"items":[]}"#.to_vec());
        assert!(client.bulk(b"y\n".to_vec()).await.is_err());
        assert_eq!(client.bulk_payloads(), vec![b"x\n".to_vec(), b"y\n".to_vec()]);

        client.ping().await.unwrap();
        client.set_unreachable(true);
        assert!(client.ping().await.is_err());
    }
}
