//! Search API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use esbridge_types::SortOrder;

/// One page request against a single index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub index: String,
    /// Maximum hits returned
    pub size: usize,
    pub sort_by: String,
    pub order: SortOrder,
    /// Return only hits sorting strictly after this value; `None` on a cold start
    pub search_after: Option<i64>,
}

impl SearchRequest {
    /// Query body: match everything, sorted, resuming after the cursor.
    pub fn body(&self) -> Value {
        let mut sort = Map::new();
        sort.insert(self.sort_by.clone(), json!({ "order": self.order.as_str() }));

        let mut body = json!({
            "query": { "match_all": {} },
            "sort": [ sort ],
        });
        if let Some(cursor) = self.search_after {
            body["search_after"] = json!([cursor]);
        }
        body
    }
}

/// Body of a search response; only the fields the reader consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// A single matched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,

    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_source", default)]
    pub source: Value,

    /// Sort values; the first one is the resume cursor
    #[serde(default)]
    pub sort: Vec<i64>,
}

impl Hit {
    pub fn new(index: impl Into<String>, id: impl Into<String>, source: Value, cursor: i64) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            source,
            sort: vec![cursor],
        }
    }

    /// The value to resume after, if the engine returned one.
    pub fn cursor(&self) -> Option<i64> {
        self.sort.first().copied()
    }
}

impl SearchResponse {
    pub fn from_hits(hits: Vec<Hit>) -> Self {
        Self { hits: Hits { hits } }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.hits.is_empty()
    }
}
