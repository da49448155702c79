//! Bulk response interpretation.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::DestinationError;

/// Parsed body of a bulk response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkResponseItem>,
}

/// One entry of `items`, keyed by the action that produced it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponseItem {
    pub index: Option<ItemResult>,
    pub create: Option<ItemResult>,
    pub update: Option<ItemResult>,
    pub delete: Option<ItemResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<ItemError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub caused_by: Option<Value>,
}

impl BulkResponseItem {
    /// The action name and its result, if the item carries one.
    pub fn action(&self) -> Option<(&'static str, &ItemResult)> {
        [
            ("index", &self.index),
            ("create", &self.create),
            ("update", &self.update),
            ("delete", &self.delete),
        ]
        .into_iter()
        .find_map(|(name, result)| result.as_ref().map(|r| (name, r)))
    }
}

impl ItemResult {
    /// 2xx is success; so is 404 on a delete, since the document is gone
    /// either way.
    fn succeeded(&self, action: &str) -> bool {
        (200..300).contains(&self.status) || (action == "delete" && self.status == 404)
    }
}

impl ItemError {
    /// `[type] reason`, followed by `: caused_by` when the engine gave one.
    fn detail(&self) -> String {
        let mut detail = format!("[{}] {}", self.kind, self.reason);
        if let Some(cause) = &self.caused_by {
            detail.push_str(": ");
            detail.push_str(&describe_cause(cause));
        }
        detail
    }
}

fn describe_cause(cause: &Value) -> String {
    let kind = cause.get("type").and_then(Value::as_str);
    let reason = cause.get("reason").and_then(Value::as_str);
    match (kind, reason, cause) {
        (Some(kind), Some(reason), _) => format!("[{kind}] {reason}"),
        (_, _, Value::String(text)) => text.clone(),
        _ => cause.to_string(),
    }
}

impl BulkResponse {
    pub fn parse(body: &[u8]) -> Result<Self, DestinationError> {
        serde_json::from_slice(body).map_err(|e| DestinationError::MalformedResponse(e.to_string()))
    }

    /// Walk items in request order and stop at the first failure.
    ///
    /// Returns the number of leading successful items, which is the 0-based
    /// index of the failing item when there is one.
    pub fn interpret(&self) -> (usize, Option<DestinationError>) {
        for (position, item) in self.items.iter().enumerate() {
            let Some((action, result)) = item.action() else {
                warn!(position, "Bulk response item has no action, skipping");
                continue;
            };

            if result.succeeded(action) {
                continue;
            }

            let detail = result
                .error
                .as_ref()
                .map(ItemError::detail)
                .unwrap_or_else(|| "unknown error".to_string());
            let error = DestinationError::PartialBulkFailure {
                key: result.id.clone().unwrap_or_default(),
                action: action.to_string(),
                detail,
            };
            return (position, Some(error));
        }

        (self.items.len(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> BulkResponse {
        BulkResponse::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_all_succeed() {
        let response = parse(json!({
            "errors": false,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"update": {"_id": "b", "status": 200}},
                {"delete": {"_id": "c", "status": 200}}
            ]
        }));
        let (count, error) = response.interpret();
        assert_eq!(count, 3);
        assert!(error.is_none());
    }

    #[test]
    fn test_first_failure_stops_walk() {
        let response = parse(json!({
            "errors": true,
            "items": [
                {"update": {"_id": "1", "status": 200}},
                {"update": {"_id": "2", "status": 409, "error": {
                    "type": "version_conflict_engine_exception",
                    "reason": "version conflict"
                }}},
                {"update": {"_id": "3", "status": 200}}
            ]
        }));
        let (count, error) = response.interpret();
        assert_eq!(count, 1);
        match error {
            Some(DestinationError::PartialBulkFailure { key, action, detail }) => {
                assert_eq!(key, "2");
                assert_eq!(action, "update");
                assert_eq!(detail, "[version_conflict_engine_exception] version conflict");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_delete_not_found_is_success() {
        let response = parse(json!({
            "items": [
                {"delete": {"_id": "gone", "status": 404}},
                {"index": {"_id": "x", "status": 201}}
            ]
        }));
        assert_eq!(response.interpret().0, 2);

        // A 404 on anything but a delete is still a failure
        let response = parse(json!({"items": [{"update": {"_id": "y", "status": 404}}]}));
        let (count, error) = response.interpret();
        assert_eq!(count, 0);
        assert!(error.is_some());
    }

    #[test]
    fn test_failure_without_detail() {
        let response = parse(json!({"items": [{"create": {"_id": "z", "status": 500}}]}));
        let (_, error) = response.interpret();
        assert_eq!(
            error.unwrap().to_string(),
            "item with key=z create failure: unknown error"
        );
    }

    #[test]
    fn test_caused_by_detail() {
        let response = parse(json!({"items": [{"index": {"_id": "q", "status": 400, "error": {
            "type": "mapper_parsing_exception",
            "reason": "failed to parse field [age]",
            "caused_by": {"type": "number_format_exception", "reason": "For input string: \"x\""}
        }}}]}));
        let (_, error) = response.interpret();
        assert_eq!(
            error.unwrap().to_string(),
            "item with key=q index failure: [mapper_parsing_exception] failed to parse field [age]: [number_format_exception] For input string: \"x\""
        );
    }

    #[test]
    fn test_item_without_action_is_skipped() {
        let response = parse(json!({
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {},
                {"delete": {"_id": "c", "status": 500}}
            ]
        }));
        let (count, error) = response.interpret();
        assert_eq!(count, 2);
        assert!(error.is_some());
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            BulkResponse::parse(b"<html>"),
            Err(DestinationError::MalformedResponse(_))
        ));
        assert!(BulkResponse::parse(b"{}").unwrap().items.is_empty());
    }
}
