//! reqwest-backed [`SearchClient`] speaking the engine's REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use esbridge_types::{ConnectionSettings, EngineVersion};

use crate::api::{SearchRequest, SearchResponse};
use crate::error::ClientError;
use crate::SearchClient;

const NDJSON: &str = "application/x-ndjson";

/// Credentials attached to every request. API key wins over a service
/// token, which wins over basic auth.
enum Auth {
    None,
    Basic {
        username: String,
        password: Option<SecretString>,
    },
    ServiceToken(SecretString),
    ApiKey(SecretString),
}

impl Auth {
    fn from_settings(settings: &ConnectionSettings) -> Self {
        if let Some(key) = &settings.api_key {
            return Auth::ApiKey(key.clone());
        }
        if let Some(token) = &settings.service_token {
            return Auth::ServiceToken(token.clone());
        }
        match &settings.username {
            Some(username) if !username.is_empty() => Auth::Basic {
                username: username.clone(),
                password: settings.password.clone(),
            },
            _ => Auth::None,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Basic { username, password } => {
                request.basic_auth(username, password.as_ref().map(|p| p.expose_secret()))
            }
            Auth::ServiceToken(token) => request.bearer_auth(token.expose_secret()),
            Auth::ApiKey(key) => request.header(
                reqwest::header::AUTHORIZATION,
                format!("ApiKey {}", key.expose_secret()),
            ),
        }
    }
}

/// HTTP client for one engine endpoint.
pub struct HttpClient {
    client: Client,
    base_url: String,
    version: EngineVersion,
    auth: Auth,
}

impl HttpClient {
    /// Build a client from connection settings.
    ///
    /// The host must be an absolute URL; every call is bounded by the
    /// configured request timeout.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ClientError> {
        let url = Url::parse(settings.host.trim())
            .map_err(|e| ClientError::Config(format!("invalid host {:?}: {e}", settings.host)))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "host {:?} cannot be used as a base URL",
                settings.host
            )));
        }

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            version: settings.version,
            auth: Auth::from_settings(settings),
        })
    }

    pub fn version(&self) -> EngineVersion {
        self.version
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Turn a non-success response into [`ClientError::Status`], using the
/// engine's `{"error": {"type", "reason"}}` body when it has one.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        reason: error_reason(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        }),
    })
}

fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(reason) => Some(reason.clone()),
        error => {
            let kind = error.get("type").and_then(Value::as_str);
            let reason = error.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(kind), Some(reason)) => Some(format!("[{kind}] {reason}")),
                (None, Some(reason)) => Some(reason.to_string()),
                (Some(kind), None) => Some(format!("[{kind}]")),
                (None, None) => None,
            }
        }
    }
}

#[async_trait]
impl SearchClient for HttpClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let request = self.auth.apply(self.client.head(self.url("/")));
        check_status(request.send().await?).await?;
        debug!(host = %self.base_url, "Engine reachable");
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError> {
        if self.version == EngineVersion::V5 && request.sort_by == "_seq_no" {
            return Err(ClientError::Unsupported(
                "version 5 cannot sort by _seq_no; configure another sort field".to_string(),
            ));
        }

        let url = self.url(&format!("{}/_search", request.index));
        let http = self
            .auth
            .apply(self.client.post(url))
            .query(&[("size", request.size)])
            .json(&request.body());

        let response = check_status(http.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(index = %request.index, error = %e, "Unexpected search response body");
            ClientError::MalformedResponse(e.to_string())
        })
    }

    async fn bulk(&self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let size = payload.len();
        let http = self
            .auth
            .apply(self.client.post(self.url("/_bulk")))
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(payload);

        let response = check_status(http.send().await?).await?;
        let body = response.bytes().await?;
        debug!(request_bytes = size, response_bytes = body.len(), "Bulk request done");
        Ok(body.to_vec())
    }
}
