use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Value as Json, json};
use tracing::{debug, trace, warn};
use url::Url;

use super::{RemoteClient, RemoteError, RemoteRequest};

/// Proxy action on the host API that executes `http`, `sql` and `workflow` requests.
pub const FETCH_DATA_ACTION: &str = "collections:automation-fetch_data";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BASE_MS: u64 = 200;

/// [`RemoteClient`] over HTTP.
///
/// `base_url` is the root of the host API (e.g. `http://localhost:13000/api/`).
/// `api` requests are sent to `<base_url><url>` directly; every other kind is
/// posted as `{"data": {type, data}}` to the proxy action and the `data` field
/// of the reply is returned.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    client: Client,
    base: Url,
    retries: u32,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidRequest(format!("invalid base url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            retries: 0,
        })
    }

    /// Retry transport failures (not HTTP errors) up to `retries` times.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a resource path against the API root.
    pub fn resolve(&self, path: &str) -> Result<Url, RemoteError> {
        // "./" keeps "users:list" from parsing as a scheme.
        let relative = format!("./{}", path.trim_start_matches('/'));
        self.base
            .join(&relative)
            .map_err(|e| RemoteError::InvalidRequest(format!("invalid path '{path}': {e}")))
    }

    fn build(&self, request: &RemoteRequest) -> Result<RequestBuilder, RemoteError> {
        match request {
            RemoteRequest::Api(spec) => {
                let method = Method::from_bytes(spec.method_upper().as_bytes())
                    .map_err(|_| RemoteError::InvalidRequest(format!("invalid method '{}'", spec.method)))?;
                let mut builder = self
                    .client
                    .request(method, self.resolve(&spec.url)?)
                    .query(&spec.merged_query())
                    .timeout(Duration::from_millis(spec.timeout.max(1)));
                for (k, v) in &spec.headers {
                    builder = builder.header(k, v);
                }
                if spec.has_body() {
                    builder = builder.json(&spec.body);
                }
                Ok(builder)
            }
            other => Ok(self
                .client
                .post(self.resolve(FETCH_DATA_ACTION)?)
                .json(&json!({ "data": other }))),
        }
    }

    async fn send_once(&self, request: &RemoteRequest) -> Result<Json, RemoteError> {
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: error_message(&text)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
            });
        }
        if text.trim().is_empty() {
            return Ok(Json::Null);
        }
        let body: Json = serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(match request {
            RemoteRequest::Api(_) => body,
            _ => unwrap_data(body),
        })
    }
}

/// `{data: x}` → `x`; anything else unchanged.
fn unwrap_data(body: Json) -> Json {
    match body {
        Json::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Json::Null),
        other => other,
    }
}

/// Message from a `{errors: [{message}]}` or `{message}` error body.
fn error_message(text: &str) -> Option<String> {
    let body: Json = serde_json::from_str(text).ok()?;
    body.pointer("/errors/0/message")
        .or_else(|| body.get("message"))
        .and_then(Json::as_str)
        .map(str::to_string)
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch(&self, request: RemoteRequest) -> Result<Json, RemoteError> {
        request.validate()?;
        let kind = request.kind();
        let mut attempt = 0;
        loop {
            trace!(target: "uiflow::remote", kind, attempt, "Sending remote request");
            match self.send_once(&request).await {
                Ok(data) => {
                    debug!(target: "uiflow::remote", kind, "Remote request succeeded");
                    return Ok(data);
                }
                Err(RemoteError::Transport(reason)) if attempt < self.retries => {
                    attempt += 1;
                    let backoff = RETRY_BASE_MS * (1 << attempt.min(6));
                    let jitter = rand::rng().random_range(0..=backoff / 2);
                    warn!(
                        target: "uiflow::remote",
                        kind, attempt, %reason, delay_ms = backoff + jitter,
                        "Remote request failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let c = HttpRemoteClient::new("http://localhost:13000/api").unwrap();
        assert_eq!(c.base_url().as_str(), "http://localhost:13000/api/");
        assert_eq!(
            c.resolve("users:list").unwrap().as_str(),
            "http://localhost:13000/api/users:list"
        );
        assert_eq!(
            c.resolve(FETCH_DATA_ACTION).unwrap().as_str(),
            "http://localhost:13000/api/collections:automation-fetch_data"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpRemoteClient::new("not a url"),
            Err(RemoteError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_unwrap_data_and_error_message() {
        assert_eq!(unwrap_data(json!({"data": [1]})), json!([1]));
        assert_eq!(unwrap_data(json!([1])), json!([1]));
        assert_eq!(
            error_message(r#"{"errors":[{"message":"sql is required"}]}"#).as_deref(),
            Some("sql is required")
        );
        assert_eq!(error_message("oops"), None);
    }

    #[tokio::test]
    async fn test_validation_happens_before_sending() {
        let c = HttpRemoteClient::new("http://127.0.0.1:9/api/").unwrap();
        let err = c.fetch(RemoteRequest::Sql(String::new())).await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidRequest(_)));
    }
}
