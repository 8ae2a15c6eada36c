use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, warn};

use super::{ExecutorDefinition, ExecutorError, ExecutorResult, compiled_config, require_remote};
use crate::registry::Keyed;
use crate::remote::{HttpRequestSpec, OutputMode, RemoteRequest};
use crate::runtime::ExecutionContext;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HttpConfig {
    method: Option<String>,
    url: String,
    headers: Vec<Pair>,
    params: Vec<Pair>,
    data: Json,
    timeout: Option<u64>,
    output_mode: OutputMode,
}

/// `{name, value}` row; `key` is accepted for `name`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Pair {
    #[serde(alias = "key")]
    name: String,
    value: Json,
}

impl Pair {
    fn value_text(&self) -> Option<String> {
        match &self.value {
            Json::Null => None,
            Json::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// HTTP request executed by the remote data service.
pub struct HttpExecutor;

impl HttpExecutor {
    fn request_spec(config: HttpConfig) -> HttpRequestSpec {
        let method = config
            .method
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "GET".into())
            .to_ascii_uppercase();

        let mut headers = BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]);
        for h in &config.headers {
            if let Some(v) = h.value_text().filter(|v| !h.name.is_empty() && !v.is_empty()) {
                headers.insert(h.name.clone(), v);
            }
        }
        let params = config
            .params
            .iter()
            .filter(|p| !p.name.is_empty())
            .filter_map(|p| p.value_text().map(|v| (p.name.clone(), v)))
            .collect();

        let body = match config.data {
            Json::String(s) if !s.trim().is_empty() => {
                serde_json::from_str(&s).unwrap_or_else(|e| {
                    debug!(target: "uiflow::executors", error = %e, "Request body is not JSON; sending as text");
                    Json::String(s)
                })
            }
            Json::String(_) => Json::Null,
            other => other,
        };

        HttpRequestSpec {
            url: config.url,
            method,
            headers,
            query: BTreeMap::new(),
            params,
            body,
            timeout: config.timeout.unwrap_or(5000),
            output_mode: config.output_mode,
        }
    }
}

#[async_trait]
impl ExecutorDefinition for HttpExecutor {
    fn label(&self) -> &str {
        "HTTP Request"
    }

    fn description(&self) -> Option<&str> {
        Some("Execute an HTTP request through the backend proxy and return the response data")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config: HttpConfig = serde_json::from_value(compiled_config(ctx))
            .map_err(|e| ExecutorError::failed(format!("invalid http config: {e}")))?;
        let spec = Self::request_spec(config);
        let metadata = serde_json::to_value(&spec).unwrap_or(Json::Null);

        let outcome = match require_remote(ctx) {
            Ok(remote) => remote.fetch(RemoteRequest::Http(spec)).await,
            Err(ExecutorError::Remote(e)) => Err(e),
            Err(e) => return Err(e),
        };
        match outcome {
            Ok(data) => Ok(ExecutorResult::ok(self.key(), data).with_metadata(metadata)),
            Err(e) => {
                warn!(target: "uiflow::executors", executor = "http", error = %e, "HTTP request failed");
                Ok(ExecutorResult::failure(self.key(), &e).with_metadata(metadata))
            }
        }
    }
}

impl Keyed for HttpExecutor {
    fn key(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRemote, test_context};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_builds_and_sends_request() {
        let remote = Arc::new(RecordingRemote::replying(json!({"users": [1]})));
        let mut ctx = test_context("onClick", json!({"id": 7}));
        ctx.remote = Some(remote.clone());
        ctx.config = json!({
            "method": "post",
            "url": "https://api.example.com/users/{{$context.trigger.id}}",
            "headers": [{"name": "X-Token", "value": "t"}, {"name": "", "value": "skip"}],
            "params": [{"key": "page", "value": 2}],
            "data": "{\"a\": {{$context.trigger.id}}}",
        });

        let r = HttpExecutor.execute(&json!({"id": 7}), &ctx).await.unwrap();
        assert!(r.success);
        assert_eq!(r.data, json!({"users": [1]}));

        let sent = remote.requests();
        let RemoteRequest::Http(spec) = &sent[0] else {
            panic!("expected http request, got {:?}", sent[0]);
        };
        assert_eq!(spec.url, "https://api.example.com/users/7");
        assert_eq!(spec.method, "POST");
        assert_eq!(spec.headers.get("X-Token").map(String::as_str), Some("t"));
        assert_eq!(spec.headers.len(), 2);
        assert_eq!(spec.params.get("page").map(String::as_str), Some("2"));
        assert_eq!(spec.body, json!({"a": 7}));
        assert_eq!(spec.timeout, 5000);
    }

    #[tokio::test]
    async fn test_remote_failure_is_an_envelope() {
        let mut ctx = test_context("onClick", json!({}));
        ctx.config = json!({"url": "https://x"});
        let r = HttpExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert!(!r.success);
        assert!(r.error.unwrap().contains("not available"));
        assert_eq!(r.metadata.unwrap()["url"], json!("https://x"));
    }

    #[tokio::test]
    async fn test_status_error_keeps_message() {
        use crate::remote::RemoteError;

        let remote = Arc::new(RecordingRemote::failing(RemoteError::Status {
            status: 502,
            message: "upstream timed out".into(),
        }));
        let mut ctx = test_context("onClick", json!({}));
        ctx.remote = Some(remote.clone());
        ctx.config = json!({"url": "https://x", "method": "delete"});
        let r = HttpExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert!(!r.success);
        assert!(r.error.unwrap().contains("upstream timed out"));
        assert_eq!(remote.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_text_body_kept_as_string() {
        let spec = HttpExecutor::request_spec(HttpConfig {
            method: Some("put".into()),
            data: json!("plain text"),
            ..HttpConfig::default()
        });
        assert_eq!(spec.body, json!("plain text"));
        assert_eq!(spec.method, "PUT");
    }
}
