//! Boundary with the remote data service.
//!
//! Executors never talk to the network themselves: they describe a request
//! (`api`, `http`, `sql` or `workflow`) and hand it to a [`RemoteClient`].

pub mod codegen;
pub mod http_client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

pub use http_client::HttpRemoteClient;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("remote data service is not available")]
    Unavailable,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// What an `http`/`api` request should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Perform the request.
    #[default]
    Execute,
    Curl,
    Powershell,
    Python,
    Javascript,
    Java,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequestSpec {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Json,
    /// Milliseconds.
    pub timeout: u64,
    pub output_mode: OutputMode,
}

impl Default for HttpRequestSpec {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            params: BTreeMap::new(),
            body: Json::Null,
            timeout: 5000,
            output_mode: OutputMode::Execute,
        }
    }
}

impl HttpRequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn method_upper(&self) -> String {
        let m = self.method.trim();
        if m.is_empty() { "GET".into() } else { m.to_ascii_uppercase() }
    }

    /// Methods are restricted to ASCII letters, digits, `-` and `_`.
    pub fn method_is_valid(&self) -> bool {
        let m = self.method.trim();
        m.is_empty() || m.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// `query` overlaid with `params`.
    pub fn merged_query(&self) -> BTreeMap<String, String> {
        let mut out = self.query.clone();
        out.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// A body is sent for non-GET requests when it carries something.
    pub fn has_body(&self) -> bool {
        if self.method_upper() == "GET" {
            return false;
        }
        match &self.body {
            Json::Null => false,
            Json::Bool(b) => *b,
            Json::String(s) => !s.is_empty(),
            Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowRequest {
    pub id: Json,
    #[serde(default)]
    pub values: Json,
}

/// Request envelope, serialized as `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RemoteRequest {
    /// Call against the host application's own REST API.
    Api(HttpRequestSpec),
    /// Proxied call to a third-party endpoint.
    Http(HttpRequestSpec),
    /// Read-only SQL against the host database.
    Sql(String),
    Workflow(WorkflowRequest),
}

impl RemoteRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteRequest::Api(_) => "api",
            RemoteRequest::Http(_) => "http",
            RemoteRequest::Sql(_) => "sql",
            RemoteRequest::Workflow(_) => "workflow",
        }
    }

    /// Reject requests the service would refuse anyway.
    pub fn validate(&self) -> Result<(), RemoteError> {
        match self {
            RemoteRequest::Api(spec) | RemoteRequest::Http(spec) => {
                if spec.url.trim().is_empty() {
                    return Err(RemoteError::InvalidRequest("URL is required".into()));
                }
                if !spec.method_is_valid() {
                    return Err(RemoteError::InvalidRequest(format!(
                        "invalid HTTP method '{}'",
                        spec.method.trim()
                    )));
                }
            }
            RemoteRequest::Sql(sql) => {
                if sql.trim().is_empty() {
                    return Err(RemoteError::InvalidRequest("sql is required".into()));
                }
            }
            RemoteRequest::Workflow(wf) => {
                if wf.values.is_null() {
                    return Err(RemoteError::InvalidRequest("values is required".into()));
                }
                workflow_id(&wf.id)?;
            }
        }
        Ok(())
    }
}

/// Workflow ids are integers, possibly given as strings.
pub fn workflow_id(id: &Json) -> Result<i64, RemoteError> {
    match id {
        Json::Null => Err(RemoteError::InvalidRequest("id is required".into())),
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| RemoteError::InvalidRequest("id is invalid".into())),
        Json::String(s) if s.trim().is_empty() => {
            Err(RemoteError::InvalidRequest("id is required".into()))
        }
        Json::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .enumerate()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
                .map(|(_, c)| c)
                .collect();
            digits
                .parse()
                .map_err(|_| RemoteError::InvalidRequest("id is invalid".into()))
        }
        _ => Err(RemoteError::InvalidRequest("id is invalid".into())),
    }
}

/// Handle on the remote data service.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn fetch(&self, request: RemoteRequest) -> Result<Json, RemoteError>;
}

/// Client used when no service is configured: code-generation requests are
/// answered locally, everything else fails with [`RemoteError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemoteClient;

#[async_trait]
impl RemoteClient for OfflineRemoteClient {
    async fn fetch(&self, request: RemoteRequest) -> Result<Json, RemoteError> {
        request.validate()?;
        match &request {
            RemoteRequest::Http(spec) | RemoteRequest::Api(spec)
                if spec.output_mode != OutputMode::Execute =>
            {
                debug!(target: "uiflow::remote", format = ?spec.output_mode, "Generating request template offline");
                codegen::template_response(spec)
            }
            _ => Err(RemoteError::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let req = RemoteRequest::Sql("select 1".into());
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"type": "sql", "data": "select 1"}));

        let req: RemoteRequest = serde_json::from_value(json!({
            "type": "http",
            "data": {"url": "https://x", "outputMode": "curl"}
        }))
        .unwrap();
        match req {
            RemoteRequest::Http(spec) => {
                assert_eq!(spec.method, "GET");
                assert_eq!(spec.timeout, 5000);
                assert_eq!(spec.output_mode, OutputMode::Curl);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_validation() {
        assert!(RemoteRequest::Http(HttpRequestSpec::default()).validate().is_err());
        assert!(RemoteRequest::Sql("  ".into()).validate().is_err());
        let mut spec = HttpRequestSpec::get("https://x");
        spec.method = "post'; Remove-Item -Recurse C:\\ #".into();
        assert!(RemoteRequest::Http(spec.clone()).validate().is_err());
        spec.method = "patch".into();
        assert!(RemoteRequest::Http(spec).validate().is_ok());
        let wf = |id: Json, values: Json| RemoteRequest::Workflow(WorkflowRequest { id, values });
        assert!(wf(json!("12"), json!({})).validate().is_ok());
        assert!(wf(json!(12), Json::Null).validate().is_err());
        assert!(wf(json!("abc"), json!({})).validate().is_err());
        assert_eq!(workflow_id(&json!("42abc")).unwrap(), 42);
    }

    #[test]
    fn test_merged_query_and_body() {
        let mut spec = HttpRequestSpec::get("https://x");
        spec.query.insert("a".into(), "1".into());
        spec.params.insert("a".into(), "2".into());
        spec.params.insert("b".into(), "3".into());
        let q = spec.merged_query();
        assert_eq!(q.get("a").map(String::as_str), Some("2"));
        assert_eq!(q.len(), 2);

        spec.body = json!({"k": 1});
        assert!(!spec.has_body());
        spec.method = "post".into();
        assert!(spec.has_body());
        spec.body = json!("");
        assert!(!spec.has_body());
    }

    #[tokio::test]
    async fn test_offline_client() {
        let client = OfflineRemoteClient;
        let err = client.fetch(RemoteRequest::Sql("select 1".into())).await.unwrap_err();
        assert_eq!(err, RemoteError::Unavailable);

        let mut spec = HttpRequestSpec::get("https://example.com/users");
        spec.output_mode = OutputMode::Curl;
        let out = client.fetch(RemoteRequest::Http(spec)).await.unwrap();
        assert_eq!(out["mode"], json!("template"));
        assert_eq!(out["format"], json!("curl"));
        assert!(out["template"].as_str().unwrap().contains("curl 'https://example.com/users'"));
    }
}
