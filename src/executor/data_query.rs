use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as Json, json};
use tracing::{debug, warn};

use super::{ExecutorDefinition, ExecutorError, ExecutorResult, compiled_config, require_remote};
use crate::registry::Keyed;
use crate::remote::{HttpRequestSpec, RemoteRequest};
use crate::runtime::ExecutionContext;

const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DataQueryConfig {
    collection: String,
    conditions: Vec<Condition>,
    fields: Vec<String>,
    sort: Vec<SortRule>,
    enable_pagination: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Condition {
    field: String,
    operator: String,
    value: Json,
    logical: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SortRule {
    field: String,
    direction: String,
}

/// Lists records of a host collection with filters, field selection,
/// sorting and optional paging.
pub struct DataQueryExecutor;

impl DataQueryExecutor {
    /// Filter document from the condition rows. The first condition and every
    /// `and` row set `filter[field]`; `or` rows are appended to `$or`.
    fn build_filter(conditions: &[Condition]) -> Option<Json> {
        if conditions.is_empty() {
            return None;
        }
        let mut filter = Map::new();
        let mut any_or = Vec::new();
        for (index, c) in conditions.iter().enumerate() {
            if c.field.is_empty() || c.operator.is_empty() {
                continue;
            }
            let value = match c.operator.as_str() {
                "$in" | "$notIn" => match &c.value {
                    Json::Array(_) => c.value.clone(),
                    Json::String(s) if !s.is_empty() => {
                        Json::Array(s.split(',').map(|v| Json::String(v.trim().to_string())).collect())
                    }
                    _ => json!([]),
                },
                "$null" | "$notNull" => Json::Null,
                _ => c.value.clone(),
            };
            let condition = single(&c.operator, value);
            if index > 0 && c.logical.as_deref() == Some("or") {
                any_or.push(single(&c.field, condition));
            } else {
                filter.insert(c.field.clone(), condition);
            }
        }
        if !any_or.is_empty() {
            filter.insert("$or".into(), Json::Array(any_or));
        }
        Some(Json::Object(filter))
    }

    fn query_params(config: &DataQueryConfig) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(filter) = Self::build_filter(&config.conditions) {
            params.insert("filter".into(), filter.to_string());
        }
        if !config.fields.is_empty() {
            params.insert("fields".into(), config.fields.join(","));
        }
        if config.enable_pagination {
            if let Some(limit) = config.limit.filter(|l| *l > 0) {
                params.insert("pageSize".into(), limit.to_string());
            }
            if let Some(offset) = config.offset.filter(|o| *o > 0) {
                let size = config.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE);
                params.insert("page".into(), (offset / size + 1).to_string());
            }
        } else {
            params.insert("paginate".into(), "false".into());
        }
        if !config.sort.is_empty() {
            let sort: Vec<String> = config
                .sort
                .iter()
                .filter(|s| !s.field.is_empty())
                .map(|s| {
                    let prefix = if s.direction == "desc" { "-" } else { "" };
                    format!("{prefix}{}", s.field)
                })
                .collect();
            params.insert("sort".into(), sort.join(","));
        }
        params
    }
}

fn single(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

#[async_trait]
impl ExecutorDefinition for DataQueryExecutor {
    fn label(&self) -> &str {
        "Data Query"
    }

    fn description(&self) -> Option<&str> {
        Some("Query a collection and return the matching records")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config: DataQueryConfig = serde_json::from_value(compiled_config(ctx))
            .map_err(|e| ExecutorError::failed(format!("invalid data-query config: {e}")))?;
        if config.collection.is_empty() {
            return Ok(ExecutorResult::failure(self.key(), "no collection specified")
                .with_metadata(json!({ "error": "no collection specified" })));
        }

        let query = Self::query_params(&config);
        debug!(target: "uiflow::executors", executor = "data-query", collection = %config.collection, ?query, "Querying");

        let spec = HttpRequestSpec {
            params: query.clone(),
            ..HttpRequestSpec::get(format!("{}:list", config.collection))
        };
        let response = match require_remote(ctx) {
            Ok(remote) => remote.fetch(RemoteRequest::Api(spec)).await.map_err(ExecutorError::from),
            Err(e) => Err(e),
        };
        let body = match response {
            Ok(body) => body,
            Err(e) => {
                warn!(target: "uiflow::executors", executor = "data-query", error = %e, "Query failed");
                return Ok(ExecutorResult::failure(self.key(), &e).with_metadata(json!({
                    "error": e.to_string(),
                    "collection": config.collection,
                })));
            }
        };

        let records = body.get("data").cloned().unwrap_or_else(|| json!([]));
        let count = records.as_array().map(Vec::len).unwrap_or(0);
        let meta = body.get("meta");
        let meta_u64 = |key: &str| meta.and_then(|m| m.get(key)).and_then(Json::as_u64);
        let total = meta_u64("count").unwrap_or(count as u64);
        let fields = if config.fields.is_empty() {
            json!("all")
        } else {
            json!(config.fields)
        };

        Ok(ExecutorResult::ok(
            self.key(),
            json!({
                "records": records,
                "total": total,
                "page": meta_u64("page").unwrap_or(1),
                "pageSize": meta_u64("pageSize").unwrap_or(count as u64),
                "collection": config.collection,
                "query": query,
            }),
        )
        .with_metadata(json!({
            "collection": config.collection,
            "recordCount": count,
            "totalCount": total,
            "queryConditions": config.conditions.len(),
            "fields": fields,
        })))
    }
}

impl Keyed for DataQueryExecutor {
    fn key(&self) -> &str {
        "data-query"
    }
}
