use async_trait::async_trait;
use serde_json::{Value as Json, json};
use tracing::debug;

use super::{ExecutorDefinition, ExecutorError, ExecutorResult, compiled_config, require_remote};
use crate::registry::Keyed;
use crate::remote::{RemoteRequest, WorkflowRequest, workflow_id};
use crate::runtime::ExecutionContext;

/// Read-only SQL run by the remote data service; `data` is the row array.
pub struct SqlExecutor;

#[async_trait]
impl ExecutorDefinition for SqlExecutor {
    fn label(&self) -> &str {
        "SQL Query"
    }

    fn description(&self) -> Option<&str> {
        Some("Run a read-only SQL query against the host database")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config = compiled_config(ctx);
        let sql = config
            .get("sql")
            .and_then(Json::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExecutorError::failed("sql is required"))?
            .to_string();

        let remote = require_remote(ctx)?;
        debug!(target: "uiflow::executors", executor = "sql", %sql, "Running query");
        let rows = remote.fetch(RemoteRequest::Sql(sql.clone())).await?;
        let count = rows.as_array().map(Vec::len).unwrap_or(0);
        Ok(ExecutorResult::ok(self.key(), rows).with_metadata(json!({ "sql": sql, "rowCount": count })))
    }
}

impl Keyed for SqlExecutor {
    fn key(&self) -> &str {
        "sql"
    }
}

/// Manually triggers a workflow in the host; `data` is `{id, data, status}`.
pub struct WorkflowExecutor;

#[async_trait]
impl ExecutorDefinition for WorkflowExecutor {
    fn label(&self) -> &str {
        "Workflow"
    }

    fn description(&self) -> Option<&str> {
        Some("Execute a workflow with the given values")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config = compiled_config(ctx);
        let id = config.get("id").cloned().unwrap_or(Json::Null);
        workflow_id(&id)?;
        let values = match config.get("values") {
            // Values are often authored as a JSON string in the config form.
            Some(Json::String(s)) => serde_json::from_str(s)
                .map_err(|e| ExecutorError::failed(format!("values is not valid JSON: {e}")))?,
            Some(v) if !v.is_null() => v.clone(),
            _ => json!({}),
        };

        let remote = require_remote(ctx)?;
        let result = remote
            .fetch(RemoteRequest::Workflow(WorkflowRequest { id: id.clone(), values }))
            .await?;
        Ok(ExecutorResult::ok(self.key(), result).with_metadata(json!({ "workflowId": id })))
    }
}

impl Keyed for WorkflowExecutor {
    fn key(&self) -> &str {
        "workflow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::testing::{RecordingRemote, test_context};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sql_compiles_and_returns_rows() {
        let remote = Arc::new(RecordingRemote::replying(json!([{"id": 1}, {"id": 2}])));
        let mut ctx = test_context("onClick", json!({"id": 5}));
        ctx.remote = Some(remote.clone());
        ctx.config = json!({"sql": "select * from users where id = {{$context.trigger.id}}"});

        let r = SqlExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(r.data.as_array().unwrap().len(), 2);
        assert_eq!(r.metadata.unwrap()["rowCount"], json!(2));
        assert_eq!(
            remote.requests(),
            vec![RemoteRequest::Sql("select * from users where id = 5".into())]
        );
    }

    #[tokio::test]
    async fn test_sql_requires_query_and_remote() {
        let ctx = test_context("onClick", json!({}));
        assert!(matches!(
            SqlExecutor.execute(&json!({}), &ctx).await,
            Err(ExecutorError::Failed(_))
        ));
        let mut ctx = test_context("onClick", json!({}));
        ctx.config = json!({"sql": "select 1"});
        assert!(matches!(
            SqlExecutor.execute(&json!({}), &ctx).await,
            Err(ExecutorError::Remote(RemoteError::Unavailable))
        ));
    }

    #[tokio::test]
    async fn test_workflow_request() {
        let remote = Arc::new(RecordingRemote::replying(json!({"id": 9, "status": 1})));
        let mut ctx = test_context("onClick", json!({"name": "Ada"}));
        ctx.remote = Some(remote.clone());
        ctx.config = json!({"id": "3", "values": "{\"name\": \"{{$context.trigger.name}}\"}"});

        let r = WorkflowExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(r.data["status"], json!(1));
        assert_eq!(
            remote.requests(),
            vec![RemoteRequest::Workflow(WorkflowRequest {
                id: json!("3"),
                values: json!({"name": "Ada"}),
            })]
        );
    }

    #[tokio::test]
    async fn test_workflow_rejects_bad_id() {
        let mut ctx = test_context("onClick", json!({}));
        ctx.config = json!({"id": "abc"});
        assert!(WorkflowExecutor.execute(&json!({}), &ctx).await.is_err());
    }
}
