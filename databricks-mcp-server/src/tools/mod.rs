//! Tool provider for the Databricks MCP server
//!
//! Every tool is a thin wrapper over one workspace API call. API failures are
//! reported as error results carrying a structured `{"error": {...}}` body;
//! only unknown tools and malformed arguments are protocol errors.

use databricks_api_client::DatabricksClient;
use databricks_mcp_shared::{redact, DatabricksError, Result};
use pulseengine_mcp_protocol::{CallToolResult, Content, Tool};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a tool call before it is wrapped in MCP content
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolOutput {
    fn success(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn failure(payload: Value) -> Self {
        Self {
            payload,
            is_error: true,
        }
    }

    /// Render the payload as pretty-printed JSON text content
    pub fn into_call_result(self) -> Result<CallToolResult> {
        let content = vec![Content::text(serde_json::to_string_pretty(&self.payload)?)];

        Ok(if self.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClusterArgs {
    cluster_id: String,
}

#[derive(Debug, Deserialize)]
struct RunJobArgs {
    job_id: i64,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlArgs {
    warehouse_id: String,
    query: String,
    #[serde(default)]
    parameters: Option<Vec<Value>>,
}

pub struct ToolProvider {
    client: Arc<DatabricksClient>,
}

impl ToolProvider {
    pub fn new(client: Arc<DatabricksClient>) -> Self {
        Self { client }
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        let cluster_id = json!({
            "cluster_id": {
                "type": "string",
                "description": "Databricks cluster ID"
            }
        });

        vec![
            tool("list_clusters", "List all Databricks clusters", json!({}), &[]),
            tool(
                "get_cluster",
                "Get details of a specific cluster",
                cluster_id.clone(),
                &["cluster_id"],
            ),
            tool(
                "start_cluster",
                "Start a terminated Databricks cluster",
                cluster_id.clone(),
                &["cluster_id"],
            ),
            tool(
                "stop_cluster",
                "Terminate a running Databricks cluster",
                cluster_id,
                &["cluster_id"],
            ),
            tool("list_jobs", "List all Databricks jobs", json!({}), &[]),
            tool(
                "run_job",
                "Trigger a run of an existing Databricks job",
                json!({
                    "job_id": {
                        "type": "integer",
                        "description": "Databricks job ID"
                    },
                    "params": {
                        "type": "object",
                        "description": "Notebook parameters passed to the run",
                        "additionalProperties": { "type": "string" }
                    }
                }),
                &["job_id"],
            ),
            tool(
                "execute_sql",
                "Execute a SQL statement on a Databricks SQL warehouse",
                json!({
                    "warehouse_id": {
                        "type": "string",
                        "description": "Databricks SQL warehouse ID"
                    },
                    "query": {
                        "type": "string",
                        "description": "SQL statement to execute"
                    },
                    "parameters": {
                        "type": "array",
                        "description": "Named statement parameters",
                        "items": { "type": "object" }
                    }
                }),
                &["warehouse_id", "query"],
            ),
            tool(
                "check_health",
                "Check connectivity and credentials against the Databricks workspace",
                json!({}),
                &[],
            ),
        ]
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<ToolOutput> {
        debug!(tool = name, "Calling tool");

        let result = match name {
            "list_clusters" => self.client.list_clusters().await.map(Value::from),
            "get_cluster" => {
                let args: ClusterArgs = parse_args(name, arguments)?;
                self.client.get_cluster(&args.cluster_id).await
            }
            "start_cluster" => {
                let args: ClusterArgs = parse_args(name, arguments)?;
                self.client.start_cluster(&args.cluster_id).await
            }
            "stop_cluster" => {
                let args: ClusterArgs = parse_args(name, arguments)?;
                self.client.stop_cluster(&args.cluster_id).await
            }
            "list_jobs" => self.client.list_jobs().await.map(Value::from),
            "run_job" => {
                let args: RunJobArgs = parse_args(name, arguments)?;
                self.client.run_job(args.job_id, args.params.as_ref()).await
            }
            "execute_sql" => {
                let args: ExecuteSqlArgs = parse_args(name, arguments)?;
                self.client
                    .execute_sql(&args.warehouse_id, &args.query, args.parameters.as_deref())
                    .await
            }
            "check_health" => return Ok(self.check_health().await),
            _ => {
                error!("Unknown tool: {}", name);
                return Err(DatabricksError::InvalidParams(format!(
                    "Tool '{}' not found",
                    name
                )));
            }
        };

        match result {
            Ok(payload) => Ok(ToolOutput::success(payload)),
            Err(e) => {
                warn!(tool = name, kind = e.kind(), status = ?e.status(), "Tool call failed");
                Ok(ToolOutput::failure(e.to_payload()))
            }
        }
    }

    /// Check the workspace by listing clusters. Never fails; an unreachable or
    /// misconfigured workspace is reported as `unhealthy`.
    async fn check_health(&self) -> ToolOutput {
        match self.client.list_clusters().await {
            Ok(clusters) => ToolOutput::success(json!({
                "status": "healthy",
                "clusters_count": clusters.len(),
                "message": "Successfully connected to Databricks"
            })),
            Err(e) => {
                warn!("Health check failed: {}", e);
                ToolOutput::success(json!({
                    "status": "unhealthy",
                    "error": redact::redact(&e.to_string()),
                    "message": "Failed to connect to Databricks"
                }))
            }
        }
    }
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required
        }),
        output_schema: None,
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> Result<T> {
    let arguments = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(arguments)
        .map_err(|e| DatabricksError::InvalidParams(format!("invalid arguments for '{tool}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use databricks_api_client::ManualClock;
    use databricks_mcp_shared::{DatabricksConfig, WorkspaceConfig};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> ToolProvider {
        let config = DatabricksConfig {
            workspace: WorkspaceConfig {
                host: server.uri(),
                token: Some("dapi-test".to_string()),
                ..WorkspaceConfig::default()
            },
            ..DatabricksConfig::default()
        };
        let client = DatabricksClient::with_clock(&config, Arc::new(ManualClock::new())).unwrap();
        ToolProvider::new(Arc::new(client))
    }

    async fn unused_server() -> MockServer {
        MockServer::start().await
    }

    #[tokio::test]
    async fn test_tool_catalog() {
        let provider = provider_for(&unused_server().await);
        let tools = provider.list_tools();

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "list_clusters",
                "get_cluster",
                "start_cluster",
                "stop_cluster",
                "list_jobs",
                "run_job",
                "execute_sql",
                "check_health"
            ]
        );

        let run_job = &tools[5];
        assert_eq!(run_job.input_schema["required"], json!(["job_id"]));
        assert_eq!(
            run_job.input_schema["properties"]["job_id"]["type"],
            "integer"
        );
        assert!(tools.iter().all(|t| t.input_schema["type"] == "object"));
    }

    #[test]
    fn test_call_result_flags_errors() {
        let failed = ToolOutput {
            payload: json!({"error": {"kind": "client_error"}}),
            is_error: true,
        }
        .into_call_result()
        .unwrap();
        assert_eq!(failed.is_error, Some(true));
        assert_eq!(failed.content.len(), 1);

        let ok = ToolOutput {
            payload: json!([]),
            is_error: false,
        }
        .into_call_result()
        .unwrap();
        assert_ne!(ok.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_list_clusters_returns_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [{"cluster_id": "c1", "state": "RUNNING"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("list_clusters", None)
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.payload, json!([{"cluster_id": "c1", "state": "RUNNING"}]));
    }

    #[tokio::test]
    async fn test_get_cluster_passes_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/get"))
            .and(query_param("cluster_id", "c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cluster_id": "c1"})))
            .expect(1)
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("get_cluster", Some(json!({"cluster_id": "c1"})))
            .await
            .unwrap();

        assert_eq!(output.payload["cluster_id"], "c1");
    }

    #[tokio::test]
    async fn test_run_job_forwards_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/jobs/run-now"))
            .and(body_json(json!({"job_id": 7, "notebook_params": {"env": "dev"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": 99})))
            .expect(1)
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool(
                "run_job",
                Some(json!({"job_id": 7, "params": {"env": "dev"}})),
            )
            .await
            .unwrap();

        assert_eq!(output.payload["run_id"], 99);
    }

    #[tokio::test]
    async fn test_api_failure_is_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/clusters/start"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("{\"error_code\":\"INVALID_STATE\",\"message\":\"Cluster is running\"}"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("start_cluster", Some(json!({"cluster_id": "c1"})))
            .await
            .unwrap();

        assert!(output.is_error);
        assert_eq!(output.payload["error"]["kind"], "client_error");
        assert_eq!(output.payload["error"]["status"], 400);
        assert!(output.payload["error"]["body"]
            .as_str()
            .unwrap()
            .contains("INVALID_STATE"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/jobs/list"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(3)
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("list_jobs", None)
            .await
            .unwrap();

        assert!(output.is_error);
        assert_eq!(output.payload["error"]["kind"], "retries_exhausted");
        assert_eq!(output.payload["error"]["attempts"], 3);
        assert_eq!(output.payload["error"]["status"], 503);
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid_params() {
        let provider = provider_for(&unused_server().await);

        let err = provider.call_tool("get_cluster", None).await.unwrap_err();
        assert!(matches!(err, DatabricksError::InvalidParams(_)));

        let err = provider
            .call_tool("run_job", Some(json!({"job_id": "not-a-number"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabricksError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let provider = provider_for(&unused_server().await);
        let err = provider.call_tool("drop_everything", None).await.unwrap_err();
        assert!(err.to_string().contains("drop_everything"));
    }

    #[tokio::test]
    async fn test_check_health_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [{"cluster_id": "a"}, {"cluster_id": "b"}]
            })))
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("check_health", None)
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.payload["status"], "healthy");
        assert_eq!(output.payload["clusters_count"], 2);
    }

    #[tokio::test]
    async fn test_check_health_unhealthy_never_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/list"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Invalid access token"))
            .mount(&server)
            .await;

        let output = provider_for(&server)
            .call_tool("check_health", None)
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.payload["status"], "unhealthy");
        assert_eq!(output.payload["message"], "Failed to connect to Databricks");
        assert!(output.payload["error"].as_str().unwrap().contains("403"));
    }
}
