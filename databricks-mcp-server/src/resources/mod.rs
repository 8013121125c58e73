//! Resource provider for the Databricks MCP server
//!
//! Cluster and job listings are rendered as newline-delimited JSON, one
//! summary object per line.

use databricks_api_client::DatabricksClient;
use databricks_mcp_shared::{
    ClusterSummary, DatabricksError, JobSummary, ResourceUri, Result,
};
use pulseengine_mcp_protocol::{Resource, ResourceContents};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NDJSON_MIME_TYPE: &str = "application/x-ndjson";

pub const CLUSTERS_URI: &str = "databricks://clusters";
pub const JOBS_URI: &str = "databricks://jobs";

pub struct ResourceProvider {
    client: Arc<DatabricksClient>,
}

impl ResourceProvider {
    pub fn new(client: Arc<DatabricksClient>) -> Self {
        Self { client }
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        vec![
            ndjson_resource(
                CLUSTERS_URI,
                "Databricks clusters",
                "All clusters in the workspace, one JSON object per line",
            ),
            ndjson_resource(
                JOBS_URI,
                "Databricks jobs",
                "All jobs in the workspace, one JSON object per line",
            ),
        ]
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        debug!("Reading resource: {}", uri);

        let parsed = ResourceUri::parse(uri)?;
        let path: Vec<&str> = parsed.path.iter().map(String::as_str).collect();

        let text = match path.as_slice() {
            ["clusters"] => {
                let clusters = self.client.list_clusters().await?;
                to_ndjson(clusters.iter().map(ClusterSummary::from))?
            }
            ["jobs"] => {
                let jobs = self.client.list_jobs().await?;
                to_ndjson(jobs.iter().map(JobSummary::from))?
            }
            _ => {
                warn!("Unknown resource: {}", uri);
                return Err(DatabricksError::ResourceNotFound(uri.to_string()));
            }
        };

        Ok(vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Some(NDJSON_MIME_TYPE.to_string()),
            text: Some(text),
            blob: None,
        }])
    }
}

fn ndjson_resource(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some(NDJSON_MIME_TYPE.to_string()),
        annotations: None,
        raw: None,
    }
}

fn to_ndjson<T: Serialize>(items: impl Iterator<Item = T>) -> Result<String> {
    let lines = items
        .map(|item| serde_json::to_string(&item))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use databricks_api_client::ManualClock;
    use databricks_mcp_shared::{DatabricksConfig, WorkspaceConfig};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> ResourceProvider {
        let config = DatabricksConfig {
            workspace: WorkspaceConfig {
                host: server.uri(),
                token: Some("dapi-test".to_string()),
                ..WorkspaceConfig::default()
            },
            ..DatabricksConfig::default()
        };
        let client = DatabricksClient::with_clock(&config, Arc::new(ManualClock::new())).unwrap();
        ResourceProvider::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_list_resources() {
        let server = MockServer::start().await;
        let resources = provider_for(&server).list_resources();

        let uris: Vec<&str> = resources.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec![CLUSTERS_URI, JOBS_URI]);
        assert!(resources
            .iter()
            .all(|r| r.mime_type.as_deref() == Some(NDJSON_MIME_TYPE)));
    }

    fn single_text(contents: Vec<ResourceContents>) -> ResourceContents {
        assert_eq!(contents.len(), 1);
        contents.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_clusters_as_ndjson() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [
                    {
                        "cluster_id": "c1",
                        "cluster_name": "etl",
                        "state": "RUNNING",
                        "num_workers": 4,
                        "cluster_source": "UI"
                    },
                    {
                        "cluster_id": "c2",
                        "cluster_name": "adhoc",
                        "state": "TERMINATED"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = single_text(
            provider_for(&server)
                .read_resource(CLUSTERS_URI)
                .await
                .unwrap(),
        );

        assert_eq!(body.uri, CLUSTERS_URI);
        assert_eq!(body.mime_type.as_deref(), Some(NDJSON_MIME_TYPE));
        let lines: Vec<Value> = body
            .text
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            json!({"id": "c1", "name": "etl", "state": "RUNNING", "workers": 4, "type": "UI"})
        );
        assert_eq!(lines[1]["workers"], 0);
        assert_eq!(lines[1]["type"], "unknown");
    }

    #[tokio::test]
    async fn test_jobs_as_ndjson() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/jobs/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobs": [
                    {
                        "job_id": 11,
                        "settings": {"name": "nightly"},
                        "created_time": 1700000000000i64,
                        "creator_user_name": "ops@example.com"
                    },
                    {"job_id": 12}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = single_text(provider_for(&server).read_resource(JOBS_URI).await.unwrap());

        let lines: Vec<Value> = body
            .text
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["id"], 11);
        assert_eq!(lines[0]["name"], "nightly");
        assert_eq!(lines[0]["type"], "unknown");
        assert_eq!(lines[0]["creator"], "ops@example.com");
        assert_eq!(lines[1]["name"], "Unnamed");
    }

    #[tokio::test]
    async fn test_empty_listing_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/jobs/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let body = single_text(provider_for(&server).read_resource(JOBS_URI).await.unwrap());
        assert_eq!(body.text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);

        let err = provider
            .read_resource("databricks://warehouses")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabricksError::ResourceNotFound(_)));

        let err = provider.read_resource("dbfs://clusters").await.unwrap_err();
        assert!(matches!(err, DatabricksError::ResourceNotFound(_)));
    }
}
