//! Databricks workspace API client - credentials, retries and typed operations

pub mod auth;
pub mod clock;
pub mod executor;
pub mod retry;

pub use auth::{AuthConfig, CredentialProvider, OAuthClientConfig};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use executor::{classify, RequestExecutor, StatusClass};
pub use retry::RetryPolicy;

use databricks_mcp_shared::{ApiError, DatabricksConfig, RequestSpec, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Wait time handed to the statement execution API before it cancels
pub const SQL_WAIT_TIMEOUT: &str = "50s";

/// Workspace client shared by every tool and resource handler
pub struct DatabricksClient {
    executor: RequestExecutor,
}

impl DatabricksClient {
    pub fn new(config: &DatabricksConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DatabricksConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let workspace_url = config.workspace.base_url()?;
        let auth = AuthConfig::from_workspace(&config.workspace)?;
        let credentials = CredentialProvider::new(auth, &config.http, clock.clone());
        let executor = RequestExecutor::new(&workspace_url, credentials, clock, &config.http)?;

        info!(
            workspace = %workspace_url,
            max_attempts = executor.policy().max_attempts,
            "Databricks client configured"
        );

        Ok(Self { executor })
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub async fn request(&self, spec: &RequestSpec) -> std::result::Result<Value, ApiError> {
        self.executor.execute(spec).await
    }

    /// `GET /clusters/list`; a response without `clusters` is an empty list
    pub async fn list_clusters(&self) -> std::result::Result<Vec<Value>, ApiError> {
        let data = self.request(&RequestSpec::get("/clusters/list")).await?;
        Ok(take_array(data, "clusters"))
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> std::result::Result<Value, ApiError> {
        self.request(&RequestSpec::get("/clusters/get").with_query("cluster_id", cluster_id))
            .await
    }

    pub async fn start_cluster(&self, cluster_id: &str) -> std::result::Result<Value, ApiError> {
        self.request(&RequestSpec::post(
            "/clusters/start",
            json!({ "cluster_id": cluster_id }),
        ))
        .await
    }

    /// Terminates the cluster. The cluster definition is kept and can be
    /// started again.
    pub async fn stop_cluster(&self, cluster_id: &str) -> std::result::Result<Value, ApiError> {
        self.request(&RequestSpec::post(
            "/clusters/delete",
            json!({ "cluster_id": cluster_id }),
        ))
        .await
    }

    pub async fn list_jobs(&self) -> std::result::Result<Vec<Value>, ApiError> {
        let data = self.request(&RequestSpec::get("/jobs/list")).await?;
        Ok(take_array(data, "jobs"))
    }

    pub async fn run_job(
        &self,
        job_id: i64,
        params: Option<&Map<String, Value>>,
    ) -> std::result::Result<Value, ApiError> {
        let mut payload = Map::new();
        payload.insert("job_id".to_string(), json!(job_id));
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            payload.insert("notebook_params".to_string(), Value::Object(params.clone()));
        }

        self.request(&RequestSpec::post("/jobs/run-now", Value::Object(payload)))
            .await
    }

    pub async fn execute_sql(
        &self,
        warehouse_id: &str,
        query: &str,
        parameters: Option<&[Value]>,
    ) -> std::result::Result<Value, ApiError> {
        let mut payload = Map::new();
        payload.insert("warehouse_id".to_string(), json!(warehouse_id));
        payload.insert("statement".to_string(), json!(query));
        payload.insert("wait_timeout".to_string(), json!(SQL_WAIT_TIMEOUT));
        payload.insert("on_wait_timeout".to_string(), json!("CANCEL"));
        if let Some(parameters) = parameters.filter(|p| !p.is_empty()) {
            payload.insert("parameters".to_string(), Value::Array(parameters.to_vec()));
        }

        self.request(&RequestSpec::post("/sql/statements", Value::Object(payload)))
            .await
    }
}

fn take_array(mut data: Value, key: &str) -> Vec<Value> {
    match data.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
