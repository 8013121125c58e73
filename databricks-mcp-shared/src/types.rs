//! Shared types for the Databricks request pipeline

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// How a credential was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    Static,
    OAuth,
}

/// Bearer credential for one workspace.
///
/// Immutable once built; a refresh produces a new instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    expires_at: Option<Instant>,
    mode: CredentialMode,
}

impl Credential {
    /// A personal access token that never expires
    pub fn static_token(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
            mode: CredentialMode::Static,
        }
    }

    /// An OAuth access token valid until `expires_at`
    pub fn oauth(value: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
            mode: CredentialMode::OAuth,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn mode(&self) -> CredentialMode {
        self.mode
    }

    /// True while the credential has not yet expired
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }

    /// True if the credential outlives `now + margin`
    pub fn is_fresh_at(&self, now: Instant, margin: Duration) -> bool {
        self.expires_at
            .map_or(true, |expires_at| expires_at > now + margin)
    }

    /// Get the authorization header value
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &mask(&self.value))
            .field("expires_at", &self.expires_at)
            .field("mode", &self.mode)
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}***")
}

/// One outbound REST call, relative to `/api/2.0`
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// One line of the `databricks://clusters` resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub workers: u64,
    #[serde(rename = "type")]
    pub cluster_type: String,
}

impl From<&Value> for ClusterSummary {
    fn from(cluster: &Value) -> Self {
        let text = |key: &str| cluster.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            id: text("cluster_id"),
            name: text("cluster_name"),
            state: text("state"),
            workers: cluster
                .get("num_workers")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            cluster_type: text("cluster_source").unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// One line of the `databricks://jobs` resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub created_time: Option<i64>,
    pub creator: Option<String>,
}

impl From<&Value> for JobSummary {
    fn from(job: &Value) -> Self {
        let settings = job.get("settings");
        let setting = |key: &str| {
            settings
                .and_then(|s| s.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            id: job.get("job_id").and_then(Value::as_i64),
            name: setting("name").unwrap_or_else(|| "Unnamed".to_string()),
            job_type: setting("type").unwrap_or_else(|| "unknown".to_string()),
            created_time: job.get("created_time").and_then(Value::as_i64),
            creator: job
                .get("creator_user_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// MCP Resource URI components
#[derive(Debug, Clone)]
pub struct ResourceUri {
    pub scheme: String,
    pub path: Vec<String>,
    pub query: HashMap<String, String>,
}

impl ResourceUri {
    pub const SCHEME: &'static str = "databricks";

    pub fn parse(uri: &str) -> crate::Result<Self> {
        let parsed = url::Url::parse(uri)?;

        if parsed.scheme() != Self::SCHEME {
            return Err(crate::DatabricksError::ResourceNotFound(format!(
                "Invalid scheme: {}",
                parsed.scheme()
            )));
        }

        // `databricks://clusters` puts the first segment in the host position
        let path: Vec<String> = parsed
            .host_str()
            .into_iter()
            .chain(parsed.path().split('/'))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let query: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self {
            scheme: parsed.scheme().to_string(),
            path,
            query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_credential_never_expires() {
        let credential = Credential::static_token("tok_abcdefghij");
        let far_future = Instant::now() + Duration::from_secs(10 * 365 * 24 * 3600);

        assert!(credential.is_valid_at(far_future));
        assert!(credential.is_fresh_at(far_future, Duration::from_secs(30)));
        assert_eq!(credential.mode(), CredentialMode::Static);
        assert_eq!(credential.authorization_header(), "Bearer tok_abcdefghij");
    }

    #[test]
    fn test_oauth_credential_freshness_respects_margin() {
        let now = Instant::now();
        let credential = Credential::oauth("abc", now + Duration::from_secs(60));

        assert!(credential.is_valid_at(now));
        assert!(credential.is_fresh_at(now, Duration::from_secs(30)));
        assert!(!credential.is_fresh_at(now + Duration::from_secs(31), Duration::from_secs(30)));
        assert!(credential.is_valid_at(now + Duration::from_secs(59)));
        assert!(!credential.is_valid_at(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_credential_debug_is_masked() {
        let credential = Credential::static_token("dapi0123456789abcdef");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("dapi0123456789abcdef"));
        assert!(rendered.contains("dapi***"));
    }

    #[test]
    fn test_request_spec_builder() {
        let spec = RequestSpec::get("/clusters/get").with_query("cluster_id", "0123-abc");
        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.query, vec![("cluster_id".to_string(), "0123-abc".to_string())]);
        assert!(spec.body.is_none());

        let spec = RequestSpec::post("/clusters/start", json!({"cluster_id": "0123-abc"}));
        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.body.unwrap()["cluster_id"], "0123-abc");
    }

    #[test]
    fn test_cluster_summary_defaults() {
        let summary = ClusterSummary::from(&json!({
            "cluster_id": "123",
            "cluster_name": "x",
            "state": "RUNNING"
        }));

        assert_eq!(summary.id.as_deref(), Some("123"));
        assert_eq!(summary.workers, 0);
        assert_eq!(summary.cluster_type, "unknown");

        let line = serde_json::to_value(&summary).unwrap();
        assert_eq!(line["type"], "unknown");
    }

    #[test]
    fn test_job_summary_reads_settings() {
        let summary = JobSummary::from(&json!({
            "job_id": 42,
            "created_time": 1700000000000i64,
            "creator_user_name": "someone@example.com",
            "settings": {"name": "nightly-etl"}
        }));

        assert_eq!(summary.id, Some(42));
        assert_eq!(summary.name, "nightly-etl");
        assert_eq!(summary.job_type, "unknown");
        assert_eq!(summary.creator.as_deref(), Some("someone@example.com"));

        let unnamed = JobSummary::from(&json!({"job_id": 7}));
        assert_eq!(unnamed.name, "Unnamed");
    }

    #[test]
    fn test_resource_uri_parse() {
        let uri = ResourceUri::parse("databricks://clusters").unwrap();
        assert_eq!(uri.path, vec!["clusters".to_string()]);

        let uri = ResourceUri::parse("databricks://jobs?limit=5").unwrap();
        assert_eq!(uri.path, vec!["jobs".to_string()]);
        assert_eq!(uri.query.get("limit").map(String::as_str), Some("5"));

        assert!(ResourceUri::parse("dbfs://clusters").is_err());
    }
}
