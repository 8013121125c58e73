//! Configuration management for the Databricks MCP connector

use crate::{DatabricksError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Main configuration for the Databricks MCP server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabricksConfig {
    /// Workspace location and credentials
    pub workspace: WorkspaceConfig,

    /// Outbound HTTP behaviour
    pub http: HttpConfig,

    /// MCP server identity
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Workspace host and credentials.
///
/// Either `token` or both `client_id` and `client_secret` must be set.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace host, with or without scheme
    pub host: String,

    /// Personal access token
    pub token: Option<String>,

    /// OAuth client id (service principal)
    pub client_id: Option<String>,

    /// OAuth client secret
    pub client_secret: Option<String>,

    /// Scope requested with the client-credentials grant
    pub oauth_scope: String,
}

/// Outbound request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Total attempts per logical request
    pub max_retries: u32,

    /// First backoff delay (seconds)
    pub backoff_base_secs: u64,

    /// Backoff ceiling (seconds)
    pub backoff_max_secs: u64,

    /// Refresh OAuth tokens this long before they expire (seconds)
    pub token_refresh_margin_secs: u64,
}

/// MCP server identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: None,
            client_id: None,
            client_secret: None,
            oauth_scope: "all-apis".to_string(),
        }
    }
}

impl std::fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("oauth_scope", &self.oauth_scope)
            .finish()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_base_secs: 4,
            backoff_max_secs: 10,
            token_refresh_margin_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "databricks-connector".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl WorkspaceConfig {
    /// Normalized workspace root URL, e.g. `https://adb-123.azuredatabricks.net`
    pub fn base_url(&self) -> Result<Url> {
        normalize_host(&self.host)
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_oauth_client(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.client_id) && present(&self.client_secret)
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

impl DatabricksConfig {
    /// Load configuration from file or create default, then apply environment overrides
    pub fn load_or_default(config_path: Option<&str>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override fields from environment-style variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DATABRICKS_HOST") {
            self.workspace.host = host;
        }
        if let Some(token) = lookup("DATABRICKS_TOKEN") {
            self.workspace.token = Some(token);
        }
        if let Some(client_id) = lookup("DATABRICKS_CLIENT_ID") {
            self.workspace.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup("DATABRICKS_CLIENT_SECRET") {
            self.workspace.client_secret = Some(client_secret);
        }
        if let Some(scope) = lookup("DATABRICKS_OAUTH_SCOPE") {
            self.workspace.oauth_scope = scope;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = parse_number("REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(retries) = lookup("MAX_RETRIES") {
            self.http.max_retries = parse_number("MAX_RETRIES", &retries)?;
        }
        if let Some(name) = lookup("MCP_SERVER_NAME") {
            self.server.name = name;
        }
        if let Some(version) = lookup("MCP_SERVER_VERSION") {
            self.server.version = version;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Check that the configuration can drive the request pipeline
    pub fn validate(&self) -> Result<()> {
        if self.workspace.host.trim().is_empty() {
            return Err(DatabricksError::Config(
                "workspace host is not configured (DATABRICKS_HOST)".to_string(),
            ));
        }
        self.workspace.base_url()?;

        if !self.workspace.has_token() && !self.workspace.has_oauth_client() {
            return Err(DatabricksError::Config(
                "either DATABRICKS_TOKEN or both DATABRICKS_CLIENT_ID and DATABRICKS_CLIENT_SECRET must be set"
                    .to_string(),
            ));
        }

        if self.http.max_retries == 0 {
            return Err(DatabricksError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.http.request_timeout_secs == 0 {
            return Err(DatabricksError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DatabricksError::Config(format!("{key} must be a number, got '{value}'")))
}

/// Normalize a workspace host for consistent URL construction
pub fn normalize_host(host: &str) -> Result<Url> {
    let mut normalized = host.trim().trim_end_matches('/').to_string();

    if normalized.is_empty() {
        return Err(DatabricksError::Config("workspace host is empty".to_string()));
    }

    if !normalized.starts_with("http://") && !normalized.starts_with("https://") {
        normalized = format!("https://{normalized}");
    }

    Ok(Url::parse(&normalized)?)
}
