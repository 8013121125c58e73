//! Error types for the Databricks MCP connector

use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabricksError>;

#[derive(Error, Debug)]
pub enum DatabricksError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("MCP protocol error: {0}")]
    Mcp(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

/// Failure to obtain a bearer credential from the identity provider.
///
/// `Clone` so that a single refresh result can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(String),

    #[error("identity endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("token refresh aborted: {0}")]
    Aborted(String),
}

/// Terminal outcome of a REST call that did not succeed.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The credential could not be obtained or refreshed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Non-retryable 4xx rejection.
    #[error("request rejected with HTTP {status}: {body}")]
    Client { status: u16, body: String },

    /// Transient failures persisted past the retry budget.
    #[error("request failed after {attempts} attempts ({}): {last_body}", describe_status(.last_status))]
    RetriesExhausted {
        last_status: Option<u16>,
        last_body: String,
        attempts: u32,
    },

    /// The request could not be built, or a 2xx body was not valid JSON.
    #[error("transport error: {0}")]
    Transport(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("last status {code}"),
        None => "no HTTP response".to_string(),
    }
}

impl ApiError {
    /// Stable machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "auth_error",
            ApiError::Client { .. } => "client_error",
            ApiError::RetriesExhausted { .. } => "retries_exhausted",
            ApiError::Transport(_) => "transport_error",
        }
    }

    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } => Some(*status),
            ApiError::RetriesExhausted { last_status, .. } => *last_status,
            ApiError::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Structured description used as a failed tool result.
    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });

        match self {
            ApiError::Client { status, body } => {
                error["status"] = json!(status);
                error["body"] = json!(body);
            }
            ApiError::RetriesExhausted {
                last_status,
                last_body,
                attempts,
            } => {
                error["status"] = json!(last_status);
                error["body"] = json!(last_body);
                error["attempts"] = json!(attempts);
            }
            ApiError::Auth(AuthError::Rejected { status, body }) => {
                error["status"] = json!(status);
                error["body"] = json!(body);
            }
            _ => {}
        }

        json!({ "error": error })
    }
}

impl From<pulseengine_mcp_server::BackendError> for DatabricksError {
    fn from(err: pulseengine_mcp_server::BackendError) -> Self {
        DatabricksError::Mcp(err.to_string())
    }
}

impl From<DatabricksError> for pulseengine_mcp_protocol::Error {
    fn from(err: DatabricksError) -> Self {
        match err {
            DatabricksError::InvalidParams(msg) => pulseengine_mcp_protocol::Error::invalid_params(msg),
            other => pulseengine_mcp_protocol::Error::internal_error(other.to_string()),
        }
    }
}
