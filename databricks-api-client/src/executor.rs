//! Request executor - authenticates, sends and retries workspace API calls

use crate::auth::CredentialProvider;
use crate::clock::Clock;
use crate::retry::RetryPolicy;
use databricks_mcp_shared::{redact, ApiError, Credential, HttpConfig, RequestSpec, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};
use url::Url;

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 401/403: the credential was rejected
    AuthRejected,
    /// 429 and 5xx
    Transient,
    /// Any other status; never retried
    ClientError,
}

pub fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StatusClass::AuthRejected
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::ClientError
    }
}

/// Result of a single attempt
#[derive(Debug)]
enum Outcome {
    Success(Value),
    AuthRejected { status: u16, body: String },
    Transient { status: Option<u16>, body: String },
    ClientError { status: u16, body: String },
    Malformed(String),
}

/// Last retryable failure seen, reported once the budget runs out
#[derive(Debug, Default)]
struct LastFailure {
    status: Option<u16>,
    body: String,
}

/// Executes workspace REST calls under `{workspace}/api/2.0`
pub struct RequestExecutor {
    api_base: Url,
    credentials: CredentialProvider,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    request_timeout: Duration,
    http: OnceCell<Client>,
}

impl RequestExecutor {
    pub fn new(
        workspace_url: &Url,
        credentials: CredentialProvider,
        clock: Arc<dyn Clock>,
        http: &HttpConfig,
    ) -> Result<Self> {
        Ok(Self {
            api_base: workspace_url.join("api/2.0/")?,
            credentials,
            clock,
            policy: RetryPolicy::from_config(http),
            request_timeout: http.request_timeout(),
            http: OnceCell::new(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one logical API call to completion.
    ///
    /// Returns the parsed JSON body (`{}` for an empty body) or a terminal
    /// [`ApiError`]. Retries are internal.
    pub async fn execute(&self, spec: &RequestSpec) -> std::result::Result<Value, ApiError> {
        let url = self.endpoint(spec)?;
        let client = self.http_client().await?;
        let mut last = LastFailure::default();

        for attempt in 1..=self.policy.max_attempts {
            let credential = self.credentials.get_credential().await.map_err(|e| {
                error!(method = %spec.method, path = %spec.path, "Could not obtain credential: {}", e);
                ApiError::Auth(e)
            })?;

            debug!(
                method = %spec.method,
                path = %spec.path,
                attempt,
                max_attempts = self.policy.max_attempts,
                "Sending API request"
            );

            match self.attempt(client, spec, &url, &credential).await {
                Outcome::Success(payload) => return Ok(payload),
                Outcome::ClientError { status, body } => {
                    warn!(method = %spec.method, path = %spec.path, status, "API request rejected");
                    return Err(ApiError::Client { status, body });
                }
                Outcome::Malformed(message) => {
                    error!(method = %spec.method, path = %spec.path, "Unparseable API response: {}", message);
                    return Err(ApiError::Transport(message));
                }
                Outcome::AuthRejected { status, body } => {
                    warn!(
                        method = %spec.method,
                        path = %spec.path,
                        status,
                        attempt,
                        "Credential rejected, invalidating"
                    );
                    self.credentials.invalidate_if_current(&credential);
                    last = LastFailure {
                        status: Some(status),
                        body,
                    };
                }
                Outcome::Transient { status, body } => {
                    last = LastFailure { status, body };
                    if self.policy.has_attempts_after(attempt) {
                        let delay = self.policy.backoff(attempt);
                        warn!(
                            method = %spec.method,
                            path = %spec.path,
                            status = ?last.status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Transient API failure, retrying"
                        );
                        self.clock.sleep(delay).await;
                    }
                }
            }
        }

        error!(
            method = %spec.method,
            path = %spec.path,
            status = ?last.status,
            attempts = self.policy.max_attempts,
            "API request failed after exhausting retries"
        );
        Err(ApiError::RetriesExhausted {
            last_status: last.status,
            last_body: last.body,
            attempts: self.policy.max_attempts,
        })
    }

    async fn attempt(
        &self,
        client: &Client,
        spec: &RequestSpec,
        url: &Url,
        credential: &Credential,
    ) -> Outcome {
        let mut request = client
            .request(spec.method.clone(), url.clone())
            .header(reqwest::header::AUTHORIZATION, credential.authorization_header());

        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Outcome::Transient {
                    status: None,
                    body: redact::diagnostic_body(&e.to_string()),
                }
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Outcome::Transient {
                    status: Some(status.as_u16()),
                    body: redact::diagnostic_body(&e.to_string()),
                }
            }
        };

        match classify(status) {
            StatusClass::Success => parse_payload(&text),
            StatusClass::AuthRejected => Outcome::AuthRejected {
                status: status.as_u16(),
                body: redact::diagnostic_body(&text),
            },
            StatusClass::Transient => Outcome::Transient {
                status: Some(status.as_u16()),
                body: redact::diagnostic_body(&text),
            },
            StatusClass::ClientError => Outcome::ClientError {
                status: status.as_u16(),
                body: redact::diagnostic_body(&text),
            },
        }
    }

    fn endpoint(&self, spec: &RequestSpec) -> std::result::Result<Url, ApiError> {
        let mut url = self
            .api_base
            .join(spec.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport(format!("invalid request path '{}': {e}", spec.path)))?;

        if !spec.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(spec.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        Ok(url)
    }

    /// Shared connection pool, built on first use
    async fn http_client(&self) -> std::result::Result<&Client, ApiError> {
        self.http
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(self.request_timeout)
                    .build()
                    .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))
            })
            .await
    }
}

fn parse_payload(text: &str) -> Outcome {
    if text.trim().is_empty() {
        return Outcome::Success(Value::Object(serde_json::Map::new()));
    }

    match serde_json::from_str(text) {
        Ok(payload) => Outcome::Success(payload),
        Err(e) => Outcome::Malformed(format!(
            "{e}; body: {}",
            redact::diagnostic_body(text)
        )),
    }
}
