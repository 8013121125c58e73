//! Credential acquisition and caching
//!
//! [`CredentialProvider`] hands out bearer credentials for the workspace. In
//! static mode it returns the configured personal access token. In OAuth mode
//! it runs the client-credentials grant against the workspace identity
//! endpoint, caches the access token until shortly before it expires, and
//! makes sure that only one refresh is ever in flight: callers arriving while
//! a refresh is running await that refresh instead of starting their own.
//!
//! The refresh runs on its own task, so a caller that gives up waiting does
//! not cancel it for everyone else.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use databricks_mcp_shared::{
    jwt, redact, AuthError, Credential, DatabricksError, HttpConfig, Result, WorkspaceConfig,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Lifetime assumed when the identity endpoint reports no `expires_in` and
/// the token carries no `exp` claim.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Client-credentials settings for a service principal
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: Url,
    pub scope: String,
}

impl OAuthClientConfig {
    /// Build a config whose token endpoint is `{workspace}/oidc/v1/token`
    pub fn new(
        workspace_url: &Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: workspace_url.join("oidc/v1/token")?,
            scope: scope.into(),
        })
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Which authentication mode the provider runs in
#[derive(Debug, Clone)]
pub enum AuthConfig {
    StaticToken(String),
    OAuth(OAuthClientConfig),
}

impl AuthConfig {
    /// Select the authentication mode from workspace settings.
    ///
    /// A personal access token takes precedence over OAuth client settings.
    pub fn from_workspace(workspace: &WorkspaceConfig) -> Result<Self> {
        if let Some(token) = workspace.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(AuthConfig::StaticToken(token.to_string()));
        }

        match (
            workspace.client_id.as_deref().filter(|v| !v.is_empty()),
            workspace.client_secret.as_deref().filter(|v| !v.is_empty()),
        ) {
            (Some(client_id), Some(client_secret)) => {
                let workspace_url = workspace.base_url()?;
                Ok(AuthConfig::OAuth(OAuthClientConfig::new(
                    &workspace_url,
                    client_id,
                    client_secret,
                    workspace.oauth_scope.clone(),
                )?))
            }
            _ => Err(DatabricksError::Config(
                "no credentials configured: set a personal access token or an OAuth client id and secret"
                    .to_string(),
            )),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

type RefreshFuture = Shared<BoxFuture<'static, std::result::Result<Arc<Credential>, AuthError>>>;

#[derive(Default)]
struct CacheState {
    cached: Option<Arc<Credential>>,
    in_flight: Option<RefreshFuture>,
}

enum Mode {
    Static(Arc<Credential>),
    OAuth(OAuthClientConfig),
}

struct ProviderInner {
    mode: Mode,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    request_timeout: Duration,
    http: OnceCell<Client>,
    state: Mutex<CacheState>,
}

/// Produces currently valid bearer credentials. Cheap to clone; clones share
/// the same cache and in-flight refresh.
#[derive(Clone)]
pub struct CredentialProvider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.inner.mode {
            Mode::Static(_) => "static",
            Mode::OAuth(_) => "oauth",
        };
        f.debug_struct("CredentialProvider")
            .field("mode", &mode)
            .field("refresh_margin", &self.inner.refresh_margin)
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(auth: AuthConfig, http: &HttpConfig, clock: Arc<dyn Clock>) -> Self {
        let mode = match auth {
            AuthConfig::StaticToken(token) => Mode::Static(Arc::new(Credential::static_token(token))),
            AuthConfig::OAuth(config) => Mode::OAuth(config),
        };

        Self {
            inner: Arc::new(ProviderInner {
                mode,
                clock,
                refresh_margin: http.token_refresh_margin(),
                request_timeout: http.request_timeout(),
                http: OnceCell::new(),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Return a credential that has not expired, refreshing if needed.
    pub async fn get_credential(&self) -> std::result::Result<Arc<Credential>, AuthError> {
        let config = match &self.inner.mode {
            Mode::Static(credential) => return Ok(Arc::clone(credential)),
            Mode::OAuth(config) => config,
        };

        let refresh = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now();

            if let Some(credential) = state
                .cached
                .as_ref()
                .filter(|c| c.is_fresh_at(now, self.inner.refresh_margin))
            {
                return Ok(Arc::clone(credential));
            }

            match state.in_flight.clone() {
                Some(refresh) => {
                    debug!("Joining in-flight token refresh");
                    refresh
                }
                None => {
                    let refresh = self.spawn_refresh(config.clone());
                    state.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Drop the cached credential so the next call refreshes. No-op for
    /// static tokens.
    pub fn invalidate(&self) {
        if let Mode::OAuth(_) = self.inner.mode {
            debug!("Invalidating cached OAuth token");
            self.inner.lock_state().cached = None;
        }
    }

    /// Drop the cached credential only if it is still `rejected`.
    ///
    /// Several requests can be rejected with the same stale token; once one
    /// of them has triggered a refresh, the later rejections must not discard
    /// the replacement.
    pub fn invalidate_if_current(&self, rejected: &Arc<Credential>) {
        if let Mode::OAuth(_) = self.inner.mode {
            let mut state = self.inner.lock_state();
            if state
                .cached
                .as_ref()
                .is_some_and(|cached| Arc::ptr_eq(cached, rejected))
            {
                debug!("Invalidating rejected OAuth token");
                state.cached = None;
            }
        }
    }

    fn spawn_refresh(&self, config: OAuthClientConfig) -> RefreshFuture {
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let result = inner.fetch_credential(&config).await.map(Arc::new);

            let mut state = inner.lock_state();
            if let Ok(credential) = &result {
                state.cached = Some(Arc::clone(credential));
            }
            state.in_flight = None;
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(AuthError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

impl ProviderInner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn http_client(&self) -> std::result::Result<&Client, AuthError> {
        self.http
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(self.request_timeout)
                    .build()
                    .map_err(|e| AuthError::Request(format!("failed to build HTTP client: {e}")))
            })
            .await
    }

    async fn fetch_credential(
        &self,
        config: &OAuthClientConfig,
    ) -> std::result::Result<Credential, AuthError> {
        let client = self.http_client().await?;

        info!(
            endpoint = %config.token_endpoint,
            client_id = %config.client_id,
            "Requesting OAuth access token"
        );

        let response = client
            .post(config.token_endpoint.clone())
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!("Token request failed: {}", e);
                AuthError::Request(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !status.is_success() {
            let body = redact::diagnostic_body(&body);
            warn!(status = status.as_u16(), "Identity endpoint rejected token request");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "access_token is empty".to_string(),
            ));
        }

        let lifetime = token_lifetime(&token, self.clock.utc_now());
        if lifetime.is_zero() {
            return Err(AuthError::MalformedResponse(
                "token is already expired".to_string(),
            ));
        }

        info!(lifetime_secs = lifetime.as_secs(), "Obtained OAuth access token");
        Ok(Credential::oauth(
            token.access_token,
            self.clock.now() + lifetime,
        ))
    }
}

/// `expires_in`, else the JWT `exp` claim, else [`DEFAULT_TOKEN_LIFETIME`]
fn token_lifetime(token: &TokenResponse, now: DateTime<Utc>) -> Duration {
    if let Some(seconds) = token.expires_in {
        return Duration::from_secs(seconds);
    }

    if let Some(expiry) = jwt::unverified_expiry(&token.access_token) {
        return expiry
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    debug!(
        "Token response has no expires_in; assuming {}s",
        DEFAULT_TOKEN_LIFETIME.as_secs()
    );
    DEFAULT_TOKEN_LIFETIME
}
