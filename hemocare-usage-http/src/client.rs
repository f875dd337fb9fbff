use crate::wire;
use crate::{ClientError, Result};
use async_trait::async_trait;
use hemocare_secure_spec::{RemoteUsage, RemoteUsageReport, UsageError, UsageResult};
use reqwest::Url;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

const GET_USAGE_PATH: &str = "rest/v1/rpc/get_chat_usage";
const RECORD_MESSAGE_PATH: &str = "rest/v1/rpc/record_chat_message";

/// Per-request timeout applied unless overridden.
///
/// The app itself enforces no timeout on usage calls. The client bounds them
/// so a hung backend turns into a transport error, which the quota tracker
/// answers from the local counter.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated session attached to usage requests.
#[derive(Clone, PartialEq, Eq)]
pub struct UsageSession {
    pub access_token: String,
    pub user_id: String,
}

impl UsageSession {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Debug for UsageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageSession")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Remote usage counter reached over the backend's RPC endpoints.
///
/// Clones share the session slot, so signing in or out through one handle
/// is seen by all.
#[derive(Clone)]
pub struct RpcUsageClient {
    base_url: Url,
    client: reqwest::Client,
    api_key: String,
    session: Arc<RwLock<Option<UsageSession>>>,
    timeout: Duration,
}

impl RpcUsageClient {
    /// Build a client for the backend at `base_url` using its public API key.
    pub fn new(base_url: impl AsRef<str>, api_key: impl Into<String>) -> Result<Self> {
        let mut url = Url::parse(base_url.as_ref())
            .map_err(|err| ClientError::InvalidConfig(format!("base url: {err}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("hemocare-usage-http/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: url,
            client,
            api_key: api_key.into(),
            session: Arc::new(RwLock::new(None)),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Client configured from the environment.
    ///
    /// * `HEMOCARE_BACKEND_URL` (required) is the backend base URL.
    /// * `HEMOCARE_BACKEND_ANON_KEY` (required) is the public API key.
    /// * `HEMOCARE_ACCESS_TOKEN` and `HEMOCARE_USER_ID` attach a session
    ///   when both are present.
    pub fn from_env() -> Result<Self> {
        let base_url = required_env("HEMOCARE_BACKEND_URL")?;
        let api_key = required_env("HEMOCARE_BACKEND_ANON_KEY")?;
        let client = Self::new(base_url, api_key)?;
        if let (Some(token), Some(user_id)) = (
            optional_env("HEMOCARE_ACCESS_TOKEN"),
            optional_env("HEMOCARE_USER_ID"),
        ) {
            client.set_session(UsageSession::new(token, user_id));
        }
        Ok(client)
    }

    /// Override the request timeout (default [`DEFAULT_TIMEOUT`]). An expired
    /// timeout is reported as [`UsageError::Transport`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session(self, session: UsageSession) -> Self {
        self.set_session(session);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_session(&self, session: UsageSession) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn clear_session(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn session(&self) -> Option<UsageSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn call(&self, path: &str) -> UsageResult<reqwest::Response> {
        let session = self.session().ok_or(UsageError::NoSession)?;
        let url = self
            .base_url
            .join(path)
            .map_err(|err| UsageError::InvalidResponse(err.to_string()))?;
        debug!(rpc = path, "calling usage backend");
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await
    }
}

#[async_trait]
impl RemoteUsage for RpcUsageClient {
    async fn current_identity(&self) -> UsageResult<Option<String>> {
        Ok(self.session().map(|session| session.user_id))
    }

    async fn get_chat_usage(&self) -> UsageResult<RemoteUsageReport> {
        let response = self.call(GET_USAGE_PATH).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(wire::UsageRows::Many(Vec::new()).into_report());
        }
        let rows: Option<wire::UsageRows> = serde_json::from_slice(&bytes)
            .map_err(|err| UsageError::InvalidResponse(err.to_string()))?;
        Ok(rows
            .unwrap_or(wire::UsageRows::Many(Vec::new()))
            .into_report())
    }

    async fn record_chat_message(&self) -> UsageResult<()> {
        self.call(RECORD_MESSAGE_PATH).await?;
        Ok(())
    }
}

impl fmt::Debug for RpcUsageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcUsageClient")
            .field("base_url", &self.base_url.as_str())
            .field("session", &self.session())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn transport(err: reqwest::Error) -> UsageError {
    UsageError::Transport(err.to_string())
}

async fn ensure_success(response: reqwest::Response) -> UsageResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let bytes = response.bytes().await.map_err(transport)?;
    let message = serde_json::from_slice::<wire::ErrorResponse>(&bytes)
        .ok()
        .and_then(wire::ErrorResponse::describe)
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).to_string());
    Err(UsageError::Backend {
        status: status.as_u16(),
        message,
    })
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn required_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| ClientError::InvalidConfig(format!("{name} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = RpcUsageClient::new("https://db.example.test/project", "anon").unwrap();
        assert_eq!(
            client.base_url().join(GET_USAGE_PATH).unwrap().as_str(),
            "https://db.example.test/project/rest/v1/rpc/get_chat_usage"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            RpcUsageClient::new("not a url", "anon"),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn clones_share_session() {
        let client = RpcUsageClient::new("https://db.example.test", "anon").unwrap();
        let other = client.clone();
        client.set_session(UsageSession::new("token", "user-1"));
        assert_eq!(other.session().unwrap().user_id, "user-1");
        other.clear_session();
        assert!(client.session().is_none());
    }

    #[test]
    fn debug_hides_token() {
        let client = RpcUsageClient::new("https://db.example.test", "anon")
            .unwrap()
            .with_session(UsageSession::new("secret-token", "user-1"));
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn missing_session_is_reported() {
        let client = RpcUsageClient::new("https://db.example.test", "anon").unwrap();
        assert_eq!(client.current_identity().await.unwrap(), None);
        assert_eq!(
            client.get_chat_usage().await.unwrap_err(),
            UsageError::NoSession
        );
    }
}
