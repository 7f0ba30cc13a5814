use std::sync::Arc;

use reqwest::{header, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::body::{parse_lenient, request_error_message};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, GENERIC_REQUEST_FAILURE};
use crate::identity::SessionStore;

/// Credential endpoints sit at fixed paths under the base URL; they do not
/// move with the configurable resource prefix.
pub const LOGIN_ENDPOINT: &str = "/api/auth/login";
pub const REFRESH_ENDPOINT: &str = "/api/auth/refresh";

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// Authenticated JSON client for the backend API.
///
/// Every call carries the session's bearer token. A 401 triggers one refresh
/// exchange (when a refresh token is held) and one retry of the original
/// call; a second 401 is returned to the caller like any other failure.
pub struct ApiClient {
    base_url: String,
    api_prefix: String,
    http: reqwest::Client,
    session: Arc<SessionStore>,
    refresh_gate: Option<Mutex<()>>,
    logout_on_refresh_failure: bool,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Self::with_http_client(config, session, http)
    }

    pub fn with_http_client(config: &ClientConfig, session: Arc<SessionStore>, http: reqwest::Client) -> ClientResult<Self> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| ClientError::config(format!("invalid base URL '{}': {}", config.base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::config(format!("unsupported scheme '{}'", base.scheme())));
        }
        let prefix = config.api_prefix.trim().trim_end_matches('/');
        let api_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        Ok(Self {
            base_url: base.as_str().trim_end_matches('/').to_string(),
            api_prefix,
            http,
            session,
            refresh_gate: config.single_flight_refresh.then(|| Mutex::new(())),
            logout_on_refresh_failure: config.logout_on_refresh_failure,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }

    pub fn base_url(&self) -> &str { &self.base_url }

    /// Absolute URL of a resource path under the API prefix.
    pub fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.join(&self.api_prefix, path)
    }

    /// Absolute URL of an auth endpoint such as [`LOGIN_ENDPOINT`], resolved
    /// against the base URL alone.
    pub fn auth_endpoint(&self, path: &str) -> ClientResult<Url> {
        self.join("", path)
    }

    fn join(&self, prefix: &str, path: &str) -> ClientResult<Url> {
        let mut s = String::with_capacity(self.base_url.len() + prefix.len() + path.len() + 1);
        s.push_str(&self.base_url);
        s.push_str(prefix);
        if !path.starts_with('/') {
            s.push('/');
        }
        s.push_str(path);
        Url::parse(&s).map_err(|e| ClientError::config(format!("invalid request URL '{}': {}", s, e)))
    }

    /// Single HTTP exchange: JSON content type, optional bearer, no retry.
    pub(crate) async fn send(
        &self,
        method: &Method,
        url: Url,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let mut req = self
            .http
            .request(method.clone(), url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        Ok(req.send().await?)
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ClientResult<Value> {
        let token = self.session.access_token();
        debug!(target: "wastems::api", "api.request {} {} auth={}", method, path, token.is_some());
        let url = self.endpoint(path)?;
        let mut resp = self.send(&method, url.clone(), body, token.as_deref()).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            if let Some(fresh) = self.recover_unauthorized(token.as_deref()).await {
                debug!(target: "wastems::api", "api.retry {} {}", method, path);
                resp = self.send(&method, url, body, Some(&fresh)).await?;
            }
        }
        Self::finish(resp).await
    }

    /// Obtain a token to retry with after a 401, or `None` when the original
    /// failure should stand.
    async fn recover_unauthorized(&self, stale: Option<&str>) -> Option<String> {
        if self.session.refresh_token().is_none() {
            debug!(target: "wastems::api", "api.unauthorized: no refresh token held");
            return None;
        }
        let outcome = match &self.refresh_gate {
            Some(gate) => {
                let _held = gate.lock().await;
                match self.session.access_token() {
                    // Another caller rotated the token while we waited.
                    Some(current) if stale != Some(current.as_str()) => Ok(current),
                    _ => self.refresh().await,
                }
            }
            None => self.refresh().await,
        };
        match outcome {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(target: "wastems::api", "api.refresh failed: {}", e);
                if self.logout_on_refresh_failure {
                    self.session.clear_session();
                }
                None
            }
        }
    }

    /// Exchange the held refresh token for a new access token and store it.
    pub async fn refresh(&self) -> ClientResult<String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| ClientError::refresh("no refresh token held"))?;
        let body = json!({ "refreshToken": refresh_token });
        let url = self.auth_endpoint(REFRESH_ENDPOINT)?;
        let resp = self.send(&Method::POST, url, Some(&body), None).await?;
        let status = resp.status();
        let payload = parse_lenient(&resp.bytes().await?);
        if !status.is_success() {
            let message = request_error_message(&payload).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ClientError::refresh(message));
        }
        let parsed: RefreshResponse = serde_json::from_value(payload)
            .map_err(|e| ClientError::refresh(format!("malformed refresh response: {}", e)))?;
        let token = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::refresh("refresh response carries no token"))?;
        let rotated = parsed.refresh_token.is_some();
        if !self.session.replace_tokens(token.clone(), parsed.refresh_token) {
            return Err(ClientError::refresh("session ended while refreshing"));
        }
        info!(target: "wastems::api", "api.refresh ok refresh_rotated={}", rotated);
        Ok(token)
    }

    async fn finish(resp: reqwest::Response) -> ClientResult<Value> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let body = parse_lenient(&bytes);
            let message = request_error_message(&body).unwrap_or_else(|| GENERIC_REQUEST_FAILURE.to_string());
            debug!(target: "wastems::api", "api.error status={} message={}", status.as_u16(), message);
            return Err(ClientError::Request { status: status.as_u16(), message, body });
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get(&self, path: &str) -> ClientResult<Value> {
        self.request(Method::GET, path, None).await
    }

    /// POST with `body`, or `{}` when none is given.
    pub async fn post(&self, path: &str, body: Option<Value>) -> ClientResult<Value> {
        let body = body.unwrap_or_else(|| Value::Object(Map::new()));
        self.request(Method::POST, path, Some(&body)).await
    }

    /// PUT with `body`, or `{}` when none is given.
    pub async fn put(&self, path: &str, body: Option<Value>) -> ClientResult<Value> {
        let body = body.unwrap_or_else(|| Value::Object(Map::new()));
        self.request(Method::PUT, path, Some(&body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<Value> {
        self.request(Method::DELETE, path, None).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        Ok(serde_json::from_value(self.get(path).await?)?)
    }

    pub async fn post_as<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        let body = serde_json::to_value(body)?;
        Ok(serde_json::from_value(self.request(Method::POST, path, Some(&body)).await?)?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("single_flight_refresh", &self.refresh_gate.is_some())
            .field("logout_on_refresh_failure", &self.logout_on_refresh_failure)
            .finish()
    }
}
