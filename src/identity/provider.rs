use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::session::SessionStore;
use super::user::{User, UserPatch};
use crate::api::body::{login_error_message, parse_lenient};
use crate::api::{ApiClient, LOGIN_ENDPOINT};
use crate::error::{ClientError, ClientResult, GENERIC_LOGIN_FAILURE};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Success shape of the credential exchange. Everything is optional so a
/// malformed body can be reported as a login failure rather than a decode
/// error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Login and logout transitions of the session.
#[derive(Debug, Clone)]
pub struct Authenticator {
    api: Arc<ApiClient>,
}

impl Authenticator {
    pub fn new(api: Arc<ApiClient>) -> Self { Self { api } }

    pub fn session(&self) -> &Arc<SessionStore> { self.api.session() }

    /// Exchange credentials for a session. The store is written only once the
    /// server has confirmed success and sent both `user` and `token`; any
    /// other outcome leaves the previous session as it was.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let req = LoginRequest { email: email.to_string(), password: password.to_string() };
        let body = serde_json::to_value(&req)?;
        let url = self.api.auth_endpoint(LOGIN_ENDPOINT)?;
        let resp = self.api.send(&Method::POST, url, Some(&body), None).await?;
        let status = resp.status();
        let payload = parse_lenient(&resp.bytes().await?);

        let reject = |payload: &Value| {
            let message = login_error_message(payload).unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string());
            warn!(target: "wastems::auth", "auth.login rejected status={} message={}", status.as_u16(), message);
            ClientError::authentication(message)
        };

        if !status.is_success() {
            return Err(reject(&payload));
        }
        let parsed: LoginResponse = serde_json::from_value(payload.clone()).unwrap_or_default();
        let (true, Some(raw_user), Some(token)) = (parsed.success, parsed.user, parsed.token.filter(|t| !t.is_empty())) else {
            return Err(reject(&payload));
        };
        let user: User = serde_json::from_value(raw_user).map_err(|e| {
            warn!(target: "wastems::auth", "auth.login: malformed user record: {}", e);
            ClientError::authentication(GENERIC_LOGIN_FAILURE)
        })?;

        info!(target: "wastems::auth", "auth.login user={} role={}", user.id, user.role);
        self.session().set_session(user.clone(), token, parsed.refresh_token);
        Ok(user)
    }

    /// Drop the local session. Safe to call repeatedly.
    pub fn logout(&self) {
        self.session().clear_session();
    }

    /// Apply a profile edit to the logged-in user; `None` when anonymous.
    pub fn update_profile(&self, patch: UserPatch) -> Option<User> {
        self.session().patch_user(patch)
    }
}
