//! Unified client error model.
//! One enum covers login, the request pipeline, the refresh exchange and the
//! storage adapters, with helpers mapping each case to a stable code.

use serde_json::Value;

/// Message used when a failed response carries no usable error text.
pub const GENERIC_REQUEST_FAILURE: &str = "Request failed";
/// Message used when a failed login carries no usable error text.
pub const GENERIC_LOGIN_FAILURE: &str = "Login failed";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Credential exchange failed: bad credentials, server error or a
    /// success status whose body lacks `user`/`token`.
    #[error("{message}")]
    Authentication { message: String },

    /// Non-2xx response from a resource call after the retry policy ran.
    #[error("{message}")]
    Request { status: u16, message: String, body: Value },

    /// The refresh endpoint rejected the refresh token or answered with a
    /// malformed body. Internal to the pipeline.
    #[error("token refresh failed: {message}")]
    Refresh { message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session storage error: {message}")]
    Storage { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    pub fn authentication<S: Into<String>>(msg: S) -> Self { ClientError::Authentication { message: msg.into() } }
    pub fn refresh<S: Into<String>>(msg: S) -> Self { ClientError::Refresh { message: msg.into() } }
    pub fn storage<S: Into<String>>(msg: S) -> Self { ClientError::Storage { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { ClientError::Config { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            ClientError::Authentication { .. } => "authentication_error",
            ClientError::Request { .. } => "request_error",
            ClientError::Refresh { .. } => "refresh_failure",
            ClientError::Transport(_) => "transport_error",
            ClientError::Decode(_) => "decode_error",
            ClientError::Storage { .. } => "storage_error",
            ClientError::Config { .. } => "config_error",
        }
    }

    /// HTTP status associated with the failure. Request errors report the
    /// status the server answered with; local failures map to a nearby code.
    pub fn http_status(&self) -> u16 {
        match self {
            ClientError::Authentication { .. } => 401,
            ClientError::Request { status, .. } => *status,
            ClientError::Refresh { .. } => 401,
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()).unwrap_or(503),
            ClientError::Decode(_) => 502,
            ClientError::Storage { .. } => 500,
            ClientError::Config { .. } => 400,
        }
    }

    /// True for a request rejected with 401 even after the refresh-and-retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Request { status: 401, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage { message: err.to_string() }
    }
}
