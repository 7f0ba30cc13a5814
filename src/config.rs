//! Client configuration: defaults, builder-style overrides and environment
//! loading (`WASTEMS_*` variables).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_SESSION_FILE: &str = "wastems-session.json";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Scheme, host and port of the backend, without the API prefix.
    pub base_url: String,
    /// Prefix every resource path is issued under. The auth endpoints do not use it.
    #[serde(default = "ClientConfig::default_api_prefix")]
    pub api_prefix: String,
    /// Where the CLI keeps its persisted session.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    /// Let concurrent 401s share one refresh exchange instead of each issuing
    /// their own.
    #[serde(default = "ClientConfig::default_single_flight")]
    pub single_flight_refresh: bool,
    /// Drop the session when the refresh endpoint rejects the refresh token.
    #[serde(default)]
    pub logout_on_refresh_failure: bool,
}

impl ClientConfig {
    fn default_api_prefix() -> String { DEFAULT_API_PREFIX.to_string() }
    fn default_single_flight() -> bool { true }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn with_single_flight_refresh(mut self, enabled: bool) -> Self {
        self.single_flight_refresh = enabled;
        self
    }

    pub fn with_logout_on_refresh_failure(mut self, enabled: bool) -> Self {
        self.logout_on_refresh_failure = enabled;
        self
    }

    /// Defaults overlaid with `WASTEMS_API_URL`, `WASTEMS_API_PREFIX`,
    /// `WASTEMS_SESSION_FILE`, `WASTEMS_REFRESH_SINGLE_FLIGHT` and
    /// `WASTEMS_LOGOUT_ON_REFRESH_FAILURE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("WASTEMS_API_URL").filter(|v| !v.trim().is_empty()) {
            cfg.base_url = v.trim().to_string();
        }
        if let Some(v) = lookup("WASTEMS_API_PREFIX") {
            cfg.api_prefix = v.trim().to_string();
        }
        if let Some(v) = lookup("WASTEMS_SESSION_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.session_file = Some(PathBuf::from(v.trim()));
        }
        if let Some(b) = lookup("WASTEMS_REFRESH_SINGLE_FLIGHT").and_then(|v| parse_flag(&v)) {
            cfg.single_flight_refresh = b;
        }
        if let Some(b) = lookup("WASTEMS_LOGOUT_ON_REFRESH_FAILURE").and_then(|v| parse_flag(&v)) {
            cfg.logout_on_refresh_failure = b;
        }
        cfg
    }

    pub fn session_file_or_default(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_prefix: Self::default_api_prefix(),
            session_file: None,
            single_flight_refresh: Self::default_single_flight(),
            logout_on_refresh_failure: false,
        }
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
