//! Client core of the waste-management administration platform: the
//! persisted login session, the credential exchange, an authenticated REST
//! pipeline that survives access-token expiry, and role-gated route guards.

pub mod api;
pub mod config;
pub mod error;
pub mod identity;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use identity::{Authenticator, GuardDecision, Role, SessionStore, User};
