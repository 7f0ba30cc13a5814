//! Navigation gates. Every function here is a pure decision over the session
//! snapshot; performing the redirect is left to the caller.

use super::session::SessionSnapshot;
use super::user::{Role, User};

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session restore has not finished; show a neutral placeholder.
    Wait,
    Render,
    Redirect(&'static str),
}

impl GuardDecision {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match *self {
            GuardDecision::Redirect(t) => Some(t),
            GuardDecision::Wait | GuardDecision::Render => None,
        }
    }
}

/// Gate for views that need a logged-in user, optionally of a given role.
/// `Admin` passes any role requirement.
pub fn require_auth(user: Option<&User>, loading: bool, required: Option<Role>) -> GuardDecision {
    if loading {
        return GuardDecision::Wait;
    }
    let Some(user) = user else { return GuardDecision::Redirect(LOGIN_PATH) };
    match required {
        Some(role) if !user.role.satisfies(role) => GuardDecision::Redirect(UNAUTHORIZED_PATH),
        _ => GuardDecision::Render,
    }
}

/// Gate for the administration area: `admin` or `ulb_admin` only. Other
/// authenticated users are sent back to the root view.
pub fn require_admin_tier(user: Option<&User>, loading: bool) -> GuardDecision {
    if loading {
        return GuardDecision::Wait;
    }
    match user {
        None => GuardDecision::Redirect(LOGIN_PATH),
        Some(u) if u.role.is_admin_tier() => GuardDecision::Render,
        Some(_) => GuardDecision::Redirect(ROOT_PATH),
    }
}

/// Which gate protects a client route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Public,
    Dashboard,
    Admin,
    Unknown,
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify_route(path: &str) -> RouteKind {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    match trimmed {
        "" | ROOT_PATH | LOGIN_PATH | REGISTER_PATH | UNAUTHORIZED_PATH => RouteKind::Public,
        p if under(p, "/admin") => RouteKind::Admin,
        p if under(p, "/dashboard") => RouteKind::Dashboard,
        _ => RouteKind::Unknown,
    }
}

/// Apply the application's route table to a navigation target.
pub fn guard_route(path: &str, user: Option<&User>, loading: bool) -> GuardDecision {
    match classify_route(path) {
        RouteKind::Public => GuardDecision::Render,
        RouteKind::Dashboard => require_auth(user, loading, None),
        RouteKind::Admin => require_admin_tier(user, loading),
        RouteKind::Unknown => GuardDecision::Redirect(ROOT_PATH),
    }
}

impl SessionSnapshot {
    pub fn require_auth(&self, required: Option<Role>) -> GuardDecision {
        require_auth(self.user.as_ref(), self.loading, required)
    }

    pub fn require_admin_tier(&self) -> GuardDecision {
        require_admin_tier(self.user.as_ref(), self.loading)
    }

    pub fn guard_route(&self, path: &str) -> GuardDecision {
        guard_route(path, self.user.as_ref(), self.loading)
    }
}
