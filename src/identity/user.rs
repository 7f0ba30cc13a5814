use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of account roles. `Admin` satisfies every role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Worker,
    Champion,
    Supervisor,
    UlbAdmin,
    Admin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Citizen,
        Role::Worker,
        Role::Champion,
        Role::Supervisor,
        Role::UlbAdmin,
        Role::Admin,
    ];

    /// Wire name, as stored in the persisted `user` record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Worker => "worker",
            Role::Champion => "champion",
            Role::Supervisor => "supervisor",
            Role::UlbAdmin => "ulb_admin",
            Role::Admin => "admin",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Citizen => "Citizen",
            Role::Worker => "Waste Worker",
            Role::Champion => "Green Champion",
            Role::Supervisor => "Supervisor",
            Role::UlbAdmin => "ULB Admin",
            Role::Admin => "System Admin",
        }
    }

    /// Whether a user holding `self` passes a check requiring `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        *self == Role::Admin || *self == required
    }

    pub fn is_admin_tier(&self) -> bool {
        matches!(self, Role::Admin | Role::UlbAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Identity record of the logged-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Any further fields the server sends (ward, phone, ...), kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
            role,
            permissions: BTreeSet::new(),
            extra: Map::new(),
        }
    }

    pub fn has_permission(&self, capability: &str) -> bool {
        self.role == Role::Admin || self.permissions.contains(capability)
    }

    /// Shallow merge: every field set on the patch replaces the current value,
    /// extra keys overwrite or add top-level entries.
    pub fn apply(&mut self, patch: UserPatch) {
        let UserPatch { display_name, email, role, permissions, extra } = patch;
        if let Some(v) = display_name { self.display_name = v; }
        if let Some(v) = email { self.email = v; }
        if let Some(v) = role { self.role = v; }
        if let Some(v) = permissions { self.permissions = v; }
        self.extra.extend(extra);
    }
}

/// Partial user update for profile edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
