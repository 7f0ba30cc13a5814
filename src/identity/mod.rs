//! Session identity for the administration client: who is logged in, how the
//! session is persisted, how it is created and torn down, and which views it
//! may reach. Keep the public surface thin and split implementation across
//! sub-modules.

mod user;
mod storage;
mod session;
mod provider;
mod authorizer;

pub use user::{Role, User, UserPatch};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};
pub use session::{SessionSnapshot, SessionStore};
pub use provider::{Authenticator, LoginRequest, LoginResponse};
pub use authorizer::{
    classify_route, guard_route, require_admin_tier, require_auth, GuardDecision, RouteKind, LOGIN_PATH,
    REGISTER_PATH, ROOT_PATH, UNAUTHORIZED_PATH,
};
