use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::storage::{SessionStorage, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};
use super::user::{User, UserPatch};

#[derive(Debug, Default, Clone)]
struct SessionState {
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    loading: bool,
}

/// Point-in-time view used by the route guards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub loading: bool,
}

/// Owns "who is logged in right now" and mirrors it into durable storage.
///
/// `user` and the access token are only ever written together, so a reader
/// sees either both or neither. Storage failures are logged; the in-memory
/// copy stays authoritative.
pub struct SessionStore {
    state: RwLock<SessionState>,
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    /// Empty store in the `loading` state. Call [`initialize`](Self::initialize)
    /// before trusting it.
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            state: RwLock::new(SessionState { loading: true, ..Default::default() }),
            storage: Box::new(storage),
        }
    }

    /// `new` followed by `initialize`.
    pub fn open(storage: impl SessionStorage + 'static) -> Self {
        let store = Self::new(storage);
        store.initialize();
        store
    }

    /// Restore the persisted session. Partial or unparsable state is treated as
    /// corrupt: all three keys are cleared and the store starts anonymous.
    pub fn initialize(&self) {
        let restored = self.read_persisted();
        let mut st = self.state.write();
        match restored {
            Some((user, token, refresh)) => {
                info!(target: "wastems::session", "session.restore user={} role={}", user.id, user.role);
                st.user = Some(user);
                st.access_token = Some(token);
                st.refresh_token = refresh;
            }
            None => {
                st.user = None;
                st.access_token = None;
                st.refresh_token = None;
                self.remove_all_keys();
            }
        }
        st.loading = false;
    }

    fn read_persisted(&self) -> Option<(User, String, Option<String>)> {
        let read = |key: &str| match self.storage.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "wastems::session", "session.read key={} failed: {}", key, e);
                None
            }
        };
        let raw_user = read(USER_KEY);
        let token = read(TOKEN_KEY);
        let refresh = read(REFRESH_TOKEN_KEY);
        let (Some(raw_user), Some(token)) = (raw_user, token) else {
            debug!(target: "wastems::session", "session.restore: no complete session persisted");
            return None;
        };
        match serde_json::from_str::<User>(&raw_user) {
            Ok(user) => Some((user, token, refresh)),
            Err(e) => {
                warn!(target: "wastems::session", "session.restore: persisted user is corrupt, clearing: {}", e);
                None
            }
        }
    }

    /// Replace identity and tokens in one step. A `None` refresh token keeps
    /// the held one only when the same user (by id) is already logged in;
    /// a refresh token never outlives a change of user.
    pub fn set_session(&self, user: User, access_token: impl Into<String>, refresh_token: Option<String>) {
        let access_token = access_token.into();
        let mut st = self.state.write();
        let same_user = st.user.as_ref().is_some_and(|u| u.id == user.id);
        self.persist_user(&user);
        self.persist(TOKEN_KEY, &access_token);
        match &refresh_token {
            Some(r) => self.persist(REFRESH_TOKEN_KEY, r),
            None if !same_user => self.forget(REFRESH_TOKEN_KEY),
            None => {}
        }
        info!(target: "wastems::session", "session.set user={} role={} refresh_rotated={}", user.id, user.role, refresh_token.is_some());
        st.user = Some(user);
        st.access_token = Some(access_token);
        if refresh_token.is_some() || !same_user {
            st.refresh_token = refresh_token;
        }
    }

    pub fn clear_session(&self) {
        let mut st = self.state.write();
        if let Some(u) = &st.user {
            info!(target: "wastems::session", "session.clear user={}", u.id);
        }
        st.user = None;
        st.access_token = None;
        st.refresh_token = None;
        self.remove_all_keys();
    }

    /// Merge `patch` into the current user and re-persist it. Returns the
    /// updated user, or `None` (doing nothing) when nobody is logged in.
    pub fn patch_user(&self, patch: UserPatch) -> Option<User> {
        let mut st = self.state.write();
        let user = st.user.as_mut()?;
        user.apply(patch);
        let updated = user.clone();
        self.persist_user(&updated);
        Some(updated)
    }

    /// Token rotation from the refresh flow; the user is left untouched.
    /// Returns false when the session disappeared while the refresh was in
    /// flight, in which case nothing is written.
    pub fn replace_tokens(&self, access_token: impl Into<String>, refresh_token: Option<String>) -> bool {
        let mut st = self.state.write();
        if st.user.is_none() {
            debug!(target: "wastems::session", "session.replace_tokens: no session, ignoring refreshed token");
            return false;
        }
        let access_token = access_token.into();
        self.persist(TOKEN_KEY, &access_token);
        st.access_token = Some(access_token);
        if let Some(r) = refresh_token {
            self.persist(REFRESH_TOKEN_KEY, &r);
            st.refresh_token = Some(r);
        }
        true
    }

    pub fn access_token(&self) -> Option<String> { self.state.read().access_token.clone() }

    pub fn refresh_token(&self) -> Option<String> { self.state.read().refresh_token.clone() }

    pub fn user(&self) -> Option<User> { self.state.read().user.clone() }

    pub fn is_loading(&self) -> bool { self.state.read().loading }

    pub fn is_authenticated(&self) -> bool {
        let st = self.state.read();
        st.user.is_some() && st.access_token.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.read();
        SessionSnapshot { user: st.user.clone(), loading: st.loading }
    }

    fn persist_user(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(json) => self.persist(USER_KEY, &json),
            Err(e) => warn!(target: "wastems::session", "session.persist: cannot serialize user {}: {}", user.id, e),
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(target: "wastems::session", "session.persist key={} failed: {}", key, e);
        }
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(target: "wastems::session", "session.remove key={} failed: {}", key, e);
        }
    }

    fn remove_all_keys(&self) {
        for key in [USER_KEY, TOKEN_KEY, REFRESH_TOKEN_KEY] {
            self.forget(key);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.read();
        f.debug_struct("SessionStore")
            .field("user", &st.user.as_ref().map(|u| u.id.as_str()))
            .field("has_access_token", &st.access_token.is_some())
            .field("has_refresh_token", &st.refresh_token.is_some())
            .field("loading", &st.loading)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, ClientResult};
    use crate::identity::storage::MemoryStorage;
    use crate::identity::user::Role;
    use std::sync::Arc;

    /// Shares one `MemoryStorage` between the store and the test body.
    #[derive(Clone, Default)]
    struct SharedMemory(Arc<MemoryStorage>);

    impl SessionStorage for SharedMemory {
        fn get(&self, key: &str) -> ClientResult<Option<String>> { self.0.get(key) }
        fn set(&self, key: &str, value: &str) -> ClientResult<()> { self.0.set(key, value) }
        fn remove(&self, key: &str) -> ClientResult<()> { self.0.remove(key) }
    }

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn get(&self, _key: &str) -> ClientResult<Option<String>> { Err(ClientError::storage("unreadable")) }
        fn set(&self, _key: &str, _value: &str) -> ClientResult<()> { Err(ClientError::storage("read-only")) }
        fn remove(&self, _key: &str) -> ClientResult<()> { Err(ClientError::storage("read-only")) }
    }

    fn worker() -> User { User::new("42", "Ravi", "ravi@example.org", Role::Worker) }

    fn assert_symmetric(store: &SessionStore) {
        assert_eq!(store.user().is_some(), store.access_token().is_some());
    }

    #[test]
    fn starts_loading_until_initialized() {
        let store = SessionStore::new(MemoryStorage::new());
        assert!(store.is_loading());
        store.initialize();
        assert!(!store.is_loading());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn symmetry_holds_across_set_and_clear() {
        let store = SessionStore::open(MemoryStorage::new());
        assert_symmetric(&store);
        for i in 0..5 {
            if i % 2 == 0 {
                store.set_session(worker(), format!("t{}", i), None);
            } else {
                store.clear_session();
            }
            assert_symmetric(&store);
        }
        store.set_session(worker(), "a", Some("r".into()));
        store.set_session(worker(), "b", None);
        assert_symmetric(&store);
        store.clear_session();
        store.clear_session();
        assert_symmetric(&store);
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn set_session_mirrors_into_storage() {
        let mem = SharedMemory::default();
        let store = SessionStore::open(mem.clone());
        store.set_session(worker(), "abc", Some("r1".into()));

        assert_eq!(mem.0.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));
        assert_eq!(mem.0.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
        let persisted: User = serde_json::from_str(&mem.0.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted, worker());

        // same user, omitted refresh token: the current one is kept
        store.set_session(worker(), "def", None);
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
        assert_eq!(mem.0.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));

        store.clear_session();
        assert!(mem.0.is_empty());
    }

    #[test]
    fn switching_user_drops_previous_refresh_token() {
        let mem = SharedMemory::default();
        let store = SessionStore::open(mem.clone());
        store.set_session(worker(), "abc", Some("r-worker".into()));

        let citizen = User::new("7", "Asha", "asha@example.org", Role::Citizen);
        store.set_session(citizen.clone(), "cit", None);
        assert_eq!(store.user(), Some(citizen));
        assert_eq!(store.refresh_token(), None);
        assert_eq!(mem.0.get(REFRESH_TOKEN_KEY).unwrap(), None);

        // nothing held before: still nothing afterwards
        store.clear_session();
        store.set_session(worker(), "w", None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(mem.0.get(REFRESH_TOKEN_KEY).unwrap(), None);

        let restored = SessionStore::open(mem.clone());
        assert_eq!(restored.refresh_token(), None);
    }

    #[test]
    fn restores_complete_session() {
        let user_json = serde_json::to_string(&worker()).unwrap();
        let mem = MemoryStorage::with_entries([(USER_KEY, user_json.as_str()), (TOKEN_KEY, "abc"), (REFRESH_TOKEN_KEY, "r1")]);
        let store = SessionStore::open(mem);
        assert_eq!(store.user(), Some(worker()));
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn corrupt_user_clears_everything() {
        let mem = SharedMemory(Arc::new(MemoryStorage::with_entries([
            (USER_KEY, "{not json"),
            (TOKEN_KEY, "abc"),
            (REFRESH_TOKEN_KEY, "r1"),
        ])));
        let store = SessionStore::open(mem.clone());
        assert!(!store.is_loading());
        assert_eq!(store.user(), None);
        assert_eq!(store.access_token(), None);
        assert!(mem.0.is_empty());
    }

    #[test]
    fn partial_state_is_treated_as_corrupt() {
        let user_json = serde_json::to_string(&worker()).unwrap();
        let mem = SharedMemory(Arc::new(MemoryStorage::with_entries([
            (USER_KEY, user_json.as_str()),
            (REFRESH_TOKEN_KEY, "r1"),
        ])));
        let store = SessionStore::open(mem.clone());
        assert!(!store.is_authenticated());
        assert_eq!(store.refresh_token(), None);
        assert!(mem.0.is_empty());

        let mem = SharedMemory(Arc::new(MemoryStorage::with_entries([(TOKEN_KEY, "orphan")])));
        let store = SessionStore::open(mem.clone());
        assert_eq!(store.access_token(), None);
        assert!(mem.0.is_empty());
    }

    #[test]
    fn unreadable_storage_starts_anonymous() {
        let store = SessionStore::open(BrokenStorage);
        assert!(!store.is_loading());
        assert!(!store.is_authenticated());

        // write failures do not break the in-memory session
        store.set_session(worker(), "abc", None);
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        store.clear_session();
        assert_symmetric(&store);
    }

    #[test]
    fn patch_user_merges_and_persists() {
        let mem = SharedMemory::default();
        let store = SessionStore::open(mem.clone());
        assert_eq!(store.patch_user(UserPatch { display_name: Some("x".into()), ..Default::default() }), None);
        assert!(mem.0.is_empty());

        store.set_session(worker(), "abc", None);
        let updated = store
            .patch_user(UserPatch { display_name: Some("Ravi K".into()), ..Default::default() })
            .expect("session present");
        assert_eq!(updated.display_name, "Ravi K");
        assert_eq!(updated.email, "ravi@example.org");
        let persisted: User = serde_json::from_str(&mem.0.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted.display_name, "Ravi K");
        assert_eq!(store.access_token().as_deref(), Some("abc"));
    }

    #[test]
    fn replace_tokens_requires_session() {
        let store = SessionStore::open(MemoryStorage::new());
        assert!(!store.replace_tokens("new", Some("r2".into())));
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);

        store.set_session(worker(), "old", Some("r1".into()));
        assert!(store.replace_tokens("new", None));
        assert_eq!(store.access_token().as_deref(), Some("new"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
        assert_eq!(store.user(), Some(worker()));
    }
}
