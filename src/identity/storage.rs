//! Durable key/value storage behind the session store.
//!
//! The session store mirrors its three fields (`user`, `token`,
//! `refreshToken`) into an adapter implementing [`SessionStorage`]. Two
//! adapters ship with the crate: [`MemoryStorage`] for tests and throwaway
//! sessions, and [`FileStorage`] which keeps the keys in a small JSON object
//! on disk (written through on every mutation, mode 0600 on Unix).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

use crate::error::ClientResult;

pub const USER_KEY: &str = "user";
pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Minimal string key/value interface. Implementations use interior
/// mutability so one adapter can be shared behind the session store.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> ClientResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;
    fn remove(&self, key: &str) -> ClientResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    /// Pre-seeded storage, handy for simulating state left by an earlier run.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(map) }
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// JSON-file backed storage. The whole file is rewritten on each change; it
/// only ever holds three short entries.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file. A missing file is an empty
    /// store. Contents that are not a JSON object of strings (e.g. a write cut
    /// short) are discarded with a warning and replaced on the next `set`;
    /// only I/O failures are errors.
    pub fn open(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str::<BTreeMap<String, String>>(&text).unwrap_or_else(|e| {
                    warn!(target: "wastems::session", "session file {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                })
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, cache: RwLock::new(cache) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, entries: &BTreeMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, text)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.cache.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut cache = self.cache.write();
        cache.insert(key.to_string(), value.to_string());
        self.flush(&cache)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        let mut cache = self.cache.write();
        if cache.remove(key).is_some() {
            self.flush(&cache)?;
        }
        Ok(())
    }
}
