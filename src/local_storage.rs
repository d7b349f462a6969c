//! Key-value string storage the commerce store persists into.
//!
//! The store only needs `get`/`set`/`remove` by string key, the same contract
//! a browser's local storage offers. [`LmdbStorage`] is the durable backend;
//! [`MemoryStorage`] keeps everything in a shared map and is what tests and
//! throwaway sessions use.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info};

use crate::app_response::AppResponse;

/// Name of the LMDB sub-database holding the store's keys.
const LMDB_DATABASE_NAME: &str = "bookstore";

/// Read/write/delete by string key. Implementations must be usable from
/// whichever thread currently owns the store.
pub trait KeyValueStorage: Send {
    fn get_item(&self, key: &str) -> Result<Option<String>, AppResponse>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), AppResponse>;

    /// Returns `true` when the key existed.
    fn remove_item(&self, key: &str) -> Result<bool, AppResponse>;

    /// Identity of the backing medium. Two storages reporting the same
    /// location see the same keys, so stores opened on them under one
    /// namespace share a single live state. `None` never shares.
    fn location(&self) -> Option<String> {
        None
    }
}

/// In-process storage. Clones share the same map, so a second store opened on
/// a clone sees exactly what a page reload would see.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, AppResponse> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), AppResponse> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, AppResponse> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.remove(key).is_some())
    }

    fn location(&self) -> Option<String> {
        Some(format!("memory:{:p}", Arc::as_ptr(&self.items)))
    }
}

struct LmdbEnv {
    env: Environment,
    db: Database,
}

/// Environments currently open in this process, by canonical directory.
/// LMDB forbids opening the same environment twice in one process.
fn open_environments() -> &'static Mutex<HashMap<PathBuf, Weak<LmdbEnv>>> {
    static ENVIRONMENTS: OnceLock<Mutex<HashMap<PathBuf, Weak<LmdbEnv>>>> = OnceLock::new();
    ENVIRONMENTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// LMDB-backed storage living in a `<name>.lmdb` directory.
///
/// Every `set_item`/`remove_item` runs in its own write transaction and is
/// committed before the call returns. Opening a directory that is already
/// open in this process shares its environment.
#[derive(Clone)]
pub struct LmdbStorage {
    shared: Arc<LmdbEnv>,
    path: PathBuf,
}

impl LmdbStorage {
    /// Opens (or creates) the environment at `<name>.lmdb`. `map_size` only
    /// applies when the environment is not open yet.
    ///
    /// # Errors
    ///
    /// Returns [`AppResponse::StorageError`] when the directory cannot be
    /// created or LMDB refuses to open it.
    pub fn open(name: impl AsRef<Path>, map_size: usize) -> Result<Self, AppResponse> {
        let mut dir = name.as_ref().as_os_str().to_owned();
        dir.push(".lmdb");
        let path = PathBuf::from(dir);

        if !path.exists() {
            info!("Creating LMDB environment at {}", path.display());
            fs::create_dir_all(&path)?;
        }
        let path = fs::canonicalize(&path)?;

        let mut environments = open_environments()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(shared) = environments.get(&path).and_then(Weak::upgrade) {
            debug!("Sharing open LMDB environment at {}", path.display());
            return Ok(LmdbStorage { shared, path });
        }

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open(&path)?;
        let db = env.create_db(Some(LMDB_DATABASE_NAME), DatabaseFlags::empty())?;

        let shared = Arc::new(LmdbEnv { env, db });
        environments.retain(|_, env| env.strong_count() > 0);
        environments.insert(path.clone(), Arc::downgrade(&shared));
        Ok(LmdbStorage { shared, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStorage for LmdbStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, AppResponse> {
        let txn = self.shared.env.begin_ro_txn()?;
        let value = match txn.get(self.shared.db, &key) {
            Ok(bytes) => Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                AppResponse::SerializationError(format!("Value for '{key}' is not UTF-8: {e}"))
            })?),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), AppResponse> {
        let mut txn = self.shared.env.begin_rw_txn()?;
        txn.put(self.shared.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, AppResponse> {
        let mut txn = self.shared.env.begin_rw_txn()?;
        let existed = match txn.del(self.shared.db, &key, None) {
            Ok(()) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(existed)
    }

    fn location(&self) -> Option<String> {
        Some(format!("lmdb:{}", self.path.display()))
    }
}
