//! Persistent storage contract.
//!
//! Access is guarded by one advisory lock per backend.  A caller obtains a
//! [`LockToken`] from [`Storage::acquire_lock`] and passes it to every
//! other call; calls carrying any other token are rejected with
//! [`StorageError::NotLockHolder`].  The token must eventually be handed
//! back through [`Storage::release_lock`] or the backend is starved; the
//! execution engine does that on `storage:close`, on completion and when a
//! suspended invocation is cancelled.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use super::list::NamedList;
use super::value::Value;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Proof of holding a storage lock.  Tokens are unique for the life of the
/// process and deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LockToken(u64);

impl LockToken {
    /// Mint a fresh token.  Backends call this when granting the lock.
    pub fn mint() -> Self {
        LockToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("timed out after {0:?} waiting for the storage lock")]
    LockTimeout(Duration),
    #[error("the storage lock is busy")]
    LockBusy,
    #[error("the storage lock is held by another invocation")]
    NotLockHolder,
    #[error("this invocation does not hold the storage lock")]
    NotLocked,
    #[error("no storage document is open")]
    NotOpen,
    #[error("storage name is empty")]
    EmptyName,
    #[error("no storage is configured")]
    Unavailable,
    #[error("storage backend: {0}")]
    Backend(String),
}

/// A lock-disciplined key/value store with named persistent lists.
pub trait Storage: Send + Sync {
    /// Block until the lock is free or `timeout` elapses.  A zero timeout
    /// never blocks and fails with [`StorageError::LockBusy`].
    fn acquire_lock(&self, timeout: Duration) -> Result<LockToken, StorageError>;
    fn release_lock(&self, token: &LockToken) -> Result<(), StorageError>;

    /// Open document `name`, creating it if needed.
    fn open(&self, token: &LockToken, name: &str) -> Result<(), StorageError>;
    fn close(&self, token: &LockToken) -> Result<(), StorageError>;
    /// Remove every key from the open document.
    fn clear(&self, token: &LockToken) -> Result<(), StorageError>;
    /// Commit outstanding changes.
    fn save(&self, token: &LockToken) -> Result<(), StorageError>;

    fn get(&self, token: &LockToken, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, token: &LockToken, key: &str, value: Value) -> Result<(), StorageError>;
    fn has(&self, token: &LockToken, key: &str) -> Result<bool, StorageError>;
    /// Returns `false` if `key` was absent.
    fn remove(&self, token: &LockToken, key: &str) -> Result<bool, StorageError>;

    /// The persistent list `name`, created if needed.
    fn list(&self, token: &LockToken, name: &str) -> Result<Arc<NamedList>, StorageError>;
}

// ── MemoryStorage ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Documents {
    docs: HashMap<String, BTreeMap<String, Value>>,
    lists: HashMap<String, Arc<NamedList>>,
    open: Option<String>,
}

impl Documents {
    fn open_doc(&mut self) -> Result<&mut BTreeMap<String, Value>, StorageError> {
        let name = self.open.as_ref().ok_or(StorageError::NotOpen)?;
        self.docs.get_mut(name).ok_or(StorageError::NotOpen)
    }
}

/// Process-local [`Storage`] backend.  Nothing survives the process; `save`
/// only counts commits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    holder: Mutex<Option<u64>>,
    released: Condvar,
    data: Mutex<Documents>,
    saves: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Read a key without the lock, for hosts and tests inspecting state.
    pub fn peek(&self, doc: &str, key: &str) -> Option<Value> {
        self.data().docs.get(doc).and_then(|d| d.get(key)).cloned()
    }

    fn holder(&self) -> MutexGuard<'_, Option<u64>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn data(&self) -> MutexGuard<'_, Documents> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, token: &LockToken) -> Result<(), StorageError> {
        match *self.holder() {
            Some(id) if id == token.id() => Ok(()),
            _ => Err(StorageError::NotLockHolder),
        }
    }

    /// Run `f` on the open document after checking `token`.
    fn with_doc<R>(
        &self,
        token: &LockToken,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> R,
    ) -> Result<R, StorageError> {
        self.check(token)?;
        let mut data = self.data();
        Ok(f(data.open_doc()?))
    }
}

impl Storage for MemoryStorage {
    fn acquire_lock(&self, timeout: Duration) -> Result<LockToken, StorageError> {
        let guard = self.holder();
        if timeout.is_zero() && guard.is_some() {
            return Err(StorageError::LockBusy);
        }
        let (mut guard, _) = self
            .released
            .wait_timeout_while(guard, timeout, |holder| holder.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(StorageError::LockTimeout(timeout));
        }
        let token = LockToken::mint();
        *guard = Some(token.id());
        tracing::trace!(token = token.id(), "storage lock granted");
        Ok(token)
    }

    fn release_lock(&self, token: &LockToken) -> Result<(), StorageError> {
        let mut holder = self.holder();
        if *holder != Some(token.id()) {
            return Err(StorageError::NotLockHolder);
        }
        *holder = None;
        self.data().open = None;
        drop(holder);
        self.released.notify_one();
        tracing::trace!(token = token.id(), "storage lock released");
        Ok(())
    }

    fn open(&self, token: &LockToken, name: &str) -> Result<(), StorageError> {
        self.check(token)?;
        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }
        let mut data = self.data();
        data.docs.entry(name.to_owned()).or_default();
        data.open = Some(name.to_owned());
        Ok(())
    }

    fn close(&self, token: &LockToken) -> Result<(), StorageError> {
        self.check(token)?;
        self.data().open.take().map(|_| ()).ok_or(StorageError::NotOpen)
    }

    fn clear(&self, token: &LockToken) -> Result<(), StorageError> {
        self.with_doc(token, BTreeMap::clear)
    }

    fn save(&self, token: &LockToken) -> Result<(), StorageError> {
        self.with_doc(token, |_| ())?;
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, token: &LockToken, key: &str) -> Result<Option<Value>, StorageError> {
        self.with_doc(token, |d| d.get(key).cloned())
    }

    fn set(&self, token: &LockToken, key: &str, value: Value) -> Result<(), StorageError> {
        self.with_doc(token, |d| {
            d.insert(key.to_owned(), value);
        })
    }

    fn has(&self, token: &LockToken, key: &str) -> Result<bool, StorageError> {
        self.with_doc(token, |d| d.contains_key(key))
    }

    fn remove(&self, token: &LockToken, key: &str) -> Result<bool, StorageError> {
        self.with_doc(token, |d| d.remove(key).is_some())
    }

    fn list(&self, token: &LockToken, name: &str) -> Result<Arc<NamedList>, StorageError> {
        self.check(token)?;
        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }
        let mut data = self.data();
        Ok(Arc::clone(data.lists.entry(name.to_owned()).or_insert_with(|| NamedList::new(name))))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn tokens_are_unique() {
        assert_ne!(LockToken::mint(), LockToken::mint());
    }

    #[test]
    fn lock_discipline() {
        let s = MemoryStorage::new();
        let owner = s.acquire_lock(SHORT).unwrap();
        let stranger = LockToken::mint();

        s.open(&owner, "points").unwrap();
        s.set(&owner, "bob", Value::from_number(5)).unwrap();

        assert_eq!(s.get(&stranger, "bob"), Err(StorageError::NotLockHolder));
        assert_eq!(s.set(&stranger, "bob", Value::empty()), Err(StorageError::NotLockHolder));
        assert_eq!(s.close(&stranger), Err(StorageError::NotLockHolder));
        assert_eq!(s.acquire_lock(SHORT).unwrap_err(), StorageError::LockTimeout(SHORT));

        s.release_lock(&owner).unwrap();
        let next = s.acquire_lock(SHORT).unwrap();
        s.open(&next, "points").unwrap();
        assert_eq!(s.get(&next, "bob").unwrap(), Some(Value::from_number(5)));
        assert_eq!(s.get(&owner, "bob"), Err(StorageError::NotLockHolder));
    }

    #[test]
    fn zero_timeout_never_waits() {
        let s = MemoryStorage::new();
        let owner = s.acquire_lock(Duration::ZERO).unwrap();
        assert_eq!(s.acquire_lock(Duration::ZERO).unwrap_err(), StorageError::LockBusy);
        s.release_lock(&owner).unwrap();
        assert!(s.acquire_lock(Duration::ZERO).is_ok());
    }

    #[test]
    fn operations_need_an_open_document() {
        let s = MemoryStorage::new();
        let t = s.acquire_lock(SHORT).unwrap();
        assert_eq!(s.get(&t, "k"), Err(StorageError::NotOpen));
        s.open(&t, "doc").unwrap();
        s.close(&t).unwrap();
        assert_eq!(s.close(&t), Err(StorageError::NotOpen));
    }

    #[test]
    fn remove_has_clear_save() {
        let s = MemoryStorage::new();
        let t = s.acquire_lock(SHORT).unwrap();
        s.open(&t, "doc").unwrap();
        s.set(&t, "a", Value::from_text("x")).unwrap();
        assert!(s.has(&t, "a").unwrap());
        assert!(s.remove(&t, "a").unwrap());
        assert!(!s.remove(&t, "a").unwrap());
        s.set(&t, "b", Value::from_text("y")).unwrap();
        s.clear(&t).unwrap();
        assert!(!s.has(&t, "b").unwrap());
        s.save(&t).unwrap();
        assert_eq!(s.save_count(), 1);
    }

    #[test]
    fn lists_persist_across_locks() {
        let s = MemoryStorage::new();
        let t = s.acquire_lock(SHORT).unwrap();
        s.list(&t, "queue").unwrap().push(Default::default());
        s.release_lock(&t).unwrap();
        let t = s.acquire_lock(SHORT).unwrap();
        assert_eq!(s.list(&t, "queue").unwrap().len(), 1);
    }

    #[test]
    fn waiter_gets_lock_after_release() {
        let s = MemoryStorage::new();
        let first = s.acquire_lock(SHORT).unwrap();
        let s2 = Arc::clone(&s);
        let waiter = thread::spawn(move || s2.acquire_lock(Duration::from_secs(5)).map(|t| t.id()));
        thread::sleep(SHORT);
        s.release_lock(&first).unwrap();
        let id = waiter.join().unwrap().unwrap();
        assert_ne!(id, first.id());
    }
}
