//! Ordered record lists and the per-invocation list manager.
//!
//! A [`NamedList`] is an ordered sequence of [`Record`]s shared behind an
//! `Arc`; every mutation goes through the list's own mutex, so concurrent
//! invocations working on the same list never observe a half-applied
//! change.  Lists come from a [`ListProvider`] (ephemeral, host-supplied)
//! or from a [`Storage`](super::storage::Storage) backend (persistent).
//!
//! The [`ListManager`] tracks the one list an invocation currently has open
//! plus its cursor, and publishes cursor state into the context values
//! listed below after every list statement.
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `$list.count` | number of records |
//! | `$list.lastIndex` | `count - 1` |
//! | `$list.index` | cursor position, `-1` when unset |
//! | `$list.hasItem` | `1` if the cursor is on a record |
//! | `$list.outOfBounds` | `1` if the last move ran off either end |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use super::name::RESERVED_LIST_PREFIX;
use super::value::Value;
use super::values::ValueMap;

pub const COUNT: &str = "$list.count";
pub const LAST_INDEX: &str = "$list.lastIndex";
pub const INDEX: &str = "$list.index";
pub const HAS_ITEM: &str = "$list.hasItem";
pub const OUT_OF_BOUNDS: &str = "$list.outOfBounds";

/// `true` for names only a provider may supply.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_LIST_PREFIX)
}

// ── Record ────────────────────────────────────────────────────────────────────

/// One list entry: field name → value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing field in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn first(&self) -> Option<&Value> {
        self.fields.first().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut r = Record::new();
        for (k, v) in iter {
            r.insert(k, v.into());
        }
        r
    }
}

// ── NamedList ─────────────────────────────────────────────────────────────────

/// A shared, internally synchronised list of records.
#[derive(Debug)]
pub struct NamedList {
    name: String,
    records: Mutex<Vec<Record>>,
}

impl NamedList {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_records(name, Vec::new())
    }

    pub fn with_records(name: impl Into<String>, records: Vec<Record>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), records: Mutex::new(records) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Record> {
        self.lock().get(index).cloned()
    }

    pub fn push(&self, record: Record) {
        self.lock().push(record);
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Run `f` inside the list's exclusive section.
    pub fn with<R>(&self, f: impl FnOnce(&mut Vec<Record>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Providers ─────────────────────────────────────────────────────────────────

/// Host-side source of ephemeral lists.
pub trait ListProvider: Send + Sync {
    /// An existing list, if any.
    fn get(&self, name: &str) -> Option<Arc<NamedList>>;

    /// Create (and remember) a fresh list.  Providers must refuse reserved
    /// names.
    fn create(&self, name: &str) -> Option<Arc<NamedList>>;
}

/// In-memory [`ListProvider`].  Lists live as long as the provider.
#[derive(Debug, Default)]
pub struct MemoryListProvider {
    lists: Mutex<HashMap<String, Arc<NamedList>>>,
}

impl MemoryListProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a host-maintained list, reserved names included.
    pub fn insert(&self, list: Arc<NamedList>) {
        self.lock().insert(list.name().to_owned(), list);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<NamedList>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListProvider for MemoryListProvider {
    fn get(&self, name: &str) -> Option<Arc<NamedList>> {
        self.lock().get(name).cloned()
    }

    fn create(&self, name: &str) -> Option<Arc<NamedList>> {
        if is_reserved(name) {
            return None;
        }
        let list = Arc::clone(self.lock().entry(name.to_owned()).or_insert_with(|| NamedList::new(name)));
        Some(list)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("no list is open")]
    NoListOpen,
    #[error("no list provider is configured")]
    NoProvider,
    #[error("list '{0}' does not exist and cannot be created")]
    NotFound(String),
    #[error("list name is empty")]
    EmptyName,
    #[error("index {index} is out of range for a list of {len}")]
    OutOfRange { index: i64, len: usize },
    #[error("the cursor is not on a record")]
    NoCursor,
    #[error("limit must not be negative, got {0}")]
    NegativeLimit(i64),
}

// ── ListManager ───────────────────────────────────────────────────────────────

/// The open list and cursor for one invocation.
pub struct ListManager {
    provider: Option<Arc<dyn ListProvider>>,
    /// Lists already resolved by this invocation.
    resolved: HashMap<String, Arc<NamedList>>,
    current: Option<Arc<NamedList>>,
    cursor: Option<usize>,
    out_of_bounds: bool,
}

impl ListManager {
    pub fn new(provider: Option<Arc<dyn ListProvider>>) -> Self {
        Self { provider, resolved: HashMap::new(), current: None, cursor: None, out_of_bounds: false }
    }

    pub fn current(&self) -> Option<&Arc<NamedList>> {
        self.current.as_ref()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Open `name`: this invocation's earlier lists first, then the
    /// provider's, then a newly created one unless the name is reserved.
    pub fn load(&mut self, name: &str) -> Result<(), ListError> {
        if name.is_empty() {
            return Err(ListError::EmptyName);
        }
        let list = match self.resolved.get(name) {
            Some(l) => Arc::clone(l),
            None => {
                let provider = self.provider.as_ref().ok_or(ListError::NoProvider)?;
                let list = provider
                    .get(name)
                    .or_else(|| if is_reserved(name) { None } else { provider.create(name) })
                    .ok_or_else(|| ListError::NotFound(name.to_owned()))?;
                self.resolved.insert(name.to_owned(), Arc::clone(&list));
                list
            }
        };
        tracing::trace!(list = name, records = list.len(), "list loaded");
        self.open(list);
        Ok(())
    }

    /// Make `list` current (used for storage-backed lists).
    pub fn open(&mut self, list: Arc<NamedList>) {
        self.current = Some(list);
        self.reset_cursor();
    }

    pub fn add(&mut self, record: Record) -> Result<(), ListError> {
        self.list()?.push(record);
        Ok(())
    }

    /// Move to `index` and return its record.
    pub fn get(&mut self, index: i64) -> Result<Record, ListError> {
        let list = Arc::clone(self.list()?);
        let found = usize::try_from(index).ok().and_then(|ix| list.get(ix).map(|r| (ix, r)));
        match found {
            Some((ix, r)) => Ok(self.land(ix, r)),
            None => {
                self.out_of_bounds = true;
                Err(ListError::OutOfRange { index, len: list.len() })
            }
        }
    }

    pub fn first(&mut self) -> Result<Option<Record>, ListError> {
        self.move_to(|_, _| Some(0))
    }

    pub fn last(&mut self) -> Result<Option<Record>, ListError> {
        self.move_to(|_, len| len.checked_sub(1))
    }

    /// From an unset cursor, `next` lands on the first record.
    pub fn next(&mut self) -> Result<Option<Record>, ListError> {
        self.move_to(|cur, _| cur.map_or(Some(0), |c| c.checked_add(1)))
    }

    /// From an unset cursor, `previous` lands on the last record.
    pub fn previous(&mut self) -> Result<Option<Record>, ListError> {
        self.move_to(|cur, len| match cur {
            None => len.checked_sub(1),
            Some(c) => c.checked_sub(1),
        })
    }

    pub fn random(&mut self) -> Result<Option<Record>, ListError> {
        self.move_to(|_, len| (len > 0).then(|| rand::thread_rng().gen_range(0..len)))
    }

    /// Remove the record at `index` (default: the cursor).  When the cursor
    /// is at or past the removed record it steps back one, so `next`
    /// visits the record that slid into place.
    pub fn remove(&mut self, index: Option<i64>) -> Result<Record, ListError> {
        let list = Arc::clone(self.list()?);
        let ix = match index {
            Some(i) => i,
            None => self.cursor.and_then(|c| i64::try_from(c).ok()).ok_or(ListError::NoCursor)?,
        };
        let removed = list.with(|records| {
            let len = records.len();
            usize::try_from(ix)
                .ok()
                .filter(|&u| u < len)
                .map(|u| (u, records.remove(u)))
                .ok_or(ListError::OutOfRange { index: ix, len })
        })?;
        let (at, record) = removed;
        if let Some(c) = self.cursor {
            if c >= at {
                self.cursor = c.checked_sub(1);
            }
        }
        Ok(record)
    }

    pub fn clear(&mut self) -> Result<(), ListError> {
        self.list()?.with(Vec::clear);
        self.reset_cursor();
        Ok(())
    }

    /// Replace the open list with an independent copy holding the records
    /// whose `key` field equals `value` (case-insensitive).
    pub fn filter(&mut self, key: &str, value: &Value) -> Result<(), ListError> {
        let list = self.list()?;
        let kept: Vec<Record> = list
            .snapshot()
            .into_iter()
            .filter(|r| r.get(key).is_some_and(|v| v.text_eq_ignore_case(value.text())))
            .collect();
        let copy = NamedList::with_records(list.name(), kept);
        self.open(copy);
        Ok(())
    }

    /// Replace the open list with an independent copy keeping the first
    /// record for each distinct (case-insensitive) `key` text.
    pub fn unique(&mut self, key: &str) -> Result<(), ListError> {
        let list = self.list()?;
        let mut seen = std::collections::HashSet::new();
        let kept: Vec<Record> = list
            .snapshot()
            .into_iter()
            .filter(|r| seen.insert(r.get(key).map(|v| v.text().to_lowercase()).unwrap_or_default()))
            .collect();
        let copy = NamedList::with_records(list.name(), kept);
        self.open(copy);
        Ok(())
    }

    /// Stable sort on `key`; missing fields sort as empty.
    pub fn sort(&mut self, key: &str, descending: bool) -> Result<(), ListError> {
        let empty = Value::empty();
        self.list()?.with(|records| {
            records.sort_by(|a, b| {
                let ord = a.get(key).unwrap_or(&empty).sort_cmp(b.get(key).unwrap_or(&empty));
                if descending { ord.reverse() } else { ord }
            });
        });
        self.reset_cursor();
        Ok(())
    }

    pub fn shuffle(&mut self) -> Result<(), ListError> {
        self.list()?.with(|records| records.shuffle(&mut rand::thread_rng()));
        self.reset_cursor();
        Ok(())
    }

    /// Keep at most `count` records from the head (or tail).
    pub fn limit(&mut self, count: i64, keep_tail: bool) -> Result<(), ListError> {
        let count = usize::try_from(count).map_err(|_| ListError::NegativeLimit(count))?;
        self.list()?.with(|records| {
            if records.len() > count {
                if keep_tail {
                    records.drain(..records.len() - count);
                } else {
                    records.truncate(count);
                }
            }
        });
        self.reset_cursor();
        Ok(())
    }

    /// Write cursor state into `values`.
    pub fn publish(&self, values: &mut ValueMap) {
        let count = self.current.as_ref().map_or(0, |l| l.len());
        let index = self.cursor.and_then(|c| i64::try_from(c).ok()).unwrap_or(-1);
        let has_item = !self.out_of_bounds && self.cursor.is_some_and(|c| c < count);
        values.set(COUNT, Value::from_number(count as i64));
        values.set(LAST_INDEX, Value::from_number(count as i64 - 1));
        values.set(INDEX, Value::from_number(index));
        values.set(HAS_ITEM, has_item);
        values.set(OUT_OF_BOUNDS, self.out_of_bounds);
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn list(&self) -> Result<&Arc<NamedList>, ListError> {
        self.current.as_ref().ok_or(ListError::NoListOpen)
    }

    fn reset_cursor(&mut self) {
        self.cursor = None;
        self.out_of_bounds = false;
    }

    fn land(&mut self, ix: usize, record: Record) -> Record {
        self.cursor = Some(ix);
        self.out_of_bounds = false;
        record
    }

    /// Move the cursor to `pick(cursor, len)`.  Running off either end
    /// leaves the cursor where it was and flags out-of-bounds.
    fn move_to(&mut self, pick: impl FnOnce(Option<usize>, usize) -> Option<usize>) -> Result<Option<Record>, ListError> {
        let list = Arc::clone(self.list()?);
        let target = pick(self.cursor, list.len());
        match target.and_then(|ix| list.get(ix).map(|r| (ix, r))) {
            Some((ix, r)) => Ok(Some(self.land(ix, r))),
            None => {
                self.out_of_bounds = true;
                Ok(None)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
