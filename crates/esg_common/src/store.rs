//! The store surface both pipelines run against, and an in-memory backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::datum::Datum;
use crate::error::StoreError;
use crate::record::Record;
use crate::schema::Field;

/// Read/write operations the pipelines need from the target store.
///
/// Implementations must order `select_unindexed` by id ascending so that
/// offset pagination is stable within a run.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Cheap connectivity check used at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Create the target table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert all records atomically: either every record lands or none does.
    async fn insert_many(&self, records: &[Record]) -> Result<u64, StoreError>;

    async fn insert_one(&self, record: &Record) -> Result<(), StoreError>;

    /// Records whose index is still null, ordered by id, `limit` rows from `offset`.
    async fn select_unindexed(&self, limit: usize, offset: usize)
        -> Result<Vec<Record>, StoreError>;

    /// Set the index of an unindexed record. Returns `false` when no row
    /// matched (unknown id, or the index was already set).
    async fn update_index(&self, id: i64, index: i64) -> Result<bool, StoreError>;

    /// Release the underlying connection. Further calls fail with `Closed`.
    async fn close(&self) -> Result<(), StoreError>;
}

/// In-memory store keyed by record id. Used for `--dry-run` imports and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rows: BTreeMap<i64, Record>,
    closed: bool,
}

impl MemoryInner {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records` (duplicates keep the last copy).
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for r in records {
                if let Some(id) = r.id() {
                    inner.rows.insert(id, r);
                }
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: i64) -> Option<Record> {
        self.inner.lock().rows.get(&id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.lock().check_open()
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.inner.lock().check_open()
    }

    async fn insert_many(&self, records: &[Record]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let mut ids = Vec::with_capacity(records.len());
        for r in records {
            let id = r.id().ok_or(StoreError::MissingId)?;
            if inner.rows.contains_key(&id) || ids.contains(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            ids.push(id);
        }
        for (id, r) in ids.into_iter().zip(records) {
            inner.rows.insert(id, r.clone());
        }
        Ok(records.len() as u64)
    }

    async fn insert_one(&self, record: &Record) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let id = record.id().ok_or(StoreError::MissingId)?;
        if inner.rows.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        inner.rows.insert(id, record.clone());
        Ok(())
    }

    async fn select_unindexed(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner
            .rows
            .values()
            .filter(|r| !r.is_indexed())
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_index(&self, id: i64, index: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        match inner.rows.get_mut(&id) {
            Some(r) if !r.is_indexed() => {
                r.set(Field::Index, Datum::Int64(index));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.lock().closed = true;
        Ok(())
    }
}
