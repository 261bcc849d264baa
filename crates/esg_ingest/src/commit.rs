//! Batch buffer and commit strategy.
//!
//! Raw tuples accumulate until the batch size is reached; a flush parses and
//! maps them, tries one atomic bulk insert, and on any bulk failure falls back
//! to inserting the mapped records one at a time. Every buffered tuple ends up
//! counted exactly once as inserted or failed, and the buffer is always empty
//! after a flush.

use esg_common::error::{ErrorKind, EsgError};
use esg_common::record::Record;
use esg_common::store::RecordStore;
use tracing::{debug, error, info, warn};

use crate::mapper::{MapOutcome, RecordMapper};
use crate::tuple::parse_tuple;

/// One value-tuple line as read from the dump, trailing `,`/`;` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTuple {
    pub line_no: u64,
    pub text: String,
}

impl RawTuple {
    pub fn new(line_no: u64, text: impl Into<String>) -> Self {
        Self {
            line_no,
            text: text.into(),
        }
    }
}

/// Running tallies owned by the committer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    /// Records persisted, via either path.
    pub inserted: u64,
    /// Tuples rejected by the parser or mapper, plus failed single inserts.
    pub failed: u64,
    /// Of `failed`, how many were parse/mapping rejections.
    pub parse_failed: u64,
    pub bulk_batches: u64,
    pub fallback_batches: u64,
}

/// Which path a flush took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    /// Nothing was buffered.
    Noop,
    /// Tuples were buffered but none mapped to a record.
    NothingToInsert,
    Bulk,
    Fallback,
}

/// Outcome of a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub path: CommitPath,
    pub buffered: usize,
    pub mapped: usize,
    pub inserted: u64,
    pub failed: u64,
}

impl FlushReport {
    fn noop() -> Self {
        Self {
            path: CommitPath::Noop,
            buffered: 0,
            mapped: 0,
            inserted: 0,
            failed: 0,
        }
    }
}

/// Buffer plus commit strategy over a [`RecordStore`].
pub struct BatchCommitter<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    mapper: RecordMapper,
    batch_size: usize,
    buffer: Vec<RawTuple>,
    stats: CommitStats,
}

impl<'s, S: RecordStore + ?Sized> BatchCommitter<'s, S> {
    pub fn new(store: &'s S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            mapper: RecordMapper::new(),
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: CommitStats::default(),
        }
    }

    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer a tuple, flushing when the batch is full.
    pub async fn append(&mut self, tuple: RawTuple) -> Option<FlushReport> {
        self.buffer.push(tuple);
        if self.buffer.len() >= self.batch_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Commit everything buffered. A no-op on an empty buffer.
    pub async fn flush(&mut self) -> FlushReport {
        if self.buffer.is_empty() {
            return FlushReport::noop();
        }
        let tuples = std::mem::take(&mut self.buffer);
        let buffered = tuples.len();
        let failed_before = self.stats.failed;

        let records = self.prepare(&tuples);
        let mapped = records.len();

        if records.is_empty() {
            warn!(
                "No valid records in batch of {} (inserted: {}, failed: {})",
                buffered, self.stats.inserted, self.stats.failed
            );
            return FlushReport {
                path: CommitPath::NothingToInsert,
                buffered,
                mapped,
                inserted: 0,
                failed: self.stats.failed - failed_before,
            };
        }

        match self.store.insert_many(&records).await {
            Ok(_) => {
                let n = records.len() as u64;
                self.stats.inserted += n;
                self.stats.bulk_batches += 1;
                esg_observability::record_import_batch("bulk", mapped);
                esg_observability::record_import_lines("inserted", n);
                info!(
                    "Imported {} records (inserted: {}, failed: {})",
                    n, self.stats.inserted, self.stats.failed
                );
                FlushReport {
                    path: CommitPath::Bulk,
                    buffered,
                    mapped,
                    inserted: n,
                    failed: self.stats.failed - failed_before,
                }
            }
            Err(e) => {
                warn!(
                    "Bulk insert of {} records failed ({:?}): {}; retrying one by one",
                    mapped,
                    EsgError::from(e.clone()).kind(),
                    e
                );
                let (ok, fail) = self.commit_individually(&records).await;
                self.stats.fallback_batches += 1;
                esg_observability::record_import_batch("fallback", mapped);
                info!(
                    "Fallback insert complete: {} ok, {} failed (inserted: {}, failed: {})",
                    ok, fail, self.stats.inserted, self.stats.failed
                );
                FlushReport {
                    path: CommitPath::Fallback,
                    buffered,
                    mapped,
                    inserted: ok,
                    failed: self.stats.failed - failed_before,
                }
            }
        }
    }

    /// Parse and map every buffered tuple once, counting rejections.
    fn prepare(&mut self, tuples: &[RawTuple]) -> Vec<Record> {
        let mut records = Vec::with_capacity(tuples.len());
        for t in tuples {
            let parsed = match parse_tuple(&t.text) {
                Ok(fields) => Some(fields),
                Err(e) => {
                    error!("Line {}: {} | {}", t.line_no, e, t.text);
                    self.count_rejection();
                    None
                }
            };
            match self.mapper.map_tuple(t.line_no, parsed.as_deref()) {
                MapOutcome::Mapped(r) => records.push(r),
                MapOutcome::ParseFailed => {}
                MapOutcome::Invalid(e) => {
                    error!("Line {}: {} | {}", t.line_no, e, t.text);
                    self.count_rejection();
                }
            }
        }
        debug!("Mapped {} of {} buffered tuples", records.len(), tuples.len());
        records
    }

    fn count_rejection(&mut self) {
        self.stats.failed += 1;
        self.stats.parse_failed += 1;
        esg_observability::record_import_lines("failed", 1);
    }

    /// Insert records one at a time. An internal-bug failure (the store is
    /// closed) ends the loop; the remaining records are counted as failed
    /// without further store calls.
    async fn commit_individually(&mut self, records: &[Record]) -> (u64, u64) {
        let mut ok = 0;
        let mut fail = 0;
        for (i, r) in records.iter().enumerate() {
            match self.store.insert_one(r).await {
                Ok(()) => {
                    ok += 1;
                    self.stats.inserted += 1;
                    esg_observability::record_import_lines("inserted", 1);
                }
                Err(e) => {
                    fail += 1;
                    self.stats.failed += 1;
                    esg_observability::record_import_lines("failed", 1);
                    let kind = EsgError::from(e.clone()).kind();
                    error!("Insert of record id={:?} failed ({:?}): {}", r.id(), kind, e);
                    if kind == ErrorKind::InternalBug {
                        let rest = (records.len() - i - 1) as u64;
                        fail += rest;
                        self.stats.failed += rest;
                        esg_observability::record_import_lines("failed", rest);
                        error!("Store unusable; {} remaining record(s) counted as failed", rest);
                        break;
                    }
                }
            }
        }
        (ok, fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use esg_common::error::StoreError;
    use esg_common::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(id: i64) -> String {
        format!(
            "({},'2024-01','Org','Proj','C{}',NULL,'2024-01-01 00:00:00',NULL,'P','C','s1','src','1',2.5)",
            id, id
        )
    }

    fn tuple(id: i64) -> RawTuple {
        RawTuple::new(id as u64, row(id))
    }

    /// Store whose bulk path always fails and which counts every call.
    #[derive(Default)]
    struct FlakyBulkStore {
        inner: MemoryStore,
        bulk_calls: AtomicUsize,
        single_calls: AtomicUsize,
        reject_id: Option<i64>,
    }

    #[async_trait]
    impl RecordStore for FlakyBulkStore {
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn ensure_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn insert_many(&self, _records: &[Record]) -> Result<u64, StoreError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Connection("connection reset".into()))
        }
        async fn insert_one(&self, record: &Record) -> Result<(), StoreError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if record.id() == self.reject_id {
                return Err(StoreError::Query("value too long".into()));
            }
            self.inner.insert_one(record).await
        }
        async fn select_unindexed(
            &self,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<Record>, StoreError> {
            self.inner.select_unindexed(limit, offset).await
        }
        async fn update_index(&self, id: i64, index: i64) -> Result<bool, StoreError> {
            self.inner.update_index(id, index).await
        }
        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_auto_flush_at_batch_size() {
        let store = MemoryStore::new();
        let mut c = BatchCommitter::new(&store, 2);
        assert!(c.append(tuple(1)).await.is_none());
        let report = c.append(tuple(2)).await.unwrap();
        assert_eq!(report.path, CommitPath::Bulk);
        assert_eq!(report.inserted, 2);
        assert_eq!(c.pending(), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_is_idempotent() {
        let store = FlakyBulkStore::default();
        let mut c = BatchCommitter::new(&store, 10);
        assert_eq!(c.flush().await.path, CommitPath::Noop);
        let before = c.stats();
        assert_eq!(c.flush().await.path, CommitPath::Noop);
        assert_eq!(c.stats(), before);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.single_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_flush_after_commit_issues_no_store_calls() {
        let store = FlakyBulkStore::default();
        let mut c = BatchCommitter::new(&store, 10);
        c.append(tuple(1)).await;
        c.flush().await;
        let stats = c.stats();
        let bulk = store.bulk_calls.load(Ordering::SeqCst);
        let single = store.single_calls.load(Ordering::SeqCst);
        c.flush().await;
        assert_eq!(c.stats(), stats);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), bulk);
        assert_eq!(store.single_calls.load(Ordering::SeqCst), single);
    }

    #[tokio::test]
    async fn test_bulk_failure_falls_back_to_k_single_inserts() {
        let store = FlakyBulkStore {
            reject_id: Some(3),
            ..Default::default()
        };
        let mut c = BatchCommitter::new(&store, 100);
        for id in 1..=5 {
            c.append(tuple(id)).await;
        }
        let report = c.flush().await;
        assert_eq!(report.path, CommitPath::Fallback);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.single_calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.inserted + report.failed, 5);
        assert_eq!(report.inserted, 4);
        assert_eq!(c.stats().failed, 1);
        assert_eq!(c.pending(), 0);
        assert!(store.inner.get(3).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_in_batch_triggers_fallback() {
        let existing = RecordMapper::new()
            .map_fields(&parse_tuple(&row(2)).unwrap())
            .unwrap();
        let store = MemoryStore::with_records([existing]);
        let mut c = BatchCommitter::new(&store, 3);
        c.append(tuple(1)).await;
        c.append(tuple(2)).await;
        let report = c.append(tuple(3)).await.unwrap();
        assert_eq!(report.path, CommitPath::Fallback);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_tuple_counted_once_even_on_fallback() {
        let store = FlakyBulkStore::default();
        let mut c = BatchCommitter::new(&store, 100);
        c.append(tuple(1)).await;
        c.append(RawTuple::new(2, "(1,2,3,4,5,6,7,8,9,10,11,12,13)")).await;
        c.append(tuple(3)).await;
        let report = c.flush().await;
        assert_eq!(report.buffered, 3);
        assert_eq!(report.mapped, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(c.stats().parse_failed, 1);
        assert_eq!(store.single_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_store_stops_fallback_after_first_failure() {
        let store = FlakyBulkStore::default();
        store.inner.close().await.unwrap();
        let mut c = BatchCommitter::new(&store, 100);
        for id in 1..=4 {
            c.append(tuple(id)).await;
        }
        let report = c.flush().await;
        assert_eq!(report.path, CommitPath::Fallback);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.failed, 4);
        assert_eq!(c.stats().failed, 4);
        assert_eq!(c.stats().parse_failed, 0);
        assert_eq!(store.single_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_malformed_batch_skips_store() {
        let store = FlakyBulkStore::default();
        let mut c = BatchCommitter::new(&store, 100);
        c.append(RawTuple::new(1, "(1,2)")).await;
        let report = c.flush().await;
        assert_eq!(report.path, CommitPath::NothingToInsert);
        assert_eq!(report.failed, 1);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(c.pending(), 0);
    }
}
