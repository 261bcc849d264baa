//! Pipeline 1: stream a bulk-insert SQL dump into a record store.
//!
//! dump line → [`dump::classify_line`] → [`tuple::parse_tuple`] →
//! [`mapper::RecordMapper`] → [`commit::BatchCommitter`] → store

pub mod commit;
pub mod dump;
pub mod import;
pub mod mapper;
pub mod tuple;

pub use commit::{BatchCommitter, CommitPath, CommitStats, FlushReport, RawTuple};
pub use import::{open_dump, run_import, ImportSummary};
