//! Shared building blocks for the esgsync pipelines.
//!
//! - `datum`: scalar values produced by dump coercion and read back from stores
//! - `schema`: the positional `esg_block` schema table
//! - `record`: 14-field records plus overflow fields
//! - `store`: the `RecordStore` surface and an in-memory implementation
//! - `config`, `error`, `shutdown`: ambient plumbing used by every crate

pub mod config;
pub mod datum;
pub mod error;
pub mod record;
pub mod schema;
pub mod shutdown;
pub mod store;
