//! Pipeline 2: attest stored records and write the confirmed indices back.
//!
//! store → [`page::PageReader`] → [`pipeline::AttestationPipeline`]
//! (transform → [`scorer::Scorer`] → [`ledger::Ledger`] → index update) → store

pub mod driver;
pub mod ledger;
pub mod page;
pub mod pipeline;
pub mod scorer;
pub mod transform;

pub use driver::{run_attestation, AttestSummary};
pub use ledger::{JsonRpcLedger, Ledger};
pub use page::{Page, PageReader};
pub use pipeline::{AttestationPipeline, PageOutcome, PageState, VoidReason};
pub use scorer::{AttestationResult, HttpScorer, Scorer};
pub use transform::{to_payload, AttestPayload};

#[cfg(test)]
mod test_http;
