//! Per-page attestation state machine.
//!
//! ```text
//! FETCHED → TRANSFORMED → SUBMITTED → CONFIRMING → CONFIRMED   → APPLIED
//!                                                → UNCONFIRMED → VOIDED
//! ```
//!
//! A page reaches `APPLIED` only if the scorer returned exactly one index per
//! record and the ledger confirmed the transaction within the window. Every
//! other path ends in `VOIDED` with no index written.

use std::fmt;
use std::time::{Duration, Instant};

use esg_common::error::{ErrorKind, EsgError, LedgerError, ScorerError};
use esg_common::store::RecordStore;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ledger::Ledger;
use crate::page::Page;
use crate::scorer::Scorer;
use crate::transform::transform_page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Fetched,
    Transformed,
    Submitted,
    Confirming,
    Confirmed,
    Unconfirmed,
    Applied,
    Voided,
}

impl PageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Applied | PageState::Voided)
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageState::Fetched => "FETCHED",
            PageState::Transformed => "TRANSFORMED",
            PageState::Submitted => "SUBMITTED",
            PageState::Confirming => "CONFIRMING",
            PageState::Confirmed => "CONFIRMED",
            PageState::Unconfirmed => "UNCONFIRMED",
            PageState::Applied => "APPLIED",
            PageState::Voided => "VOIDED",
        };
        f.write_str(s)
    }
}

/// Why a page ended without any index being written.
#[derive(Error, Debug, Clone)]
pub enum VoidReason {
    #[error("scorer submission failed: {0}")]
    Scorer(#[from] ScorerError),

    #[error("scorer returned {indices} indices (count {count}) for {expected} records")]
    LengthMismatch {
        expected: usize,
        indices: usize,
        count: usize,
        tx_hash: String,
    },

    #[error("transaction {tx_hash} not confirmed")]
    Unconfirmed { tx_hash: String },

    #[error("confirmation of {tx_hash} failed: {source}")]
    Ledger {
        tx_hash: String,
        #[source]
        source: LedgerError,
    },
}

impl VoidReason {
    /// Classification of the underlying failure; `None` when the page was
    /// voided by a check rather than an error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            VoidReason::Scorer(e) => Some(EsgError::from(e.clone()).kind()),
            VoidReason::Ledger { source, .. } => Some(EsgError::from(source.clone()).kind()),
            VoidReason::LengthMismatch { .. } | VoidReason::Unconfirmed { .. } => None,
        }
    }

    /// Transaction handle to reconcile by hand, when the scorer issued one.
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            VoidReason::Scorer(_) => None,
            VoidReason::LengthMismatch { tx_hash, .. }
            | VoidReason::Unconfirmed { tx_hash }
            | VoidReason::Ledger { tx_hash, .. } => Some(tx_hash),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// Confirmed; `updated + failed == page length`.
    Applied {
        tx_hash: String,
        updated: u64,
        failed: u64,
    },
    Voided(VoidReason),
}

impl PageOutcome {
    pub fn state(&self) -> PageState {
        match self {
            PageOutcome::Applied { .. } => PageState::Applied,
            PageOutcome::Voided(_) => PageState::Voided,
        }
    }
}

pub struct AttestationPipeline<'a, S: ?Sized, C: ?Sized, L: ?Sized> {
    store: &'a S,
    scorer: &'a C,
    ledger: &'a L,
    depth: u64,
    confirm_timeout: Duration,
}

impl<'a, S, C, L> AttestationPipeline<'a, S, C, L>
where
    S: RecordStore + ?Sized,
    C: Scorer + ?Sized,
    L: Ledger + ?Sized,
{
    pub fn new(
        store: &'a S,
        scorer: &'a C,
        ledger: &'a L,
        depth: u64,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            store,
            scorer,
            ledger,
            depth,
            confirm_timeout,
        }
    }

    /// Run one page to a terminal state.
    pub async fn process(&self, page: &Page) -> PageOutcome {
        let offset = page.offset;
        let mut state = PageState::Fetched;
        let mut advance = |next: PageState| {
            debug!("Page at offset {}: {} -> {}", offset, state, next);
            state = next;
        };

        let payloads = transform_page(&page.records);
        advance(PageState::Transformed);

        let result = match self.scorer.submit(&payloads).await {
            Ok(r) => r,
            Err(e) => {
                error!(
                    "Page at offset {}: scorer submission failed ({:?}): {}",
                    offset,
                    EsgError::from(e.clone()).kind(),
                    e
                );
                advance(PageState::Voided);
                return self.voided(page, VoidReason::Scorer(e));
            }
        };
        advance(PageState::Submitted);

        if !result.matches_page(page.len()) {
            error!(
                "Page at offset {}: length mismatch, {} records but {} indices (count {}); tx {} left unapplied",
                offset,
                page.len(),
                result.entry_index.len(),
                result.count,
                result.tx_hash
            );
            advance(PageState::Voided);
            return self.voided(
                page,
                VoidReason::LengthMismatch {
                    expected: page.len(),
                    indices: result.entry_index.len(),
                    count: result.count,
                    tx_hash: result.tx_hash,
                },
            );
        }

        advance(PageState::Confirming);
        let started = Instant::now();
        let confirmation = tokio::time::timeout(
            self.confirm_timeout,
            self.ledger
                .await_confirmation(&result.tx_hash, self.depth, self.confirm_timeout),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let confirmed = match confirmation {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                esg_observability::record_confirmation(elapsed_ms, false);
                error!(
                    "Page at offset {}: confirmation of tx {} failed ({:?}): {}; ids {:?} need manual reconciliation",
                    offset,
                    result.tx_hash,
                    EsgError::from(e.clone()).kind(),
                    e,
                    page.ids()
                );
                advance(PageState::Unconfirmed);
                advance(PageState::Voided);
                return self.voided(
                    page,
                    VoidReason::Ledger {
                        tx_hash: result.tx_hash,
                        source: e,
                    },
                );
            }
            Err(_) => false,
        };
        esg_observability::record_confirmation(elapsed_ms, confirmed);

        if !confirmed {
            error!(
                "Page at offset {}: tx {} not confirmed within {:?}; ids {:?} need manual reconciliation",
                offset,
                result.tx_hash,
                self.confirm_timeout,
                page.ids()
            );
            advance(PageState::Unconfirmed);
            advance(PageState::Voided);
            return self.voided(
                page,
                VoidReason::Unconfirmed {
                    tx_hash: result.tx_hash,
                },
            );
        }
        advance(PageState::Confirmed);

        let (updated, failed) = self.apply(page, &result.entry_index).await;
        advance(PageState::Applied);
        debug_assert!(state.is_terminal());

        esg_observability::record_attest_page("applied", page.len());
        info!(
            "Page at offset {}: tx {} confirmed, {} index(es) written, {} failed",
            offset, result.tx_hash, updated, failed
        );
        PageOutcome::Applied {
            tx_hash: result.tx_hash,
            updated,
            failed,
        }
    }

    /// Write each index back. A failed row is logged and its siblings still
    /// get their updates.
    async fn apply(&self, page: &Page, indices: &[i64]) -> (u64, u64) {
        let mut updated = 0u64;
        let mut failed = 0u64;
        for (record, &index) in page.records.iter().zip(indices) {
            let ok = match record.id() {
                None => {
                    warn!(
                        "Record without id in page at offset {}; dropping index {}",
                        page.offset, index
                    );
                    false
                }
                Some(id) => match self.store.update_index(id, index).await {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!("Record {}: no unindexed row to receive index {}", id, index);
                        false
                    }
                    Err(e) => {
                        error!("Record {}: index update to {} failed: {}", id, index, e);
                        false
                    }
                },
            };
            esg_observability::record_index_update(ok);
            if ok {
                updated += 1;
            } else {
                failed += 1;
            }
        }
        (updated, failed)
    }

    fn voided(&self, page: &Page, reason: VoidReason) -> PageOutcome {
        esg_observability::record_attest_page("voided", page.len());
        PageOutcome::Voided(reason)
    }
}
