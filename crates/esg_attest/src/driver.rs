use std::time::Duration;

use esg_common::error::{ErrorKind, EsgResult};
use esg_common::shutdown::ShutdownSignal;
use esg_common::store::RecordStore;
use tracing::{error, info, warn};

use crate::ledger::Ledger;
use crate::page::PageReader;
use crate::pipeline::{AttestationPipeline, PageOutcome};
use crate::scorer::Scorer;

/// Totals for one attestation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttestSummary {
    /// Non-empty pages processed.
    pub pages: u64,
    pub records: u64,
    /// Indices written back.
    pub applied: u64,
    /// Records on confirmed pages whose index update did not land.
    pub update_failures: u64,
    pub voided_pages: u64,
    pub voided_records: u64,
    /// Stopped before the empty page because shutdown was requested.
    pub interrupted: bool,
}

/// Walk unindexed records page by page until an empty page comes back.
///
/// The offset advances by the page size whatever the page outcome, so a
/// voided page is not retried within this run; its records still have a null
/// index and are picked up again by the next run. Only a store read error is
/// fatal. Shutdown is checked between pages, never mid-page.
pub async fn run_attestation<S, C, L>(
    reader: &PageReader<'_, S>,
    pipeline: &AttestationPipeline<'_, S, C, L>,
    page_delay: Duration,
    shutdown: &ShutdownSignal,
) -> EsgResult<AttestSummary>
where
    S: RecordStore + ?Sized,
    C: Scorer + ?Sized,
    L: Ledger + ?Sized,
{
    let mut summary = AttestSummary::default();
    let mut offset = 0usize;

    info!("Starting attestation (page size {})", reader.page_size());

    loop {
        if shutdown.is_shutdown() {
            summary.interrupted = true;
            break;
        }

        let page = reader.next_page(offset).await?;
        if page.is_empty() {
            info!("No unindexed records at offset {}; done", offset);
            break;
        }

        summary.pages += 1;
        summary.records += page.len() as u64;

        match pipeline.process(&page).await {
            PageOutcome::Applied {
                updated, failed, ..
            } => {
                summary.applied += updated;
                summary.update_failures += failed;
            }
            PageOutcome::Voided(reason) => {
                summary.voided_pages += 1;
                summary.voided_records += page.len() as u64;
                match reason.error_kind() {
                    Some(ErrorKind::Transient) | None => warn!(
                        "Page at offset {} voided ({}); tx {}; will be retried on the next run",
                        offset,
                        reason,
                        reason.tx_hash().unwrap_or("<none>")
                    ),
                    Some(kind) => error!(
                        "Page at offset {} voided ({:?}: {}); tx {}; retrying will not help until this is fixed",
                        offset,
                        kind,
                        reason,
                        reason.tx_hash().unwrap_or("<none>")
                    ),
                }
            }
        }

        offset += reader.page_size();

        if shutdown.wait_timeout(page_delay).await {
            summary.interrupted = true;
            break;
        }
    }

    if summary.interrupted {
        warn!("Attestation interrupted by shutdown after {} page(s)", summary.pages);
    }
    info!(
        "Attestation complete: pages={} records={} applied={} update_failures={} voided_pages={} voided_records={}",
        summary.pages,
        summary.records,
        summary.applied,
        summary.update_failures,
        summary.voided_pages,
        summary.voided_records
    );
    Ok(summary)
}
