use std::path::Path;

use esg_common::error::EsgResult;
use esg_common::shutdown::ShutdownSignal;
use esg_common::store::RecordStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::commit::{BatchCommitter, RawTuple};
use crate::dump::{classify_line, DumpLine};

/// Summary returned after an import run.
///
/// Once the final flush has run, `processed == skipped + inserted + failed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Non-blank lines read.
    pub processed: u64,
    /// Non-tuple lines (statement headers, comments, other SQL).
    pub skipped: u64,
    /// `INSERT INTO` headers seen.
    pub statements: u64,
    pub inserted: u64,
    pub failed: u64,
    /// Reading stopped early because shutdown was requested.
    pub interrupted: bool,
}

impl ImportSummary {
    pub fn is_balanced(&self) -> bool {
        self.processed == self.skipped + self.inserted + self.failed
    }
}

/// Open a dump for line reading. `-` reads standard input.
pub async fn open_dump(path: &str) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(Path::new(path)).await?;
    Ok(Box::new(BufReader::new(file)))
}

/// Stream a dump into `store` in batches of `batch_size`.
///
/// Parse and commit failures are counted, never fatal; only a read error on
/// the dump itself aborts. When `shutdown` fires, reading stops and whatever
/// is buffered is still flushed.
pub async fn run_import<R, S>(
    reader: R,
    store: &S,
    batch_size: usize,
    shutdown: &ShutdownSignal,
) -> EsgResult<ImportSummary>
where
    R: AsyncBufRead + Unpin,
    S: RecordStore + ?Sized,
{
    let mut committer = BatchCommitter::new(store, batch_size);
    let mut summary = ImportSummary::default();
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;

    info!("Starting import (batch size {})", batch_size);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                warn!("Shutdown requested at line {}; flushing buffered tuples", line_no);
                summary.interrupted = true;
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = next else { break };
        line_no += 1;

        match classify_line(&line) {
            DumpLine::Blank => continue,
            DumpLine::Header { table } => {
                summary.processed += 1;
                summary.skipped += 1;
                summary.statements += 1;
                debug!("Line {}: insert statement for table {:?}", line_no, table);
            }
            DumpLine::Tuple(t) => {
                summary.processed += 1;
                committer.append(RawTuple::new(line_no, t)).await;
            }
            DumpLine::Other => {
                summary.processed += 1;
                summary.skipped += 1;
                debug!("Line {}: skipping non-tuple line", line_no);
            }
        }
    }

    committer.flush().await;

    let stats = committer.stats();
    summary.inserted = stats.inserted;
    summary.failed = stats.failed;
    esg_observability::record_import_lines("skipped", summary.skipped);

    info!(
        "Import complete: processed={} skipped={} inserted={} failed={} statements={}",
        summary.processed, summary.skipped, summary.inserted, summary.failed, summary.statements
    );
    debug_assert!(summary.is_balanced());
    Ok(summary)
}
