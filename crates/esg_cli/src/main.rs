mod args;
mod client;

use std::process;

use anyhow::{bail, Context, Result};
use args::{Args, Command, ImportArgs};
use clap::Parser;
use client::PgStore;
use esg_attest::{run_attestation, AttestationPipeline, HttpScorer, JsonRpcLedger, PageReader};
use esg_common::config::EsgConfig;
use esg_common::shutdown::ShutdownSignal;
use esg_common::store::{MemoryStore, RecordStore};
use esg_ingest::{open_dump, run_import};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // --print-default-config: dump default TOML and exit
    if args.print_default_config {
        match EsgConfig::default().to_toml() {
            Ok(toml_str) => println!("{}", toml_str),
            Err(e) => {
                eprintln!("esgsync: error: {:#}", e);
                process::exit(1);
            }
        }
        return;
    }

    esg_observability::init_tracing();

    if let Err(e) = run(args).await {
        eprintln!("esgsync: error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = EsgConfig::load(&args.config).context("Could not load configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let Some(command) = args.command else {
        bail!("no subcommand given (try `esgsync --help`)");
    };

    if let Some(ref addr) = config.observability.metrics_addr {
        if let Err(e) = esg_observability::init_metrics(addr) {
            warn!("Metrics exporter not started on {}: {}", addr, e);
        }
    }

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let reason = wait_for_shutdown_signal().await;
            info!("{}; initiating graceful shutdown", reason);
            shutdown.shutdown();
        });
    }

    match command {
        Command::Import(import) if import.dry_run => {
            info!("Dry run: importing into memory");
            let store = MemoryStore::new();
            let result = import_dump(&store, &config, &import, &shutdown).await;
            close_store(&store).await;
            result
        }
        Command::Import(import) => {
            let store = PgStore::connect(&config.store)
                .await
                .context("Could not connect to store")?;
            let result = import_dump(&store, &config, &import, &shutdown).await;
            close_store(&store).await;
            result
        }
        Command::Attest(_) => {
            let scorer =
                HttpScorer::from_config(&config.scorer).context("Invalid scorer configuration")?;
            let ledger =
                JsonRpcLedger::from_config(&config.ledger).context("Invalid ledger configuration")?;
            let store = PgStore::connect(&config.store)
                .await
                .context("Could not connect to store")?;
            let result = attest(&store, &scorer, &ledger, &config, &shutdown).await;
            close_store(&store).await;
            result
        }
    }
}

async fn import_dump<S: RecordStore + ?Sized>(
    store: &S,
    config: &EsgConfig,
    import: &ImportArgs,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    store
        .ensure_schema()
        .await
        .context("Could not prepare target table")?;
    let reader = open_dump(&import.file)
        .await
        .with_context(|| format!("Cannot read dump: {}", import.file))?;

    let summary = run_import(reader, store, config.ingest.batch_size, shutdown).await?;

    println!(
        "Import complete: {} processed, {} inserted, {} failed, {} skipped, {} statement(s){}.",
        summary.processed,
        summary.inserted,
        summary.failed,
        summary.skipped,
        summary.statements,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

async fn attest(
    store: &PgStore,
    scorer: &HttpScorer,
    ledger: &JsonRpcLedger,
    config: &EsgConfig,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    store.ping().await.context("Store is not reachable")?;
    info!(
        "Attesting via {} (depth {}, timeout {:?})",
        scorer.endpoint(),
        config.ledger.confirmations,
        config.ledger.confirm_timeout()
    );

    let reader = PageReader::new(store, config.attest.page_size);
    let pipeline = AttestationPipeline::new(
        store,
        scorer,
        ledger,
        config.ledger.confirmations,
        config.ledger.confirm_timeout(),
    );
    let summary = run_attestation(&reader, &pipeline, config.attest.page_delay(), shutdown).await?;

    println!(
        "Attestation complete: {} page(s), {} record(s), {} applied, {} update failure(s), {} voided page(s) ({} records){}.",
        summary.pages,
        summary.records,
        summary.applied,
        summary.update_failures,
        summary.voided_pages,
        summary.voided_records,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

/// Release the store. Called exactly once per acquired store, on every path.
async fn close_store<S: RecordStore + ?Sized>(store: &S) {
    if let Err(e) = store.close().await {
        warn!("Error while closing store: {}", e);
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, returning a description of which signal fired.
async fn wait_for_shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT (Ctrl+C) received",
                _ = sigterm.recv() => "SIGTERM received",
            },
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT (Ctrl+C) received"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT (Ctrl+C) received"
    }
}
