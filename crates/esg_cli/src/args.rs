use clap::{Parser, Subcommand};
use esg_common::config::EsgConfig;

/// esgsync: import ESG emission dumps and attest them on a ledger
#[derive(Debug, Parser)]
#[command(
    name = "esgsync",
    about = "Import ESG emission dumps and attest stored records",
    version
)]
pub struct Args {
    /// Config file path.
    #[arg(short, long, default_value = "esgsync.toml")]
    pub config: String,

    /// Store connection string (overrides config).
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Target table (overrides config).
    #[arg(long, env = "ESG_TABLE")]
    pub table: Option<String>,

    /// Prometheus listen address, e.g. 0.0.0.0:9464.
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    pub print_default_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream a bulk-insert SQL dump into the store.
    Import(ImportArgs),
    /// Attest unindexed records and write confirmed indices back.
    Attest(AttestArgs),
}

#[derive(Debug, clap::Args)]
pub struct ImportArgs {
    /// Dump file, or `-` for stdin.
    pub file: String,

    /// Tuples per bulk insert.
    #[arg(long, env = "ESG_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Import into memory only; validates the dump without touching the store.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, clap::Args)]
pub struct AttestArgs {
    /// Records per page.
    #[arg(long, env = "ESG_PAGE_SIZE")]
    pub page_size: Option<usize>,

    /// Scorer endpoint.
    #[arg(long, env = "API_ENDPOINT")]
    pub api_endpoint: Option<String>,

    /// Scorer bearer token.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Ledger JSON-RPC endpoint.
    #[arg(long, env = "LEDGER_RPC_URL")]
    pub ledger_rpc_url: Option<String>,

    /// Required confirmation depth.
    #[arg(long, env = "ESG_CONFIRMATIONS")]
    pub confirmations: Option<u64>,

    /// Confirmation wait bound, in milliseconds.
    #[arg(long, env = "ESG_CONFIRM_TIMEOUT_MS")]
    pub confirm_timeout_ms: Option<u64>,

    /// Pause between pages, in milliseconds.
    #[arg(long, env = "ESG_PAGE_DELAY_MS")]
    pub page_delay_ms: Option<u64>,
}

impl Args {
    /// Layer command-line and environment values over the loaded config.
    pub fn apply_overrides(&self, config: &mut EsgConfig) {
        if let Some(ref url) = self.database_url {
            config.store.url = url.clone();
        }
        if let Some(ref table) = self.table {
            config.store.table = table.clone();
        }
        if let Some(ref addr) = self.metrics_addr {
            config.observability.metrics_addr = Some(addr.clone());
        }

        match &self.command {
            Some(Command::Import(import)) => {
                if let Some(n) = import.batch_size {
                    config.ingest.batch_size = n;
                }
            }
            Some(Command::Attest(attest)) => {
                if let Some(n) = attest.page_size {
                    config.attest.page_size = n;
                }
                if let Some(ref endpoint) = attest.api_endpoint {
                    config.scorer.endpoint = endpoint.clone();
                }
                if let Some(ref key) = attest.api_key {
                    config.scorer.api_key = key.clone();
                }
                if let Some(ref url) = attest.ledger_rpc_url {
                    config.ledger.rpc_url = url.clone();
                }
                if let Some(n) = attest.confirmations {
                    config.ledger.confirmations = n;
                }
                if let Some(ms) = attest.confirm_timeout_ms {
                    config.ledger.confirm_timeout_ms = ms;
                }
                if let Some(ms) = attest.page_delay_ms {
                    config.attest.page_delay_ms = ms;
                }
            }
            None => {}
        }
    }
}
