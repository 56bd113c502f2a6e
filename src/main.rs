use std::fs::File;
use std::path::{Path, PathBuf};

use range_scan_rs::config::{
    ScanConfig, DEFAULT_BANNER_TIMEOUT_MS, DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_IDENTIFY_CONCURRENCY,
};
use range_scan_rs::types::ScanReport;
use range_scan_rs::{scanner, server};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// range-scan-rs: bounded-concurrency TCP range scanner with banner based service identification.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "range-scan-rs",
    version,
    about = "Bounded-concurrency TCP range scanner with banner based service identification.",
    long_about = None
)]
struct Cli {
    /// IP address, inclusive range (192.168.0.1-192.168.1.24) or CIDR (10.0.0.0/24).
    #[arg(long, required_unless_present = "serve")]
    iprange: Option<String>,

    /// Inclusive port range, e.g. 80-100.
    #[arg(long, required_unless_present = "serve")]
    ports: Option<String>,

    /// Max concurrent TCP connect attempts. Each one holds a file descriptor, so keep
    /// this below the open file limit (`ulimit -n`, often 1024 on Linux).
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Connect timeout for the open-port phase, in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Connect and read timeout for each banner attempt, in milliseconds.
    #[arg(long = "banner-timeout-ms", default_value_t = DEFAULT_BANNER_TIMEOUT_MS)]
    banner_timeout_ms: u64,

    /// Max concurrent banner grabs.
    #[arg(long = "identify-concurrency", default_value_t = DEFAULT_IDENTIFY_CONCURRENCY)]
    identify_concurrency: usize,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the HTTP scan API on this address instead of running one scan.
    #[arg(long, value_name = "BIND")]
    serve: Option<String>,
}

impl Cli {
    fn scan_config(&self) -> Option<ScanConfig> {
        let (iprange, ports) = (self.iprange.as_deref()?, self.ports.as_deref()?);
        Some(ScanConfig {
            concurrency: self.concurrency,
            connect_timeout_ms: self.timeout_ms,
            banner_connect_timeout_ms: self.banner_timeout_ms,
            banner_read_timeout_ms: self.banner_timeout_ms,
            identify_concurrency: self.identify_concurrency,
            ..ScanConfig::new(iprange, ports)
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout only carries the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(bind) = cli.serve.as_deref() {
        return server::spawn_server(bind).await;
    }

    let config = cli
        .scan_config()
        .context("--iprange and --ports are required")?;

    // Ctrl-C stops dispatching and reports what was found so far.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight probes");
            cancel_ctrlc.cancel();
        }
    });

    let report = scanner::scan_with_cancel(&config, cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        info!("wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn write_results_json(path: &Path, results: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
