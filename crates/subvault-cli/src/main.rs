//! subvault CLI
//!
//! Thin wrapper around subvault-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Subdomains of a root domain (network, then cache, then a scan)
//! subvault sub example.com
//!
//! # Force a fresh scan, keep everything local
//! subvault sub example.com --rescan --offline
//!
//! # Pull every indexed domain missing from the local cache
//! subvault sync --timeout 30
//!
//! # Node, index, cache and gateway report
//! subvault status -o json
//!
//! # Cached domains and their delta batches
//! subvault domains
//! subvault deltas example.com
//!
//! # Publish a cached domain, then the index that points at it
//! subvault publish example.com
//! subvault publish-index
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use subvault_core::logging::JsonlLayer;
use subvault_core::{
    LookupOptions, LookupSource, PublishOutcome, SubVault, SubfinderScanner, VaultConfig,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// subvault - cached subdomain enumeration
#[derive(Parser)]
#[command(name = "subvault")]
#[command(version)]
#[command(about = "subvault - cached subdomain enumeration")]
#[command(
    long_about = "Looks up subdomains from a local compressed cache or a content-addressed network, scanning only when nobody has the answer yet."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.subvault)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also append every log event as JSON lines under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subdomains of a root domain
    Sub {
        /// Root domain (e.g. example.com)
        root: String,

        /// Ignore cached answers and scan again
        #[arg(long)]
        rescan: bool,

        /// Do not touch the content network
        #[arg(long)]
        offline: bool,

        /// Do not publish scan results
        #[arg(long)]
        no_publish: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// No summary footer
        #[arg(short, long)]
        quiet: bool,

        /// Scanner executable
        #[arg(long, default_value = "subfinder")]
        scanner: PathBuf,
    },

    /// Fetch indexed domains missing from the local cache
    Sync {
        /// Give up after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Node, index, cache and gateway report
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// List cached root domains
    Domains,

    /// List delta batches of a cached domain
    Deltas {
        root: String,
    },

    /// Publish a cached domain to the content network
    Publish {
        root: String,
    },

    /// Publish the global index view
    PublishIndex,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Sub { .. } => "sub",
            Commands::Sync { .. } => "sync",
            Commands::Status { .. } => "status",
            Commands::Domains => "domains",
            Commands::Deltas { .. } => "deltas",
            Commands::Publish { .. } => "publish",
            Commands::PublishIndex => "publish-index",
        }
    }
}

/// Console logs go to stderr so stdout carries only results.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>, run: &str) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let jsonl = log_dir
        .map(|dir| JsonlLayer::new(dir, run))
        .transpose()
        .context("Failed to open log directory")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let run = format!("{}-{}", cli.command.name(), std::process::id());
    setup_logging(cli.verbose, cli.log_dir.as_deref(), &run)?;

    let data_dir = cli.data_dir.unwrap_or_else(VaultConfig::default_data_dir);
    let config = VaultConfig::new(&data_dir).with_env();
    let vault = SubVault::open(config)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    tracing::debug!(run = %run, data_dir = %data_dir.display(), "Vault opened");

    match cli.command {
        Commands::Sub {
            root,
            rescan,
            offline,
            no_publish,
            output,
            quiet,
            scanner,
        } => {
            let started = Instant::now();
            if !offline {
                vault.auto_sync().await;
            }

            let scanner = SubfinderScanner::new(scanner, vault.config().scan_timeout);
            let options = LookupOptions {
                rescan,
                network: !offline,
                publish: !no_publish,
            };
            let report = vault.lookup(&root, &scanner, &options).await?;

            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    for host in &report.hostnames {
                        println!("{}", host);
                    }
                }
            }

            if !quiet {
                let source = match report.source {
                    LookupSource::Local => "cache",
                    LookupSource::Network => "network",
                    LookupSource::Scan => "scan",
                };
                eprintln!();
                eprintln!(
                    "{} subdomains for {} ({} new, from {}) in {:.2?}",
                    report.hostnames.len(),
                    report.domain,
                    report.added,
                    source,
                    started.elapsed()
                );
                match &report.publish {
                    PublishOutcome::Published(cid) => eprintln!("Published: {}", cid),
                    PublishOutcome::Failed(reason) => {
                        eprintln!("Not published ({}); results kept locally", reason)
                    }
                    PublishOutcome::Skipped => {}
                }
            }
        }

        Commands::Sync { timeout } => {
            let report = vault.sync(Duration::from_secs(timeout)).await?;

            println!(
                "Synced {} of {} missing domains",
                report.synced, report.considered
            );
            if report.cancelled {
                println!("Stopped after {}s; run again to continue", timeout);
            }
            if let Some(reason) = report.index_error {
                println!("Published index unavailable: {}", reason);
            }
        }

        Commands::Status { output } => {
            let status = vault.status().await?;

            if output == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }

            println!("subvault v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Node:");
            println!("  ID: {}", status.peer_id);
            println!(
                "  Content node: {}",
                if status.network.node_available {
                    "available"
                } else {
                    "not running (publishing disabled)"
                }
            );
            match status.last_sync {
                Some(at) => println!("  Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Last sync: never"),
            }
            println!();
            println!("Index:");
            match &status.network.index_cid {
                Some(cid) => println!("  Address: {}", cid),
                None => println!("  Address: (none published)"),
            }
            println!("  Domains: {}", status.network.indexed_domains);
            if let Some(reason) = &status.network.index_error {
                println!("  Error: {}", reason);
            }
            println!();
            println!("Cache:");
            println!("  Data directory: {}", status.cache.data_dir.display());
            println!("  Domains: {}", status.cache.cached_domains);
            println!();
            println!("Gateways:");
            for gateway in &status.network.gateways {
                println!(
                    "  [{}] {} (ok {}, failed {})",
                    gateway.tier,
                    gateway.endpoint,
                    gateway.stats.success_count,
                    gateway.stats.failure_count
                );
            }
        }

        Commands::Domains => {
            let domains = vault.cached_domains();
            if domains.is_empty() {
                println!("No cached domains.");
            } else {
                for domain in domains {
                    println!("{}", domain);
                }
            }
        }

        Commands::Deltas { root } => {
            let batches = vault.deltas(&root)?;
            if batches.is_empty() {
                println!("No delta batches for {}.", root);
            } else {
                for batch in batches {
                    println!("{}  ({} new)", batch.id, batch.records.len());
                }
            }
        }

        Commands::Publish { root } => {
            let cid = vault.publish_domain(&root).await?;
            println!("Published {}", root);
            println!("  Address: {}", cid);
        }

        Commands::PublishIndex => {
            let cid = vault.publish_index().await?;
            println!("Published global index");
            println!("  Address: {}", cid);
        }
    }

    Ok(())
}
