use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crypto_agility::keys::KeyType;
use crypto_agility::registry::{AlgorithmCategory, Status};
use crypto_agility::{CryptoConfig, CryptoService, Result};

#[derive(Parser)]
#[command(name = "crypto-agility")]
#[command(about = "Per-domain algorithm agility and key lifecycle management")]
#[command(version)]
struct Cli {
    /// JSON configuration file; built-in defaults are used if it cannot be read
    #[arg(long, short, default_value = "crypto-agility.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered algorithms
    Algorithms {
        #[arg(long)]
        category: Option<AlgorithmCategory>,
        #[arg(long)]
        deprecated: bool,
    },
    /// Hash a string with the domain's active hash algorithm
    Hash {
        #[arg(long)]
        domain: String,
        input: String,
    },
    /// Rotate keys for one domain, or every key past its rotation interval
    Rotate {
        #[arg(long, conflicts_with = "due")]
        domain: Option<String>,
        #[arg(long)]
        key_type: Option<KeyType>,
        #[arg(long)]
        due: bool,
    },
    /// Summarize the audit log over the last N days
    Report {
        #[arg(long, default_value_t = 7)]
        days: i64,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Delete audit files past the retention window
    Cleanup,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crypto_agility=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error ({:?}): {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CryptoConfig::load_or_default(&cli.config);
    let service = CryptoService::new(config)?;

    match cli.command {
        Commands::Algorithms { category, deprecated } => {
            let status = if deprecated { Status::Deprecated } else { Status::Active };
            print_json(&service.list_algorithms(category, Some(status)))
        }
        Commands::Hash { domain, input } => print_json(&service.hash_data(input.as_bytes(), &domain)?),
        Commands::Rotate {
            domain,
            key_type,
            due,
        } => {
            let summaries = if due {
                service.rotate_due_keys()
            } else {
                let domains = match domain {
                    Some(d) => vec![d],
                    None => service.domains(),
                };
                domains
                    .iter()
                    .map(|d| service.rotate_keys(d, key_type))
                    .collect()
            };
            let mut failed = 0;
            for summary in &summaries {
                for rotation in &summary.rotated {
                    for key in &rotation.new_keys {
                        println!("{}\t{}\t{}\t{}", summary.domain, key.category, key.algorithm_id, key.id);
                    }
                }
                for (key_type, e) in &summary.failures {
                    eprintln!("{}\t{key_type}\tfailed: {e}", summary.domain);
                    failed += 1;
                }
            }
            if failed > 0 {
                eprintln!("{failed} rotation(s) failed");
            }
            Ok(())
        }
        Commands::Report { days, domain } => {
            let end = Utc::now();
            let report = service.audit_report(end - Duration::days(days), end, domain.as_deref())?;
            print_json(&report)
        }
        Commands::Cleanup => {
            let removed = service.audit_cleanup()?;
            println!("removed {removed} audit file(s)");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
