//! Issues a batch of client certificates from a JSON batch descriptor.
//!
//! ```sh
//! certissue --input batch.json --config issuer.toml --mount /var/lib/certissue
//! ```
//!
//! The result envelope is written as JSON to `--output`, or stdout.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use certissue::config::IssuerConfig;
use certissue::envelope::{self, BatchDescriptor};
use certissue::orchestrator::IssuanceOrchestrator;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "certissue")]
#[command(about = "Issue X.509 client certificates under a single root CA")]
struct Args {
    /// Batch descriptor (JSON).
    #[arg(short, long, env = "CERTISSUE_INPUT")]
    input: PathBuf,

    /// Issuer configuration (TOML). Built-in defaults when omitted.
    #[arg(short, long, env = "CERTISSUE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding ca.key and ca.crt; overrides `mount_path`.
    #[arg(short, long, env = "CERTISSUE_MOUNT")]
    mount: Option<PathBuf>,

    /// Where to write the result envelope; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => IssuerConfig::from_file(path)?,
        None => IssuerConfig::default(),
    };
    if let Some(mount) = args.mount {
        config.mount_path = mount;
    }

    let orchestrator = IssuanceOrchestrator::from_config(&config)
        .with_context(|| format!("failed to load CA material from {}", config.mount_path.display()))?;

    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let descriptor: BatchDescriptor = serde_json::from_str(&input)
        .with_context(|| format!("failed to parse batch descriptor {}", args.input.display()))?;

    info!(
        runtime_session_id = %descriptor.runtime_session_id,
        items = descriptor.message.items.len(),
        "received batch"
    );
    let result = envelope::dispatch(&descriptor, &orchestrator);
    let json = serde_json::to_string_pretty(&result)?;

    match args.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}
