//! vfleet entry point.
//!
//! Reads a fleet document, reconciles the target host against it and prints
//! the install-server's address (or the full run report with `--json`).
//! Logs go to stderr so stdout stays machine-readable.

mod cli;
mod config;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use config::EnvConfig;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vfleet_core::{DeclarativeDocument, Reconciler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "vfleet=debug" } else { "vfleet=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let env = EnvConfig::from_env();
    tracing::debug!(?env, "Environment loaded");

    let config = cli.reconcile_config(&env)?;
    let doc = DeclarativeDocument::from_path(&cli.input_file)
        .with_context(|| format!("failed to load {}", cli.input_file.display()))?;
    tracing::info!(
        input = %cli.input_file.display(),
        hosts = doc.hosts.len(),
        target = %config.target_host,
        "Document loaded"
    );

    let reconciler = Reconciler::connect(config)?;
    let report = tokio::select! {
        result = reconciler.run(&doc) => result?,
        _ = signal::ctrl_c() => {
            tracing::warn!("Interrupted, remote resources are left as they are");
            anyhow::bail!("interrupted");
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.install_server_ip);
    }
    Ok(())
}
