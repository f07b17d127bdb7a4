//! # Moldwork CLI
//!
//! ```bash
//! # Verify every config of the default group
//! moldwork verify
//!
//! # Migrate a config, answering a rename conflict
//! moldwork update service -t 2.0.0 -r timeout_secs=45
//! ```

use clap::Parser;
use moldwork::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // MOLDWORK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MOLDWORK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let level = if cli.verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("moldwork={level},moldwork_core={level}").into());

    // stdout carries command output; logs go to stderr.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
