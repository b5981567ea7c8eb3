//! Manga Fetcher CLI application
//!
//! Downloads every chapter of a work from its root listing page into
//! per-chapter CBZ bundles, escalating through fetch tiers when the host
//! resists automated access.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use manga_fetcher::cli::{handle_download, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("Manga Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match handle_download(cli).await {
        Ok(summary) => {
            // Exit status reflects whether anything was actually acquired
            if !summary.produced_output() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env().add_directive(
        format!("manga_fetcher={}", log_level)
            .parse()
            .unwrap_or_else(|_| log_level.into()),
    );

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
