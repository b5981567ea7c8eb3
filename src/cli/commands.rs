//! Command handler for the Manga Fetcher CLI
//!
//! Wires CLI arguments into the pipeline: builds the fetcher (with
//! optional browser tier and tunnel), installs the interrupt handler and
//! runs the acquisition to completion.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{
    CbzAssembler, ChromiumEngine, FetcherConfig, OpenVpnTunnel, Pipeline, PipelineConfig,
    ResilientFetcher, RunSummary,
};
use crate::cli::Cli;
use crate::errors::{AppError, Result};

/// Run the download described by the CLI arguments.
///
/// Returns the run summary; the caller maps `produced_output()` onto the
/// process exit status.
pub async fn handle_download(cli: Cli) -> Result<RunSummary> {
    let mut fetcher =
        ResilientFetcher::new(FetcherConfig::default()).map_err(AppError::Fetch)?;

    if cli.browser {
        info!("browser-automation tier enabled");
        fetcher = fetcher.with_browser(Box::new(ChromiumEngine::new()));
    }

    if let Some(config_path) = &cli.vpn_config {
        info!("egress tunnel configured: {}", config_path.display());
        let mut tunnel = OpenVpnTunnel::new(config_path.clone(), cli.vpn_auth.clone());
        // Bring the tunnel up before the first request rather than on
        // first failure
        use crate::app::TunnelSession;
        if !tunnel.connect().await {
            return Err(AppError::generic(
                "tunnel connection failed; refusing to fetch without it",
            ));
        }
        fetcher = fetcher.with_tunnel(Box::new(tunnel));
    }

    let config = PipelineConfig {
        output_root: cli.output.clone(),
        max_chapters: cli.limit,
        page_delay: cli.page_delay(),
        chapter_delay: cli.chapter_delay(),
        keep_pages: cli.keep_pages,
        show_progress: !cli.quiet,
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut pipeline = Pipeline::new(fetcher, Box::new(CbzAssembler), config, cancel);
    let summary = pipeline.run(&cli.url).await?;

    if !cli.quiet {
        println!(
            "Done: {}/{} chapters completed, {} pages verified, {} failed",
            summary.chapters_completed,
            summary.chapters_attempted,
            summary.pages_verified,
            summary.pages_failed
        );
    }
    Ok(summary)
}

/// Cancel the run on Ctrl-C; the pipeline stops between atomic steps and
/// tears its sessions down itself.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current step then stopping");
            cancel.cancel();
        }
    });
}
