//! Command-line argument parsing for Manga Fetcher
//!
//! Single-purpose CLI: one entry point taking the work's root URL plus
//! tuning options. The exit status reflects whether at least one chapter
//! produced at least one verified page.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::constants::{files, pacing};

/// Manga Fetcher - download a serialized comic as per-chapter bundles
#[derive(Parser, Debug)]
#[command(
    name = "manga_fetcher",
    version,
    about = "Download a manga published as paginated HTML into per-chapter CBZ bundles",
    long_about = "Downloads every chapter of a work from its root listing page, escalating \
through direct HTTP, a challenge-solving client and optional browser automation when the \
site resists, and resuming idempotently across runs."
)]
pub struct Cli {
    /// Root URL of the work (its chapter listing page)
    pub url: Url,

    /// Maximum number of chapters to download, in reading order
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output root directory
    #[arg(short, long, default_value = files::DEFAULT_OUTPUT_ROOT, value_name = "DIR")]
    pub output: PathBuf,

    /// Enable the browser-automation escalation tier (requires Chromium)
    #[arg(long)]
    pub browser: bool,

    /// OpenVPN configuration file for the egress tunnel
    #[arg(long, value_name = "FILE")]
    pub vpn_config: Option<PathBuf>,

    /// OpenVPN credentials file (used with --vpn-config)
    #[arg(long, value_name = "FILE", requires = "vpn_config")]
    pub vpn_auth: Option<PathBuf>,

    /// Delay between page downloads, in seconds
    #[arg(long, default_value_t = pacing::PAGE_DELAY.as_secs())]
    pub page_delay: u64,

    /// Delay between chapters, in seconds
    #[arg(long, default_value_t = pacing::CHAPTER_DELAY.as_secs())]
    pub chapter_delay: u64,

    /// Keep staged page images after bundle assembly
    #[arg(long)]
    pub keep_pages: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, conflicts_with_all = ["verbose", "very_verbose"])]
    pub quiet: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.very_verbose {
            tracing::Level::DEBUG
        } else if self.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay)
    }

    pub fn chapter_delay(&self) -> Duration {
        Duration::from_secs(self.chapter_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let cli = Cli::parse_from(["manga_fetcher", "https://site.test/manga/title"]);
        assert_eq!(cli.url.host_str(), Some("site.test"));
        assert!(cli.limit.is_none());
        assert!(!cli.browser);
        assert_eq!(cli.output, PathBuf::from(files::DEFAULT_OUTPUT_ROOT));
    }

    #[test]
    fn test_limit_and_delays() {
        let cli = Cli::parse_from([
            "manga_fetcher",
            "https://site.test/manga/title",
            "--limit",
            "3",
            "--page-delay",
            "2",
            "--chapter-delay",
            "7",
        ]);
        assert_eq!(cli.limit, Some(3));
        assert_eq!(cli.page_delay(), Duration::from_secs(2));
        assert_eq!(cli.chapter_delay(), Duration::from_secs(7));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = Cli::try_parse_from(["manga_fetcher", "not a url"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_vpn_auth_requires_config() {
        let result = Cli::try_parse_from([
            "manga_fetcher",
            "https://site.test/m/t",
            "--vpn-auth",
            "auth.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level_mapping() {
        let quiet = Cli::parse_from(["manga_fetcher", "https://site.test/m/t", "--quiet"]);
        assert_eq!(quiet.log_level(), tracing::Level::ERROR);

        let verbose = Cli::parse_from(["manga_fetcher", "https://site.test/m/t", "--verbose"]);
        assert_eq!(verbose.log_level(), tracing::Level::INFO);

        let default = Cli::parse_from(["manga_fetcher", "https://site.test/m/t"]);
        assert_eq!(default.log_level(), tracing::Level::WARN);
    }
}
