//! Command-line interface for Manga Fetcher

mod args;
mod commands;

pub use args::Cli;
pub use commands::handle_download;
