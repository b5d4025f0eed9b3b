//! CLI for the mediaq fetcher and job queue.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediaq_core::config;
use std::path::{Path, PathBuf};

use commands::{run_cancel, run_checksum, run_fetch, run_queue};

/// Top-level CLI for mediaq.
#[derive(Debug, Parser)]
#[command(name = "mediaq")]
#[command(about = "mediaq: parallel chunked media fetcher with a bounded job queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one URL with parallel ranged chunks.
    Fetch {
        /// Direct HTTP/HTTPS URL.
        url: String,
        /// Output file (default: derived from the URL in the current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Chunk fetches in flight (default from config).
        #[arg(short, long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Queue URLs, download, post-process and store them; waits until done.
    Run {
        /// One or more direct HTTP/HTTPS URLs.
        #[arg(required = true)]
        urls: Vec<String>,
        /// Directory inside the store the results go to.
        #[arg(long, default_value = "", value_name = "REMOTE_DIR")]
        dir: String,
        /// Jobs allowed to run at once (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Cancel a job of the running `mediaq run`.
    Cancel {
        /// Job identifier as printed by `mediaq run` (e.g. job-2).
        id: String,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                url,
                output,
                concurrency,
            } => run_fetch(&cfg, &url, output, concurrency).await?,
            CliCommand::Run { urls, dir, jobs } => run_queue(&cfg, &urls, &dir, jobs).await?,
            CliCommand::Cancel { id } => run_cancel(&id).await?,
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
