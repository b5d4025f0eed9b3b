//! `mediaq fetch <url>`: one chunked transfer, no queue.

use anyhow::{Context, Result};
use mediaq_core::config::MediaqConfig;
use mediaq_core::http::HttpRangeFetcher;
use mediaq_core::naming;
use mediaq_core::queue::report::{human_size, ProgressStats};
use mediaq_core::transfer::{ProgressFn, TransferMode};
use mediaq_core::{ChunkedTransfer, RangeFetcher, SourceHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub async fn run_fetch(
    cfg: &MediaqConfig,
    url: &str,
    output: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<()> {
    let transfer = ChunkedTransfer::new(
        Arc::new(HttpRangeFetcher::default()),
        cfg.transfer_options(),
    );
    let target = transfer
        .fetcher()
        .resolve(&SourceHandle::new(url))
        .await
        .with_context(|| format!("resolve {}", url))?;

    let dest = match output {
        Some(p) => p,
        None => std::env::current_dir()?
            .join(naming::file_name_for(url, target.name_hint.as_deref())),
    };
    let concurrency = concurrency.unwrap_or(cfg.chunk_concurrency).max(1);
    println!(
        "Fetching {} ({}) -> {}",
        url,
        target.size.map(human_size).unwrap_or_else(|| "unknown size".into()),
        dest.display()
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let started = Instant::now();
    let progress: ProgressFn = Arc::new(move |done, total| {
        let stats = ProgressStats {
            bytes_done: done,
            total_bytes: total,
            elapsed: started.elapsed(),
        };
        eprintln!("  {}", stats.message());
    });

    let report = transfer
        .download(&target, &dest, concurrency, Some(progress), &cancel)
        .await?;
    let how = match report.mode {
        TransferMode::Parallel { chunks } => format!("{} parallel chunks", chunks),
        TransferMode::Sequential(reason) => format!("sequential, {:?}", reason),
    };
    println!(
        "Saved {} ({}, {}, {:.1}s)",
        dest.display(),
        human_size(report.bytes),
        how,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
