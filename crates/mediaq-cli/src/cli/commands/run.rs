//! `mediaq run <url>...`: queue jobs into the local store and wait for them.

use anyhow::{bail, Context, Result};
use mediaq_core::config::MediaqConfig;
use mediaq_core::http::HttpRangeFetcher;
use mediaq_core::naming;
use mediaq_core::notify::ChannelNotifier;
use mediaq_core::store::LocalDirStore;
use mediaq_core::{ChunkedTransfer, JobRequest, JobState, QueueManager, SourceHandle, StatusUpdate};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::control_socket;

pub async fn run_queue(
    cfg: &MediaqConfig,
    urls: &[String],
    dir: &str,
    jobs: Option<usize>,
) -> Result<()> {
    let work_dir = cfg.work_dir()?;
    let store_root = cfg.store_root()?;
    std::fs::create_dir_all(&store_root)
        .with_context(|| format!("create {}", store_root.display()))?;

    let mut options = cfg.queue_options();
    if let Some(n) = jobs {
        options.max_concurrent_jobs = n.max(1);
    }
    let (notifier, mut updates) = ChannelNotifier::new();
    let manager = QueueManager::new(
        ChunkedTransfer::new(
            Arc::new(HttpRangeFetcher::default()),
            cfg.transfer_options(),
        ),
        Arc::new(LocalDirStore::new(&store_root)),
        Arc::new(notifier),
        options,
    );

    let socket_path = mediaq_core::control::default_control_socket_path()?;
    let listener = match control_socket::spawn_control_listener(manager.clone(), &socket_path) {
        Ok(h) => {
            tracing::debug!(path = %socket_path.display(), "control socket listening");
            Some(h)
        }
        Err(e) => {
            tracing::warn!("control socket unavailable: {:#}", e);
            None
        }
    };

    // One scratch directory per job so equal file names never collide.
    let run_dir = work_dir.join(format!("run-{}", std::process::id()));
    let mut scratch: Vec<PathBuf> = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let job_dir = run_dir.join(i.to_string());
        std::fs::create_dir_all(&job_dir)
            .with_context(|| format!("create {}", job_dir.display()))?;
        let name = naming::file_name_for(url, None);
        let request = JobRequest::new(SourceHandle::new(url.as_str()), job_dir.join(&name))
            .with_upload_dir(dir);
        match manager.submit(request) {
            Ok(id) => println!("[{}] queued {}", id, url),
            Err(e) => eprintln!("skipping {}: {}", url, e),
        }
        scratch.push(job_dir);
    }

    let mut failed = 0usize;
    let mut interrupted = false;
    loop {
        tokio::select! {
            Some(update) = updates.recv() => failed += print_update(&update),
            _ = manager.wait_idle() => break,
            r = tokio::signal::ctrl_c(), if !interrupted => {
                if r.is_ok() {
                    eprintln!("interrupted, cancelling all jobs");
                    manager.cancel_all();
                }
                interrupted = true;
            }
        }
    }
    while let Ok(update) = updates.try_recv() {
        failed += print_update(&update);
    }

    if let Some(h) = listener {
        h.abort();
        let _ = std::fs::remove_file(&socket_path);
    }
    for d in scratch {
        let _ = std::fs::remove_dir(d);
    }
    let _ = std::fs::remove_dir(&run_dir);

    if failed > 0 {
        bail!("{} job(s) failed", failed);
    }
    Ok(())
}

/// Print one update; returns 1 for a failed job.
fn print_update(u: &StatusUpdate) -> usize {
    println!("[{}] {} {}: {}", u.job_id, u.name, u.state, u.message);
    usize::from(u.state == JobState::Failed)
}
