//! Control socket: server (during `mediaq run`) and client (for `mediaq cancel`).

use anyhow::{bail, Context, Result};
use mediaq_core::control::ControlCommand;
use mediaq_core::QueueManager;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Binds `path` and applies each command line to `manager`. Malformed lines
/// are logged and skipped.
pub fn spawn_control_listener(
    manager: QueueManager,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            apply(&manager, &line);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

fn apply(manager: &QueueManager, line: &str) {
    match ControlCommand::parse(line) {
        Ok(ControlCommand::Cancel(id)) => {
            if !manager.cancel(&id) {
                tracing::info!(job_id = %id, "cancel: no such live job");
            }
        }
        Ok(ControlCommand::CancelAll) => manager.cancel_all(),
        Err(e) => tracing::warn!("control socket: {}: {:?}", e, line),
    }
}

/// Sends one command line to the control socket of a running `mediaq run`.
pub async fn send_command(socket_path: &Path, cmd: &ControlCommand) -> Result<()> {
    if !socket_path.exists() {
        bail!(
            "no running `mediaq run` (control socket {} not found)",
            socket_path.display()
        );
    }
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    stream.write_all(cmd.to_line().as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
