//! `RemoteStore` over a local directory tree.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::checksum;

use super::{RemoteStore, StoreError, UploadReceipt};

/// Stores files under `root/<destination_dir>/<file name>`. A same-named file
/// with identical content counts as already uploaded.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `root` joined with `destination_dir`. Only plain relative components
    /// are accepted; a leading `/` is treated as the store root.
    fn resolve_dir(&self, destination_dir: &str) -> Result<PathBuf, StoreError> {
        let mut dir = self.root.clone();
        for component in Path::new(destination_dir.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => dir.push(part),
                Component::CurDir => {}
                _ => return Err(StoreError::InvalidDestination(destination_dir.to_string())),
            }
        }
        Ok(dir)
    }
}

enum Copied {
    Stored { deduped: bool },
    Cancelled,
}

fn copy_into(
    local: &Path,
    dir: &Path,
    target: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<Copied> {
    if cancel.is_cancelled() {
        return Ok(Copied::Cancelled);
    }
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    if checksum::same_content(local, target)? {
        return Ok(Copied::Stored { deduped: true });
    }

    // Copy next to the target, then rename, so a reader never sees half a file.
    let mut staging = target.as_os_str().to_owned();
    staging.push(".uploading");
    let staging = PathBuf::from(staging);
    std::fs::copy(local, &staging)
        .with_context(|| format!("copy {} to {}", local.display(), staging.display()))?;
    if cancel.is_cancelled() {
        let _ = std::fs::remove_file(&staging);
        return Ok(Copied::Cancelled);
    }
    std::fs::rename(&staging, target)
        .with_context(|| format!("rename {} to {}", staging.display(), target.display()))?;
    Ok(Copied::Stored { deduped: false })
}

#[async_trait]
impl RemoteStore for LocalDirStore {
    async fn upload(
        &self,
        local_path: &Path,
        destination_dir: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, StoreError> {
        let dir = self.resolve_dir(destination_dir)?;
        let name = local_path
            .file_name()
            .ok_or_else(|| StoreError::NoFileName(local_path.to_path_buf()))?;
        let target = dir.join(name);

        let local = local_path.to_path_buf();
        let stored = target.clone();
        let token = cancel.clone();
        let copied = tokio::task::spawn_blocking(move || copy_into(&local, &dir, &stored, &token))
            .await
            .map_err(|e| StoreError::Io(format!("upload task: {}", e)))?
            .map_err(StoreError::io)?;
        let deduped = match copied {
            Copied::Stored { deduped } => deduped,
            Copied::Cancelled => return Err(StoreError::Cancelled),
        };

        tracing::debug!(
            stored = %target.display(),
            deduped,
            "upload finished"
        );
        Ok(UploadReceipt {
            stored: target,
            deduped,
        })
    }
}
