//! The `.part` file a transfer writes into before it is renamed into place.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Partial download file for one destination. Clones share the descriptor
/// and write with `pwrite`, so chunk tasks owning disjoint ranges need no
/// lock around the file.
#[derive(Clone)]
pub struct PartFile {
    file: Arc<File>,
    path: PathBuf,
}

impl PartFile {
    /// Create (or truncate) `dest` + `.part`, creating parent directories.
    pub fn create(dest: &Path) -> Result<Self> {
        let path = super::temp_path(dest);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve `size` bytes up front. `posix_fallocate` on Unix, `set_len`
    /// where that is unsupported (tmpfs, some network filesystems).
    pub fn preallocate(&self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let r = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, path = %self.path.display(), "posix_fallocate unsupported, using set_len");
        }
        self.file
            .set_len(size)
            .with_context(|| format!("preallocate {} bytes for {}", size, self.path.display()))
    }

    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| format!("write {} bytes at offset {}", data.len(), offset))
    }

    /// Seek + write on a cloned handle; callers must not overlap.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    /// `write_at` on the blocking pool.
    pub async fn write_chunk(&self, offset: u64, data: Vec<u8>) -> Result<()> {
        let part = self.clone();
        tokio::task::spawn_blocking(move || part.write_at(offset, &data))
            .await
            .context("write task join")?
    }

    /// Flush to disk and rename onto `dest`. Other clones must already be
    /// dropped.
    pub fn commit(self, dest: &Path) -> Result<()> {
        self.file
            .sync_all()
            .with_context(|| format!("sync {}", self.path.display()))?;
        let Self { file, path } = self;
        drop(file);
        std::fs::rename(&path, dest)
            .with_context(|| format!("rename {} to {}", path.display(), dest.display()))
    }
}
