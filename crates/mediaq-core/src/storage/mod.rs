//! Local file lifecycle: `.part` files and cleanup of job leftovers.

mod part;

pub use part::PartFile;

use std::path::{Path, PathBuf};

/// Suffix of the partial file a transfer writes into.
pub const TEMP_SUFFIX: &str = ".part";

/// Path of the partial file for `final_path` (`clip.mp4` → `clip.mp4.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Best-effort removal of local job files. Missing files are not an error;
/// anything else is logged and skipped.
pub fn remove_local_files<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed local file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "failed to remove local file: {}", e),
        }
    }
}
