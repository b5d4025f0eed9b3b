//! Container detection from magic bytes and extension normalization.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

/// Bytes read from the start of the file for detection.
const HEADER_LEN: usize = 260;

const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const ASF_GUID_PREFIX: &[u8] = &[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11];

/// Media containers the detector knows. Anything unrecognized is treated as MP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mov,
    ThreeGp,
    Mkv,
    Avi,
    Wmv,
    Flv,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
            Container::ThreeGp => "3gp",
            Container::Mkv => "mkv",
            Container::Avi => "avi",
            Container::Wmv => "wmv",
            Container::Flv => "flv",
        }
    }
}

/// Classify a file header.
pub fn container_from_header(header: &[u8]) -> Container {
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        let brand = &header[8..12];
        return if brand == b"qt  " {
            Container::Mov
        } else if brand.starts_with(b"3g") {
            Container::ThreeGp
        } else {
            Container::Mp4
        };
    }
    if header.starts_with(EBML_MAGIC) {
        return Container::Mkv;
    }
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"AVI " {
        return Container::Avi;
    }
    if header.starts_with(ASF_GUID_PREFIX) {
        return Container::Wmv;
    }
    if header.starts_with(b"FLV") {
        return Container::Flv;
    }
    Container::Mp4
}

/// Read the header of `path` and classify it. An unreadable file is an error;
/// a short one is MP4.
pub fn detect_container(path: &Path) -> Result<Container> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    f.by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .with_context(|| format!("read header of {}", path.display()))?;
    Ok(container_from_header(&header))
}

/// Rename `path` so its extension matches the detected container. Returns the
/// resulting path (unchanged when the extension already matches), or `None`
/// when `cancel` fired before anything was renamed.
pub fn normalize_extension(path: &Path, cancel: &CancellationToken) -> Result<Option<PathBuf>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let container = detect_container(path)?;
    let current = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    if current.as_deref() == Some(container.extension()) {
        return Ok(Some(path.to_path_buf()));
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let renamed = path.with_extension(container.extension());
    std::fs::rename(path, &renamed).with_context(|| {
        format!("rename {} to {}", path.display(), renamed.display())
    })?;
    tracing::debug!(
        from = %path.display(),
        to = %renamed.display(),
        "renamed to detected container"
    );
    Ok(Some(renamed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(path: &Path) -> Result<Option<PathBuf>> {
        normalize_extension(path, &CancellationToken::new())
    }

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut h = vec![0, 0, 0, 0x18];
        h.extend_from_slice(b"ftyp");
        h.extend_from_slice(brand);
        h.extend_from_slice(&[0; 8]);
        h
    }

    #[test]
    fn iso_bmff_brands() {
        assert_eq!(container_from_header(&ftyp(b"isom")), Container::Mp4);
        assert_eq!(container_from_header(&ftyp(b"qt  ")), Container::Mov);
        assert_eq!(container_from_header(&ftyp(b"3gp5")), Container::ThreeGp);
    }

    #[test]
    fn other_magics() {
        assert_eq!(
            container_from_header(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
            Container::Mkv
        );
        assert_eq!(
            container_from_header(b"RIFF\x00\x00\x00\x00AVI LIST"),
            Container::Avi
        );
        assert_eq!(
            container_from_header(b"RIFF\x00\x00\x00\x00WAVEfmt "),
            Container::Mp4
        );
        assert_eq!(
            container_from_header(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6]),
            Container::Wmv
        );
        assert_eq!(container_from_header(b"FLV\x01\x05"), Container::Flv);
        assert_eq!(container_from_header(b"ab"), Container::Mp4);
        assert_eq!(container_from_header(b""), Container::Mp4);
    }

    #[test]
    fn normalize_renames_mismatched_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, [0x1A, 0x45, 0xDF, 0xA3, 0, 0, 0, 0]).unwrap();

        let out = normalize(&path).unwrap().unwrap();
        assert_eq!(out, dir.path().join("clip.mkv"));
        assert!(out.exists());
        assert!(!path.exists());
    }

    #[test]
    fn normalize_keeps_matching_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.MP4");
        std::fs::write(&path, ftyp(b"mp42")).unwrap();
        assert_eq!(normalize(&path).unwrap(), Some(path.clone()));
        assert!(path.exists());
    }

    #[test]
    fn normalize_adds_missing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video");
        std::fs::write(&path, b"FLV\x01").unwrap();
        assert_eq!(normalize(&path).unwrap(), Some(dir.path().join("video.flv")));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(normalize(&dir.path().join("gone.mp4")).is_err());
    }

    #[test]
    fn cancelled_job_is_not_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, [0x1A, 0x45, 0xDF, 0xA3, 0, 0, 0, 0]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(normalize_extension(&path, &cancel).unwrap(), None);
        assert!(path.exists());
        assert!(!dir.path().join("clip.mkv").exists());
    }
}
