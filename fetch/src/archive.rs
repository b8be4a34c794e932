//! Runtime archive extraction.
//!
//! Artifacts are tarballs; the compression is picked from the file suffix.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.tar.zst`, used by all current runtime builds.
    TarZstd,
    /// `.tar.gz`, used by older runtime builds.
    TarGzip,
}

impl ArchiveFormat {
    /// Pick a format from a file name or URL path.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.zst") {
            Some(Self::TarZstd)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGzip)
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unrecognised archive format for '{0}'")]
    UnsupportedFormat(String),
    #[error("failed to open archive {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to unpack archive into {}: {source}", .dest.display())]
    Unpack { dest: PathBuf, source: io::Error },
}

/// Unpack the archive at `archive` into `dest`, which must already exist.
pub fn extract(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(|source| ExtractError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    unpack(BufReader::new(file), format, dest)
}

/// Decompress and unpack a tar stream into `dest`.
pub fn unpack(reader: impl Read, format: ArchiveFormat, dest: &Path) -> Result<(), ExtractError> {
    let wrap = |source| ExtractError::Unpack {
        dest: dest.to_path_buf(),
        source,
    };
    match format {
        ArchiveFormat::TarZstd => {
            let decoder = zstd::stream::read::Decoder::new(reader).map_err(wrap)?;
            unpack_tar(decoder, dest).map_err(wrap)
        }
        ArchiveFormat::TarGzip => {
            unpack_tar(flate2::read::GzDecoder::new(reader), dest).map_err(wrap)
        }
    }
}

fn unpack_tar(decoder: impl Read, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)?;
    tracing::debug!(dest = %dest.display(), "Unpacked archive");
    Ok(())
}
