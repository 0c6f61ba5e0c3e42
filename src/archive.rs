//! Archive extraction into scoped scratch directories.
//!
//! Each call to [`extract`] allocates a fresh, uniquely named directory and
//! unpacks the zip into it. The directory is owned by the returned
//! [`ArchiveHandle`] and removed when the handle is closed or dropped. On any
//! failure the partially written directory is dropped before the error
//! propagates, so nothing is left behind.
//!
//! Two ceilings are enforced: the compressed input size and the total number
//! of bytes written while unpacking (zip-bomb protection).

use chrono::{DateTime, Utc};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;

/// Where the archive bytes come from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
    Url(String),
}

impl ArchiveSource {
    /// Interpret a CLI argument: `http://` and `https://` are URLs, anything else a path.
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            ArchiveSource::Url(arg.to_string())
        } else {
            ArchiveSource::Path(PathBuf::from(arg))
        }
    }

    /// Read the whole archive into memory, enforcing the compressed size ceiling.
    pub async fn load(self, config: &ArchiveConfig) -> Result<Vec<u8>, ArchiveError> {
        let limit = config.max_archive_bytes;
        let bytes = match self {
            ArchiveSource::Bytes(bytes) => bytes,
            ArchiveSource::Path(path) => {
                let meta = std::fs::metadata(&path)
                    .map_err(|e| ArchiveError::io(format!("stat {}", path.display()), e))?;
                check_limit(meta.len(), limit)?;
                std::fs::read(&path)
                    .map_err(|e| ArchiveError::io(format!("read {}", path.display()), e))?
            }
            ArchiveSource::Url(url) => fetch(&url, limit).await?,
        };
        check_limit(bytes.len() as u64, limit)?;
        Ok(bytes)
    }
}

async fn fetch(url: &str, limit: u64) -> Result<Vec<u8>, ArchiveError> {
    let fetch_err = |message: String| ArchiveError::Fetch {
        url: url.to_string(),
        message,
    };

    let mut response = reqwest::get(url).await.map_err(|e| fetch_err(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {}", status)));
    }
    if let Some(len) = response.content_length() {
        check_limit(len, limit)?;
    }

    // Content-Length may be absent or wrong; count what actually arrives.
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_err(e.to_string()))?
    {
        check_limit((body.len() + chunk.len()) as u64, limit)?;
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn check_limit(actual: u64, limit: u64) -> Result<(), ArchiveError> {
    if actual > limit {
        return Err(ArchiveError::OversizeArchive { actual, limit });
    }
    Ok(())
}

/// Extracted archive contents. The directory lives exactly as long as the handle.
#[derive(Debug)]
pub struct ArchiveHandle {
    dir: TempDir,
    extracted_at: DateTime<Utc>,
}

impl ArchiveHandle {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    /// Every extracted file, unfiltered, in walk order.
    pub fn entries(&self) -> Vec<PathBuf> {
        WalkDir::new(self.root())
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Remove the scratch directory now, surfacing any removal error.
    pub fn close(self) -> Result<(), ArchiveError> {
        let root = self.dir.path().display().to_string();
        self.dir
            .close()
            .map_err(|e| ArchiveError::io(format!("remove {}", root), e))
    }
}

/// Unpack a zip byte stream into a fresh scratch directory.
pub fn extract(bytes: &[u8], config: &ArchiveConfig) -> Result<ArchiveHandle, ArchiveError> {
    check_limit(bytes.len() as u64, config.max_archive_bytes)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;

    let mut declared: u64 = 0;
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(zip_error)?;
        declared = declared.saturating_add(entry.size());
    }
    check_limit(declared, config.max_extracted_bytes)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("cchat-");
    let dir = match &config.scratch_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .map_err(|e| ArchiveError::io("create scratch directory", e))?;

    let mut written: u64 = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dir.path().join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| ArchiveError::io(format!("create {}", out_path.display()), e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::io(format!("create {}", parent.display()), e))?;
        }
        let mut file = std::fs::File::create(&out_path)
            .map_err(|e| ArchiveError::io(format!("create {}", out_path.display()), e))?;

        // Headers can lie about sizes; bound the actual bytes written too.
        let remaining = config.max_extracted_bytes - written;
        let copied = std::io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut file)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => ArchiveError::CorruptArchive(e.to_string()),
                _ => ArchiveError::io(format!("write {}", out_path.display()), e),
            })?;
        written += copied;
        if copied > remaining {
            return Err(ArchiveError::OversizeArchive {
                actual: written,
                limit: config.max_extracted_bytes,
            });
        }
    }

    tracing::info!(
        dir = %dir.path().display(),
        entries = archive.len(),
        bytes = written,
        "extracted archive"
    );

    Ok(ArchiveHandle {
        dir,
        extracted_at: Utc::now(),
    })
}

fn zip_error(err: zip::result::ZipError) -> ArchiveError {
    match err {
        zip::result::ZipError::Io(e) => ArchiveError::io("read archive", e),
        other => ArchiveError::CorruptArchive(other.to_string()),
    }
}
