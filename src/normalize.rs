//! Text normalization pass.
//!
//! The cleanser itself sits behind [`Normalizer`]; the pipeline's only contract
//! with it is to call [`Normalizer::cleanse`] once per discovered text file and
//! then look for the produced sibling `<stem>_clns_utf-8.txt` next to the input.
//! A failing file is logged and skipped, never fatal to the rest.

use std::path::{Path, PathBuf};

use crate::decode::Decoder;
use crate::error::NormalizationError;
use crate::walker::FileRecord;

/// Suffix appended to the input stem by every cleanser.
pub const CLEANSED_SUFFIX: &str = "_clns_utf-8.txt";

pub trait Normalizer: Send + Sync {
    /// Produce the cleansed sibling of `input` and return its path.
    fn cleanse(&self, input: &Path) -> Result<PathBuf, NormalizationError>;
}

/// Where the cleansed sibling of `input` lives.
pub fn cleansed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", stem, CLEANSED_SUFFIX))
}

pub fn is_cleansed_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(CLEANSED_SUFFIX))
        .unwrap_or(false)
}

/// Default cleanser: decode with the fallback decoder, drop a leading BOM,
/// normalize line endings to `\n`, write UTF-8.
pub struct Utf8Cleanser {
    decoder: Decoder,
}

impl Utf8Cleanser {
    pub fn new(decoder: Decoder) -> Self {
        Self { decoder }
    }
}

impl Normalizer for Utf8Cleanser {
    fn cleanse(&self, input: &Path) -> Result<PathBuf, NormalizationError> {
        let fail = |message: String| NormalizationError::Cleanse {
            path: input.to_path_buf(),
            message,
        };

        let bytes = std::fs::read(input).map_err(|e| fail(e.to_string()))?;
        let (_, text) = self
            .decoder
            .decode_bytes(&bytes)
            .ok_or_else(|| fail("no candidate encoding could decode the file".to_string()))?;

        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let cleaned = text.replace("\r\n", "\n").replace('\r', "\n");

        let output = cleansed_path(input);
        std::fs::write(&output, cleaned).map_err(|e| fail(e.to_string()))?;
        Ok(output)
    }
}

/// Outcome of the normalization pass over a set of files.
#[derive(Debug, Default)]
pub struct CleanseSummary {
    pub produced: Vec<PathBuf>,
    pub failures: Vec<NormalizationError>,
}

/// Cleanse every record, skipping files that are themselves cleanser output.
pub fn cleanse_all<I>(normalizer: &dyn Normalizer, records: I) -> CleanseSummary
where
    I: IntoIterator<Item = FileRecord>,
{
    let mut summary = CleanseSummary::default();

    for record in records {
        if is_cleansed_output(&record.path) {
            continue;
        }

        let result = normalizer.cleanse(&record.path).and_then(|_| {
            let expected = cleansed_path(&record.path);
            if expected.exists() {
                Ok(expected)
            } else {
                Err(NormalizationError::MissingOutput(expected))
            }
        });

        match result {
            Ok(path) => {
                tracing::info!(path = %path.display(), "cleansed file written");
                summary.produced.push(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "normalization skipped");
                summary.failures.push(e);
            }
        }
    }

    summary
}

/// Read cleansed files as strict UTF-8, keyed by file name, in input order.
pub fn load_processed(paths: &[PathBuf]) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read_to_string(path) {
            Ok(text) => out.push((name, text)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load cleansed file")
            }
        }
    }
    out
}
